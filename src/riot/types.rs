//! Serde DTOs for the subset of the match-history API we consume
//!
//! Only the fields the pipeline reads are modeled; everything else in the
//! provider payloads is ignored during deserialization. Defaults are applied
//! wherever the provider is known to omit fields on older matches.

use serde::Deserialize;
use std::collections::HashMap;

/// League-v4 leaderboard payload
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueListDto {
    #[serde(default)]
    pub entries: Vec<LeagueEntryDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueEntryDto {
    #[serde(default)]
    pub puuid: String,
    #[serde(default)]
    pub summoner_id: String,
    #[serde(default)]
    pub league_points: i64,
}

/// Match-v5 detail payload
#[derive(Debug, Clone, Deserialize)]
pub struct MatchDto {
    pub metadata: MatchMetadataDto,
    pub info: MatchInfoDto,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadataDto {
    pub match_id: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfoDto {
    pub game_version: String,
    #[serde(default)]
    pub queue_id: i64,
    #[serde(default)]
    pub game_duration: i64,
    #[serde(default)]
    pub participants: Vec<ParticipantDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    #[serde(default)]
    pub puuid: String,
    pub participant_id: i64,
    #[serde(default)]
    pub team_id: i64,
    #[serde(default)]
    pub champion_name: String,
    /// Role tag assigned by the provider ("TOP", "JUNGLE", ...); empty on
    /// modes without positions
    #[serde(default)]
    pub team_position: String,
    #[serde(default)]
    pub win: bool,
    #[serde(default)]
    pub perks: PerksDto,
}

impl ParticipantDto {
    /// The keystone rune: first selection of the primary style tree
    pub fn keystone(&self) -> Option<i64> {
        self.perks
            .styles
            .iter()
            .find(|style| style.description == "primaryStyle")
            .and_then(|style| style.selections.first())
            .map(|selection| selection.perk)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerksDto {
    #[serde(default)]
    pub styles: Vec<PerkStyleDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerkStyleDto {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selections: Vec<PerkSelectionDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerkSelectionDto {
    pub perk: i64,
}

/// Match-v5 timeline payload
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineDto {
    pub info: TimelineInfoDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineInfoDto {
    #[serde(default)]
    pub frames: Vec<FrameDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDto {
    /// Milliseconds since game start
    pub timestamp: i64,
    /// Keyed by participant id rendered as a string ("1".."10")
    #[serde(default)]
    pub participant_frames: HashMap<String, ParticipantFrameDto>,
    #[serde(default)]
    pub events: Vec<TimelineEventDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantFrameDto {
    pub participant_id: i64,
    #[serde(default)]
    pub total_gold: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEventDto {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub killer_id: Option<i64>,
    #[serde(default)]
    pub victim_id: Option<i64>,
    #[serde(default)]
    pub participant_id: Option<i64>,
    #[serde(default)]
    pub item_id: Option<i64>,
}

/// Endpoint classes sharing the provider's method-level budgets; used for
/// logging and for the client's per-call bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    League,
    MatchIds,
    Match,
    Timeline,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::League => "league",
            EndpointClass::MatchIds => "match-ids",
            EndpointClass::Match => "match",
            EndpointClass::Timeline => "timeline",
        }
    }
}
