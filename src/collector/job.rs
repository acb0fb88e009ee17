//! Resumable bulk collection job
//!
//! Two phases run in order: discovery (leaderboard players, then each
//! player's recent ranked match ids) and processing (fetch match + timeline,
//! filter to the requested patch, extract lane pairings, feed the
//! aggregator). Both phases fan out through a bounded worker pool, and the
//! full job state is checkpointed at chunk boundaries so a killed run resumes
//! without reprocessing completed work.
//!
//! One bad player or match never aborts a run: per-item failures are logged,
//! optionally retried once, and skipped.

use crate::aggregator::{
    self, LanePairing, LaneParticipant, EARLY_WINDOW_MS, GOLD_SNAPSHOT_MS,
};
use crate::collector::checkpoint::{CollectionCheckpoint, JobParams, JobPhase};
use crate::collector::patch;
use crate::config::Config;
use crate::errors::{CollectError, RiotApiError};
use crate::logger::{self, LogTag};
use crate::riot::types::{MatchDto, TimelineDto};
use crate::riot::RiotClient;
use crate::store::MatchupStore;
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything one run needs, resolved from config plus CLI overrides
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub params: JobParams,
    /// None disables checkpointing (live backfill collections)
    pub checkpoint_path: Option<PathBuf>,
    pub checkpoint_interval: usize,
    pub worker_concurrency: usize,
    pub retry_failed_items: bool,
    pub ttl: ChronoDuration,
}

impl JobSettings {
    /// Settings for a full nightly/CLI bulk run
    pub fn bulk(config: &Config, patch: &str, lanes: Vec<String>) -> Self {
        let collection = &config.collection;
        Self {
            params: JobParams {
                patch: patch.to_string(),
                lanes: if lanes.is_empty() {
                    collection.lanes.clone()
                } else {
                    lanes
                },
                player_pool: collection.player_pool,
                matches_per_player: collection.matches_per_player,
                max_matches: collection.max_matches,
            },
            checkpoint_path: Some(PathBuf::from(&collection.checkpoint_path)),
            checkpoint_interval: collection.checkpoint_interval.max(1),
            worker_concurrency: collection.worker_concurrency.max(1),
            retry_failed_items: collection.retry_failed_items,
            ttl: ChronoDuration::hours(config.storage.ttl_hours as i64),
        }
    }

    /// Reduced-cap settings for one backfill attempt; no checkpoint
    pub fn live(config: &Config, patch: &str, lane: &str) -> Self {
        let backfill = &config.backfill;
        Self {
            params: JobParams {
                patch: patch.to_string(),
                lanes: vec![lane.to_string()],
                player_pool: backfill.live_player_pool,
                matches_per_player: backfill.live_matches_per_player,
                max_matches: backfill.live_max_matches,
            },
            checkpoint_path: None,
            checkpoint_interval: config.collection.checkpoint_interval.max(1),
            worker_concurrency: config.collection.worker_concurrency.max(1),
            retry_failed_items: config.collection.retry_failed_items,
            ttl: ChronoDuration::hours(config.storage.ttl_hours as i64),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub resumed: bool,
    pub players_discovered: usize,
    pub matches_processed: usize,
    pub items_skipped: usize,
    pub records_written: usize,
}

pub struct CollectionJob {
    client: Arc<RiotClient>,
    store: Arc<dyn MatchupStore>,
    settings: JobSettings,
}

impl CollectionJob {
    pub fn new(
        client: Arc<RiotClient>,
        store: Arc<dyn MatchupStore>,
        settings: JobSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub async fn run(&self) -> Result<JobOutcome, CollectError> {
        let prefix = patch::game_version_prefix(&self.settings.params.patch)?;
        let lanes: HashSet<String> = self.settings.params.lanes.iter().cloned().collect();

        let (mut checkpoint, resumed) = self.load_or_fresh();
        if resumed {
            logger::info(
                LogTag::Collector,
                &format!(
                    "resuming {:?} phase: {} players, {}/{} matches done",
                    checkpoint.phase,
                    checkpoint.players.len(),
                    checkpoint.processed,
                    checkpoint.queue.len()
                ),
            );
        } else {
            logger::info(
                LogTag::Collector,
                &format!(
                    "starting collection for patch {} ({} lanes)",
                    self.settings.params.patch,
                    lanes.len()
                ),
            );
        }

        let mut skipped = 0usize;

        if checkpoint.phase == JobPhase::Discovery {
            self.run_discovery(&mut checkpoint, &mut skipped).await?;
        }
        self.run_processing(&mut checkpoint, &prefix, &lanes, &mut skipped)
            .await?;

        let computed_at = Utc::now();
        let records = aggregator::finalize_all(&checkpoint.buckets, computed_at, self.settings.ttl);
        let records_written = self.store.upsert_many(&records).await?;

        if let Some(path) = &self.settings.checkpoint_path {
            CollectionCheckpoint::delete(path)?;
        }

        let outcome = JobOutcome {
            resumed,
            players_discovered: checkpoint.players.len(),
            matches_processed: checkpoint.processed,
            items_skipped: skipped,
            records_written,
        };
        logger::info(
            LogTag::Collector,
            &format!(
                "✅ collection finished: {} matches processed, {} skipped, {} records written",
                outcome.matches_processed, outcome.items_skipped, outcome.records_written
            ),
        );
        Ok(outcome)
    }

    fn load_or_fresh(&self) -> (CollectionCheckpoint, bool) {
        let fresh = CollectionCheckpoint::new(self.settings.params.clone());
        let Some(path) = &self.settings.checkpoint_path else {
            return (fresh, false);
        };

        match CollectionCheckpoint::load(path, &self.settings.params) {
            Ok(Some(checkpoint)) => (checkpoint, true),
            Ok(None) => (fresh, false),
            Err(CollectError::CheckpointMismatch { detail }) => {
                logger::warning(
                    LogTag::Collector,
                    &format!("ignoring stale checkpoint ({}), starting fresh", detail),
                );
                (fresh, false)
            }
            Err(e) => {
                logger::warning(
                    LogTag::Collector,
                    &format!("unreadable checkpoint ({}), starting fresh", e),
                );
                (fresh, false)
            }
        }
    }

    fn save_checkpoint(&self, checkpoint: &CollectionCheckpoint) -> Result<(), CollectError> {
        if let Some(path) = &self.settings.checkpoint_path {
            checkpoint.save(path)?;
            logger::debug(
                LogTag::Collector,
                &format!(
                    "checkpoint saved ({:?}, {}/{} matches)",
                    checkpoint.phase,
                    checkpoint.processed,
                    checkpoint.queue.len()
                ),
            );
        }
        Ok(())
    }

    // =========================================================================
    // PHASE 1 - DISCOVERY
    // =========================================================================

    async fn run_discovery(
        &self,
        checkpoint: &mut CollectionCheckpoint,
        skipped: &mut usize,
    ) -> Result<(), CollectError> {
        if checkpoint.players.is_empty() {
            // The leaderboard is the root of the crawl; failing here is fatal
            let league = self.client.challenger_league().await?;
            let mut entries = league.entries;
            entries.sort_by(|a, b| b.league_points.cmp(&a.league_points));

            checkpoint.players = entries
                .into_iter()
                .map(|entry| entry.puuid)
                .filter(|puuid| !puuid.is_empty())
                .take(self.settings.params.player_pool)
                .collect();

            logger::info(
                LogTag::Collector,
                &format!("discovered {} leaderboard players", checkpoint.players.len()),
            );
            self.save_checkpoint(checkpoint)?;
        }

        let pending: Vec<String> = checkpoint
            .players
            .iter()
            .filter(|puuid| !checkpoint.match_ids.contains_key(*puuid))
            .cloned()
            .collect();

        for chunk in pending.chunks(self.settings.checkpoint_interval) {
            let results: Vec<(String, Result<Vec<String>, CollectError>)> =
                stream::iter(chunk.iter().cloned().map(|puuid| {
                    let client = self.client.clone();
                    let count = self.settings.params.matches_per_player;
                    let retry = self.settings.retry_failed_items;
                    async move {
                        let ids = with_one_retry(retry, || client.match_ids_by_puuid(&puuid, count))
                            .await
                            .map_err(CollectError::from);
                        (puuid, ids)
                    }
                }))
                .buffer_unordered(self.settings.worker_concurrency)
                .collect()
                .await;

            for (puuid, result) in results {
                match result {
                    Ok(ids) => {
                        checkpoint.match_ids.insert(puuid, ids);
                    }
                    Err(e) => {
                        logger::warning(
                            LogTag::Collector,
                            &format!("skipping player {}: {}", puuid, e),
                        );
                        *skipped += 1;
                        // Recorded as empty so a resume does not refetch it
                        checkpoint.match_ids.insert(puuid, Vec::new());
                    }
                }
            }
            self.save_checkpoint(checkpoint)?;
        }

        checkpoint.queue = build_queue(
            &checkpoint.players,
            &checkpoint.match_ids,
            self.settings.params.max_matches,
        );
        checkpoint.phase = JobPhase::Processing;
        checkpoint.processed = 0;
        logger::info(
            LogTag::Collector,
            &format!(
                "discovery complete: {} unique matches queued",
                checkpoint.queue.len()
            ),
        );
        self.save_checkpoint(checkpoint)?;
        Ok(())
    }

    // =========================================================================
    // PHASE 2 - PROCESSING
    // =========================================================================

    async fn run_processing(
        &self,
        checkpoint: &mut CollectionCheckpoint,
        prefix: &str,
        lanes: &HashSet<String>,
        skipped: &mut usize,
    ) -> Result<(), CollectError> {
        while checkpoint.processed < checkpoint.queue.len() {
            let end = (checkpoint.processed + self.settings.checkpoint_interval)
                .min(checkpoint.queue.len());
            let chunk: Vec<String> = checkpoint.queue[checkpoint.processed..end].to_vec();

            let results: Vec<(String, Result<Option<Vec<LanePairing>>, CollectError>)> =
                stream::iter(chunk.into_iter().map(|match_id| {
                    let client = self.client.clone();
                    let prefix = prefix.to_string();
                    let lanes = lanes.clone();
                    let retry = self.settings.retry_failed_items;
                    async move {
                        let outcome =
                            fetch_match_pairings(&client, &match_id, &prefix, &lanes, retry).await;
                        (match_id, outcome)
                    }
                }))
                .buffer_unordered(self.settings.worker_concurrency)
                .collect()
                .await;

            for (match_id, result) in results {
                match result {
                    Ok(Some(pairings)) => {
                        for pairing in &pairings {
                            aggregator::record_pairing(
                                &mut checkpoint.buckets,
                                &self.settings.params.patch,
                                pairing,
                            );
                        }
                    }
                    Ok(None) => {
                        logger::debug(
                            LogTag::Collector,
                            &format!("{} is outside the requested patch, ignored", match_id),
                        );
                    }
                    Err(e) => {
                        logger::warning(
                            LogTag::Collector,
                            &format!("skipping match {}: {}", match_id, e),
                        );
                        *skipped += 1;
                    }
                }
            }

            // Buckets and index move together: a crash between chunks replays
            // nothing, a crash inside one replays only that chunk
            checkpoint.processed = end;
            self.save_checkpoint(checkpoint)?;
        }
        Ok(())
    }
}

/// Deduplicate per-player match lists into one processing queue, preserving
/// first-seen order, capped at `max_matches`
pub fn build_queue(
    players: &[String],
    match_ids: &HashMap<String, Vec<String>>,
    max_matches: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut queue = Vec::new();

    'outer: for puuid in players {
        if let Some(ids) = match_ids.get(puuid) {
            for id in ids {
                if seen.insert(id.clone()) {
                    queue.push(id.clone());
                    if queue.len() >= max_matches {
                        break 'outer;
                    }
                }
            }
        }
    }

    queue
}

/// Retry `operation` once when the per-item retry policy is enabled and the
/// first failure was not a fail-fast condition
async fn with_one_retry<T, F, Fut>(retry: bool, operation: F) -> Result<T, RiotApiError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, RiotApiError>>,
{
    match operation().await {
        Ok(value) => Ok(value),
        Err(first) => {
            let retryable = !matches!(
                first,
                RiotApiError::NotFound { .. } | RiotApiError::CooldownActive { .. }
            );
            if retry && retryable {
                logger::debug(
                    LogTag::Collector,
                    &format!("item failed once ({}), retrying", first),
                );
                operation().await
            } else {
                Err(first)
            }
        }
    }
}

/// Fetch one match plus its timeline and extract lane pairings
///
/// Returns `Ok(None)` for matches outside the requested patch or too short
/// to have a 15-minute gold snapshot.
async fn fetch_match_pairings(
    client: &RiotClient,
    match_id: &str,
    prefix: &str,
    lanes: &HashSet<String>,
    retry: bool,
) -> Result<Option<Vec<LanePairing>>, CollectError> {
    let detail = with_one_retry(retry, || client.match_detail(match_id)).await?;

    if !patch::version_matches(&detail.info.game_version, prefix) {
        return Ok(None);
    }

    let timeline = with_one_retry(retry, || client.match_timeline(match_id)).await?;
    extract_pairings(&detail, &timeline, lanes)
}

/// Turn raw match + timeline telemetry into lane pairings
///
/// Returns `Ok(None)` when the game has no frame at or past the 15-minute
/// snapshot. A participant missing from the snapshot frame is malformed
/// telemetry and skips the match.
pub fn extract_pairings(
    detail: &MatchDto,
    timeline: &TimelineDto,
    lanes: &HashSet<String>,
) -> Result<Option<Vec<LanePairing>>, CollectError> {
    let match_id = &detail.metadata.match_id;

    let Some(snapshot) = timeline
        .info
        .frames
        .iter()
        .find(|frame| frame.timestamp >= GOLD_SNAPSHOT_MS)
    else {
        return Ok(None);
    };

    let gold: HashMap<i64, i64> = snapshot
        .participant_frames
        .values()
        .map(|frame| (frame.participant_id, frame.total_gold))
        .collect();

    let mut kills: HashMap<i64, u32> = HashMap::new();
    let mut deaths: HashMap<i64, u32> = HashMap::new();
    let mut first_items: HashMap<i64, i64> = HashMap::new();

    for frame in &timeline.info.frames {
        for event in &frame.events {
            match event.event_type.as_str() {
                "CHAMPION_KILL" if event.timestamp <= EARLY_WINDOW_MS => {
                    // Killer id 0 marks executions (turrets, minions)
                    if let Some(killer) = event.killer_id.filter(|id| *id > 0) {
                        *kills.entry(killer).or_insert(0) += 1;
                    }
                    if let Some(victim) = event.victim_id {
                        *deaths.entry(victim).or_insert(0) += 1;
                    }
                }
                "ITEM_PURCHASED" => {
                    if let (Some(buyer), Some(item)) = (event.participant_id, event.item_id) {
                        first_items.entry(buyer).or_insert(item);
                    }
                }
                _ => {}
            }
        }
    }

    let mut pairings = Vec::new();
    for lane in lanes {
        let in_lane: Vec<_> = detail
            .info
            .participants
            .iter()
            .filter(|p| p.team_position == *lane)
            .collect();

        // A valid pairing is exactly two opposing participants; anything else
        // (off-role games, remakes) is not a usable sample
        if in_lane.len() != 2 || in_lane[0].team_id == in_lane[1].team_id {
            continue;
        }

        let mut sides = Vec::with_capacity(2);
        for participant in &in_lane {
            let Some(gold_at_15) = gold.get(&participant.participant_id) else {
                return Err(CollectError::MalformedTelemetry {
                    match_id: match_id.clone(),
                    detail: format!(
                        "participant {} missing from the gold snapshot frame",
                        participant.participant_id
                    ),
                });
            };
            sides.push(LaneParticipant {
                champion: participant.champion_name.clone(),
                win: participant.win,
                gold_at_15: *gold_at_15,
                early_kills: kills.get(&participant.participant_id).copied().unwrap_or(0),
                early_deaths: deaths
                    .get(&participant.participant_id)
                    .copied()
                    .unwrap_or(0),
                keystone: participant.keystone(),
                first_item: first_items.get(&participant.participant_id).copied(),
            });
        }

        let second = sides.pop().expect("two sides collected");
        let first = sides.pop().expect("two sides collected");
        pairings.push(LanePairing {
            lane: lane.clone(),
            first,
            second,
        });
    }

    Ok(Some(pairings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{record_pairing, BucketMap};
    use crate::collector::checkpoint::JobParams;

    fn test_params() -> JobParams {
        JobParams {
            patch: "25.10".to_string(),
            lanes: vec!["TOP".to_string()],
            player_pool: 3,
            matches_per_player: 5,
            max_matches: 6,
        }
    }

    fn pairing(first: &str, second: &str, first_wins: bool, diff: i64) -> LanePairing {
        LanePairing {
            lane: "TOP".to_string(),
            first: LaneParticipant {
                champion: first.to_string(),
                win: first_wins,
                gold_at_15: 5000 + diff,
                early_kills: 1,
                early_deaths: 0,
                keystone: Some(8010),
                first_item: Some(3074),
            },
            second: LaneParticipant {
                champion: second.to_string(),
                win: !first_wins,
                gold_at_15: 5000,
                early_kills: 0,
                early_deaths: 1,
                keystone: Some(8437),
                first_item: Some(3068),
            },
        }
    }

    #[test]
    fn queue_deduplicates_in_first_seen_order_and_caps() {
        let players = vec!["a".to_string(), "b".to_string()];
        let mut match_ids = HashMap::new();
        match_ids.insert(
            "a".to_string(),
            vec!["m1".to_string(), "m2".to_string(), "m3".to_string()],
        );
        match_ids.insert(
            "b".to_string(),
            vec!["m2".to_string(), "m4".to_string(), "m5".to_string()],
        );

        let queue = build_queue(&players, &match_ids, 4);
        assert_eq!(queue, vec!["m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn interrupted_run_resumes_to_identical_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        let matches = vec![
            pairing("Darius", "Garen", true, 300),
            pairing("Darius", "Garen", false, -150),
            pairing("Sett", "Mordekaiser", true, 500),
            pairing("Darius", "Garen", true, 50),
        ];

        // Uninterrupted reference run
        let mut reference = BucketMap::new();
        for p in &matches {
            record_pairing(&mut reference, "25.10", p);
        }

        // Interrupted run: fold two matches, checkpoint, "crash", resume
        let mut checkpoint = CollectionCheckpoint::new(test_params());
        checkpoint.phase = JobPhase::Processing;
        checkpoint.queue = (0..matches.len()).map(|i| format!("m{}", i)).collect();
        for p in &matches[..2] {
            record_pairing(&mut checkpoint.buckets, "25.10", p);
        }
        checkpoint.processed = 2;
        checkpoint.save(&path).unwrap();

        let mut resumed = CollectionCheckpoint::load(&path, &test_params())
            .unwrap()
            .expect("checkpoint loads");
        assert_eq!(resumed.processed, 2);
        for p in &matches[resumed.processed..] {
            record_pairing(&mut resumed.buckets, "25.10", p);
        }

        assert_eq!(resumed.buckets, reference);
    }

    fn synthetic_match(game_version: &str) -> MatchDto {
        serde_json::from_value(serde_json::json!({
            "metadata": {"matchId": "EUW1_100", "participants": ["p1", "p2"]},
            "info": {
                "gameVersion": game_version,
                "queueId": 420,
                "gameDuration": 1900,
                "participants": [
                    {
                        "puuid": "p1", "participantId": 1, "teamId": 100,
                        "championName": "Darius", "teamPosition": "TOP", "win": true,
                        "perks": {"styles": [{"description": "primaryStyle",
                                              "selections": [{"perk": 8010}]}]}
                    },
                    {
                        "puuid": "p2", "participantId": 6, "teamId": 200,
                        "championName": "Garen", "teamPosition": "TOP", "win": false,
                        "perks": {"styles": [{"description": "primaryStyle",
                                              "selections": [{"perk": 8437}]}]}
                    },
                    {
                        "puuid": "p3", "participantId": 2, "teamId": 100,
                        "championName": "Ahri", "teamPosition": "MIDDLE", "win": true
                    }
                ]
            }
        }))
        .unwrap()
    }

    fn synthetic_timeline() -> TimelineDto {
        serde_json::from_value(serde_json::json!({
            "info": {
                "frames": [
                    {
                        "timestamp": 60_000,
                        "participantFrames": {
                            "1": {"participantId": 1, "totalGold": 500},
                            "6": {"participantId": 6, "totalGold": 500}
                        },
                        "events": [
                            {"type": "ITEM_PURCHASED", "timestamp": 10_000,
                             "participantId": 1, "itemId": 3074},
                            {"type": "ITEM_PURCHASED", "timestamp": 12_000,
                             "participantId": 1, "itemId": 2003},
                            {"type": "ITEM_PURCHASED", "timestamp": 15_000,
                             "participantId": 6, "itemId": 3068}
                        ]
                    },
                    {
                        "timestamp": 300_000,
                        "participantFrames": {
                            "1": {"participantId": 1, "totalGold": 2300},
                            "6": {"participantId": 6, "totalGold": 2100}
                        },
                        "events": [
                            {"type": "CHAMPION_KILL", "timestamp": 290_000,
                             "killerId": 1, "victimId": 6}
                        ]
                    },
                    {
                        "timestamp": 910_000,
                        "participantFrames": {
                            "1": {"participantId": 1, "totalGold": 6100},
                            "6": {"participantId": 6, "totalGold": 5700}
                        },
                        "events": [
                            {"type": "CHAMPION_KILL", "timestamp": 700_000,
                             "killerId": 6, "victimId": 1}
                        ]
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn pairings_read_gold_kills_items_and_keystones() {
        let lanes: HashSet<String> = ["TOP".to_string()].into_iter().collect();
        let detail = synthetic_match("15.10.456.7890");
        let timeline = synthetic_timeline();

        let pairings = extract_pairings(&detail, &timeline, &lanes)
            .unwrap()
            .expect("snapshot frame exists");
        assert_eq!(pairings.len(), 1);

        let top = &pairings[0];
        let (darius, garen) = if top.first.champion == "Darius" {
            (&top.first, &top.second)
        } else {
            (&top.second, &top.first)
        };

        // Gold comes from the first frame at or past 15:00
        assert_eq!(darius.gold_at_15, 6100);
        assert_eq!(garen.gold_at_15, 5700);

        // Only the kill inside the 6-minute window counts
        assert_eq!(darius.early_kills, 1);
        assert_eq!(darius.early_deaths, 0);
        assert_eq!(garen.early_deaths, 1);

        // First purchase per participant, not the cheapest or latest
        assert_eq!(darius.first_item, Some(3074));
        assert_eq!(garen.first_item, Some(3068));

        assert_eq!(darius.keystone, Some(8010));
        assert!(darius.win);
        assert!(!garen.win);
    }

    #[test]
    fn short_games_have_no_snapshot_and_are_ignored() {
        let lanes: HashSet<String> = ["TOP".to_string()].into_iter().collect();
        let detail = synthetic_match("15.10.1.1");
        let mut timeline = synthetic_timeline();
        timeline.info.frames.truncate(2); // nothing at 15:00

        let result = extract_pairings(&detail, &timeline, &lanes).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn missing_participant_frame_is_malformed_telemetry() {
        let lanes: HashSet<String> = ["TOP".to_string()].into_iter().collect();
        let detail = synthetic_match("15.10.1.1");
        let mut timeline = synthetic_timeline();
        timeline
            .info
            .frames
            .last_mut()
            .unwrap()
            .participant_frames
            .remove("6");

        match extract_pairings(&detail, &timeline, &lanes) {
            Err(CollectError::MalformedTelemetry { match_id, .. }) => {
                assert_eq!(match_id, "EUW1_100");
            }
            other => panic!("expected MalformedTelemetry, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn lanes_without_a_clean_duel_are_skipped() {
        // MIDDLE has only one participant in the synthetic match
        let lanes: HashSet<String> = ["MIDDLE".to_string()].into_iter().collect();
        let detail = synthetic_match("15.10.1.1");
        let timeline = synthetic_timeline();

        let pairings = extract_pairings(&detail, &timeline, &lanes).unwrap().unwrap();
        assert!(pairings.is_empty());
    }

    #[tokio::test]
    async fn one_retry_policy_recovers_from_a_single_failure() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);

        let result = with_one_retry(true, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(RiotApiError::Network {
                        endpoint: "match".to_string(),
                        detail: "reset".to_string(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cooldown_failures_are_not_retried() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);

        let result: Result<i32, _> = with_one_retry(true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RiotApiError::CooldownActive {
                    remaining: std::time::Duration::from_secs(5),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
