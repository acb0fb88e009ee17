//! Match telemetry aggregator
//!
//! Pure reducer that folds one lane pairing at a time into per-pair
//! accumulator buckets, and collapses buckets into finalized
//! [`MatchupStatRecord`]s. Buckets are addressed by a canonical composite
//! string key so the symmetric directions of a pairing can never collide or
//! duplicate. No I/O happens here; the collection job owns fetching and the
//! store owns persistence.

use crate::store::{MatchupStatRecord, UsageStat};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Timeline frame the gold snapshot is read from (first frame at or past 15:00)
pub const GOLD_SNAPSHOT_MS: i64 = 15 * 60 * 1000;

/// Kills and deaths count as "early" up to this timestamp
pub const EARLY_WINDOW_MS: i64 = 6 * 60 * 1000;

/// How many histogram entries survive finalization
const TOP_USAGE: usize = 3;

/// One side of a lane pairing, with telemetry already extracted from the
/// match and timeline payloads
#[derive(Debug, Clone)]
pub struct LaneParticipant {
    pub champion: String,
    pub win: bool,
    pub gold_at_15: i64,
    pub early_kills: u32,
    pub early_deaths: u32,
    pub keystone: Option<i64>,
    pub first_item: Option<i64>,
}

/// Two opposing participants sharing a role tag in one match
#[derive(Debug, Clone)]
pub struct LanePairing {
    pub lane: String,
    pub first: LaneParticipant,
    pub second: LaneParticipant,
}

/// Transient accumulator for one directed (player, enemy) pair
///
/// Serializable because checkpoints carry the in-progress bucket map; it is
/// never written to the stats store directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationBucket {
    pub patch: String,
    pub lane: String,
    pub champion: String,
    pub opponent: String,
    pub games: u32,
    pub wins: u32,
    pub gold_diff_sum: i64,
    pub early_kills: u64,
    pub early_deaths: u64,
    /// Keystone id -> pick count (string keys so the map survives JSON)
    pub keystones: HashMap<String, u32>,
    pub first_items: HashMap<String, u32>,
}

pub type BucketMap = HashMap<String, AggregationBucket>;

/// Canonical composite key for a directed pair
pub fn bucket_key(patch: &str, lane: &str, champion: &str, opponent: &str) -> String {
    format!("{}|{}|{}|{}", patch, lane, champion, opponent)
}

/// Fold one pairing into the bucket map, updating both directions
///
/// Pairings with an unresolvable champion on either side, or a champion
/// paired against itself, are skipped without error.
pub fn record_pairing(buckets: &mut BucketMap, patch: &str, pairing: &LanePairing) {
    let first_name = pairing.first.champion.trim();
    let second_name = pairing.second.champion.trim();
    if first_name.is_empty() || second_name.is_empty() || first_name == second_name {
        return;
    }

    accumulate(buckets, patch, &pairing.lane, &pairing.first, &pairing.second);
    accumulate(buckets, patch, &pairing.lane, &pairing.second, &pairing.first);
}

fn accumulate(
    buckets: &mut BucketMap,
    patch: &str,
    lane: &str,
    player: &LaneParticipant,
    enemy: &LaneParticipant,
) {
    let champion = player.champion.trim();
    let opponent = enemy.champion.trim();
    let key = bucket_key(patch, lane, champion, opponent);

    let bucket = buckets.entry(key).or_insert_with(|| AggregationBucket {
        patch: patch.to_string(),
        lane: lane.to_string(),
        champion: champion.to_string(),
        opponent: opponent.to_string(),
        ..Default::default()
    });

    bucket.games += 1;
    if player.win {
        bucket.wins += 1;
    }
    bucket.gold_diff_sum += player.gold_at_15 - enemy.gold_at_15;
    bucket.early_kills += player.early_kills as u64;
    bucket.early_deaths += player.early_deaths as u64;

    if let Some(keystone) = player.keystone {
        *bucket.keystones.entry(keystone.to_string()).or_insert(0) += 1;
    }
    if let Some(item) = player.first_item {
        *bucket.first_items.entry(item.to_string()).or_insert(0) += 1;
    }
}

/// Collapse one bucket into a finalized record
///
/// Rounding rules: rates to 3 decimals, gold differential to the nearest
/// integer. Histograms keep the top 3 identifiers by count with a
/// deterministic tie-break on the identifier itself.
pub fn finalize_bucket(
    bucket: &AggregationBucket,
    computed_at: DateTime<Utc>,
    ttl: Duration,
) -> Option<MatchupStatRecord> {
    if bucket.games == 0 {
        return None;
    }
    let games = bucket.games as f64;

    Some(MatchupStatRecord {
        patch: bucket.patch.clone(),
        lane: bucket.lane.clone(),
        player_champion: bucket.champion.clone(),
        enemy_champion: bucket.opponent.clone(),
        games: bucket.games,
        wins: bucket.wins,
        win_rate: round3(bucket.wins as f64 / games),
        gold_diff_at_15: (bucket.gold_diff_sum as f64 / games).round() as i64,
        early_kill_rate: round3(bucket.early_kills as f64 / games),
        early_death_rate: round3(bucket.early_deaths as f64 / games),
        keystones: top_usage(&bucket.keystones, games),
        first_items: top_usage(&bucket.first_items, games),
        computed_at,
        expires_at: computed_at + ttl,
    })
}

/// Finalize every bucket in a map
pub fn finalize_all(
    buckets: &BucketMap,
    computed_at: DateTime<Utc>,
    ttl: Duration,
) -> Vec<MatchupStatRecord> {
    let mut records: Vec<MatchupStatRecord> = buckets
        .values()
        .filter_map(|bucket| finalize_bucket(bucket, computed_at, ttl))
        .collect();
    records.sort_by(|a, b| {
        (&a.lane, &a.player_champion, &a.enemy_champion)
            .cmp(&(&b.lane, &b.player_champion, &b.enemy_champion))
    });
    records
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn top_usage(counts: &HashMap<String, u32>, games: f64) -> Vec<UsageStat> {
    let mut entries: Vec<(i64, u32)> = counts
        .iter()
        .filter_map(|(id, count)| id.parse::<i64>().ok().map(|id| (id, *count)))
        .collect();

    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries.truncate(TOP_USAGE);

    entries
        .into_iter()
        .map(|(id, count)| UsageStat {
            id,
            count,
            rate: round3(count as f64 / games),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(champion: &str, win: bool, gold: i64) -> LaneParticipant {
        LaneParticipant {
            champion: champion.to_string(),
            win,
            gold_at_15: gold,
            early_kills: 0,
            early_deaths: 0,
            keystone: None,
            first_item: None,
        }
    }

    #[test]
    fn one_pairing_updates_exactly_two_buckets_symmetrically() {
        let mut buckets = BucketMap::new();
        let pairing = LanePairing {
            lane: "TOP".to_string(),
            first: participant("Darius", true, 5400),
            second: participant("Garen", false, 5100),
        };

        record_pairing(&mut buckets, "25.10", &pairing);

        assert_eq!(buckets.len(), 2);

        let winner = &buckets[&bucket_key("25.10", "TOP", "Darius", "Garen")];
        assert_eq!(winner.games, 1);
        assert_eq!(winner.wins, 1);
        assert_eq!(winner.gold_diff_sum, 300);

        let loser = &buckets[&bucket_key("25.10", "TOP", "Garen", "Darius")];
        assert_eq!(loser.games, 1);
        assert_eq!(loser.wins, 0);
        assert_eq!(loser.gold_diff_sum, -300);
    }

    #[test]
    fn unresolvable_or_mirror_pairings_are_skipped() {
        let mut buckets = BucketMap::new();

        let nameless = LanePairing {
            lane: "TOP".to_string(),
            first: participant("", true, 5000),
            second: participant("Garen", false, 5000),
        };
        record_pairing(&mut buckets, "25.10", &nameless);
        assert!(buckets.is_empty());

        let mirror = LanePairing {
            lane: "MIDDLE".to_string(),
            first: participant("Ahri", true, 5000),
            second: participant("Ahri", false, 5000),
        };
        record_pairing(&mut buckets, "25.10", &mirror);
        assert!(buckets.is_empty());
    }

    #[test]
    fn three_match_scenario_finalizes_expected_numbers() {
        // Gold diffs +300, -100, -200 with outcomes win/win/loss
        let mut buckets = BucketMap::new();
        let outcomes = [(true, 300i64), (true, -100), (false, -200)];

        for (win, diff) in outcomes {
            let pairing = LanePairing {
                lane: "TOP".to_string(),
                first: participant("Aatrox", win, 5000 + diff),
                second: participant("Gnar", !win, 5000),
            };
            record_pairing(&mut buckets, "25.10", &pairing);
        }

        let bucket = &buckets[&bucket_key("25.10", "TOP", "Aatrox", "Gnar")];
        let record = finalize_bucket(bucket, Utc::now(), Duration::hours(24)).unwrap();

        assert_eq!(record.games, 3);
        assert_eq!(record.win_rate, 0.667);
        assert_eq!(record.gold_diff_at_15, 0);
    }

    #[test]
    fn rates_and_histograms_follow_the_rounding_rules() {
        let mut buckets = BucketMap::new();

        for i in 0..3 {
            let pairing = LanePairing {
                lane: "MIDDLE".to_string(),
                first: LaneParticipant {
                    champion: "Ahri".to_string(),
                    win: i == 0,
                    gold_at_15: 5000,
                    early_kills: 1,
                    early_deaths: if i == 0 { 1 } else { 0 },
                    keystone: Some(if i < 2 { 8112 } else { 8229 }),
                    first_item: Some(3802),
                },
                second: participant("Zed", i != 0, 4800),
            };
            record_pairing(&mut buckets, "25.10", &pairing);
        }

        let bucket = &buckets[&bucket_key("25.10", "MIDDLE", "Ahri", "Zed")];
        let record = finalize_bucket(bucket, Utc::now(), Duration::hours(24)).unwrap();

        assert_eq!(record.early_kill_rate, 1.0);
        assert_eq!(record.early_death_rate, 0.333);

        assert_eq!(record.keystones.len(), 2);
        assert_eq!(record.keystones[0].id, 8112);
        assert_eq!(record.keystones[0].count, 2);
        assert_eq!(record.keystones[0].rate, 0.667);
        assert_eq!(record.keystones[1].id, 8229);

        assert_eq!(record.first_items.len(), 1);
        assert_eq!(record.first_items[0].rate, 1.0);
    }

    #[test]
    fn histograms_keep_only_the_top_three() {
        let mut counts = HashMap::new();
        counts.insert("1".to_string(), 5u32);
        counts.insert("2".to_string(), 4);
        counts.insert("3".to_string(), 3);
        counts.insert("4".to_string(), 2);

        let top = top_usage(&counts, 10.0);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].id, 1);
        assert_eq!(top[2].id, 3);
    }

    #[test]
    fn histogram_ties_break_on_identifier() {
        let mut counts = HashMap::new();
        counts.insert("9000".to_string(), 2u32);
        counts.insert("8100".to_string(), 2);

        let top = top_usage(&counts, 4.0);
        assert_eq!(top[0].id, 8100);
        assert_eq!(top[1].id, 9000);
    }

    #[test]
    fn bucket_map_round_trips_through_json() {
        let mut buckets = BucketMap::new();
        let pairing = LanePairing {
            lane: "BOTTOM".to_string(),
            first: participant("Jinx", true, 6000),
            second: participant("Caitlyn", false, 5800),
        };
        record_pairing(&mut buckets, "25.10", &pairing);

        let encoded = serde_json::to_string(&buckets).unwrap();
        let decoded: BucketMap = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, buckets);
    }
}
