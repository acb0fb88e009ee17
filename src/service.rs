//! Live lookup service
//!
//! The consumer-facing read path: point lookup against the store with an
//! explicit timeout, freshness classification against the caller's "now",
//! and an automatic backfill enqueue when the data is missing, stale, or
//! below the target sample size. A lookup never blocks on collection and
//! never fails the caller; degraded reads fall back to `Unavailable`.

use crate::backfill::{BackfillQueue, EnqueueOutcome, PairRequest};
use crate::config::Config;
use crate::logger::{self, LogTag};
use crate::store::{MatchupStatRecord, MatchupStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    /// Record exists and `now < expires_at`
    Fresh,
    /// Record exists but has expired; still served
    Stale,
    /// No record for the pair
    Missing,
    /// The store did not answer in time; documented fallback
    Unavailable,
}

#[derive(Debug)]
pub struct LookupResult {
    pub status: LookupStatus,
    pub record: Option<MatchupStatRecord>,
    /// Outcome of the automatic backfill enqueue, when one was attempted
    pub backfill: Option<EnqueueOutcome>,
}

pub struct StatsService {
    store: Arc<dyn MatchupStore>,
    backfill: Option<Arc<BackfillQueue>>,
    store_timeout: Duration,
    target_games: u32,
}

impl StatsService {
    pub fn new(
        store: Arc<dyn MatchupStore>,
        backfill: Option<Arc<BackfillQueue>>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            backfill,
            store_timeout: Duration::from_millis(config.lookup.store_timeout_ms),
            target_games: config.backfill.default_target_games,
        }
    }

    pub async fn lookup(
        &self,
        patch: &str,
        lane: &str,
        player_champion: &str,
        enemy_champion: &str,
        now: DateTime<Utc>,
    ) -> LookupResult {
        let read = tokio::time::timeout(
            self.store_timeout,
            self.store.get(patch, lane, player_champion, enemy_champion),
        )
        .await;

        let record = match read {
            Err(_) => {
                logger::warning(
                    LogTag::Cache,
                    &format!(
                        "store read for {}/{} {} vs {} timed out after {:?}",
                        patch, lane, player_champion, enemy_champion, self.store_timeout
                    ),
                );
                return LookupResult {
                    status: LookupStatus::Unavailable,
                    record: None,
                    backfill: None,
                };
            }
            Ok(Err(e)) => {
                logger::warning(LogTag::Cache, &format!("store read failed: {}", e));
                return LookupResult {
                    status: LookupStatus::Unavailable,
                    record: None,
                    backfill: None,
                };
            }
            Ok(Ok(record)) => record,
        };

        match record {
            None => {
                let backfill = self.request_backfill(patch, lane, player_champion, enemy_champion);
                LookupResult {
                    status: LookupStatus::Missing,
                    record: None,
                    backfill,
                }
            }
            Some(record) => {
                let status = if record.is_fresh(now) {
                    LookupStatus::Fresh
                } else {
                    LookupStatus::Stale
                };
                // Stale or thin data is still served, but a refresh is queued
                let backfill = if status == LookupStatus::Stale
                    || record.games < self.target_games
                {
                    self.request_backfill(patch, lane, player_champion, enemy_champion)
                } else {
                    None
                };
                LookupResult {
                    status,
                    record: Some(record),
                    backfill,
                }
            }
        }
    }

    fn request_backfill(
        &self,
        patch: &str,
        lane: &str,
        player_champion: &str,
        enemy_champion: &str,
    ) -> Option<EnqueueOutcome> {
        let queue = self.backfill.as_ref()?;
        let outcome = queue.enqueue(PairRequest {
            patch: patch.to_string(),
            lane: lane.to_string(),
            player_champion: player_champion.to_string(),
            enemy_champion: enemy_champion.to_string(),
            target_games: self.target_games,
        });
        if outcome.queued {
            logger::debug(
                LogTag::Backfill,
                &format!("queued backfill for {} vs {}", player_champion, enemy_champion),
            );
        }
        Some(outcome)
    }
}
