//! Demand backfill queue
//!
//! Live lookups that miss the cache (or find too little data) enqueue the
//! pair here. Accepted pairs flow through a bounded channel to a single
//! worker, one pair in flight at a time, so backfill collections never
//! compete with the bulk job for more than one slot of the shared rate
//! budget. Every pair keeps a snapshot of its collection progress that is
//! overwritten on each transition and never deleted, so status queries keep
//! answering after the attempt finished.
//!
//! The cooldown timer resets after every attempt, success or failure, which
//! stops a hot pair from being re-collected in a tight loop.

use crate::collector::{CollectionJob, JobSettings};
use crate::config::Config;
use crate::logger::{self, LogTag};
use crate::riot::RiotClient;
use crate::store::MatchupStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One pair a caller wants collected up to a target sample size
#[derive(Debug, Clone)]
pub struct PairRequest {
    pub patch: String,
    pub lane: String,
    pub player_champion: String,
    pub enemy_champion: String,
    pub target_games: u32,
}

impl PairRequest {
    fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.patch, self.lane, self.player_champion, self.enemy_champion
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillState {
    Queued,
    Processing,
    Complete,
    Partial,
    Error,
}

/// Progress record for one pair; overwritten on every transition
#[derive(Debug, Clone, Serialize)]
pub struct BackfillSnapshot {
    pub patch: String,
    pub lane: String,
    pub player_champion: String,
    pub enemy_champion: String,
    pub target_games: u32,
    pub observed_games: u32,
    pub state: BackfillState,
    /// Set after every attempt; drives the cooldown window
    pub last_attempt: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Disabled,
    AlreadyQueued,
    AlreadyProcessing,
    Cooldown,
    QueueFull,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Disabled => "disabled",
            RejectReason::AlreadyQueued => "already_queued",
            RejectReason::AlreadyProcessing => "already_processing",
            RejectReason::Cooldown => "cooldown",
            RejectReason::QueueFull => "queue_full",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueOutcome {
    pub queued: bool,
    pub reason: Option<RejectReason>,
}

impl EnqueueOutcome {
    fn accepted() -> Self {
        Self {
            queued: true,
            reason: None,
        }
    }

    fn rejected(reason: RejectReason) -> Self {
        Self {
            queued: false,
            reason: Some(reason),
        }
    }
}

pub struct BackfillQueue {
    enabled: bool,
    cooldown: ChronoDuration,
    snapshots: Mutex<HashMap<String, BackfillSnapshot>>,
    tx: mpsc::Sender<PairRequest>,
}

impl BackfillQueue {
    /// Build the queue and hand back the receiving end for the worker
    pub fn new(config: &Config) -> (Arc<Self>, mpsc::Receiver<PairRequest>) {
        let backfill = &config.backfill;
        let (tx, rx) = mpsc::channel(backfill.capacity.max(1));
        let queue = Arc::new(Self {
            enabled: backfill.enabled,
            cooldown: ChronoDuration::seconds(backfill.cooldown_secs as i64),
            snapshots: Mutex::new(HashMap::new()),
            tx,
        });
        (queue, rx)
    }

    pub fn enqueue(&self, request: PairRequest) -> EnqueueOutcome {
        if !self.enabled {
            return EnqueueOutcome::rejected(RejectReason::Disabled);
        }

        let key = request.key();
        let now = Utc::now();
        let mut snapshots = self.snapshots.lock().unwrap();

        if let Some(snapshot) = snapshots.get(&key) {
            match snapshot.state {
                BackfillState::Queued => {
                    return EnqueueOutcome::rejected(RejectReason::AlreadyQueued);
                }
                BackfillState::Processing => {
                    return EnqueueOutcome::rejected(RejectReason::AlreadyProcessing);
                }
                _ => {
                    if let Some(last) = snapshot.last_attempt {
                        if now - last < self.cooldown {
                            return EnqueueOutcome::rejected(RejectReason::Cooldown);
                        }
                    }
                }
            }
        }

        match self.tx.try_send(request.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return EnqueueOutcome::rejected(RejectReason::QueueFull);
            }
            Err(TrySendError::Closed(_)) => {
                logger::warning(LogTag::Backfill, "worker channel closed, rejecting enqueue");
                return EnqueueOutcome::rejected(RejectReason::Disabled);
            }
        }

        let previous_attempt = snapshots.get(&key).and_then(|s| s.last_attempt);
        snapshots.insert(
            key,
            BackfillSnapshot {
                patch: request.patch,
                lane: request.lane,
                player_champion: request.player_champion,
                enemy_champion: request.enemy_champion,
                target_games: request.target_games,
                observed_games: 0,
                state: BackfillState::Queued,
                last_attempt: previous_attempt,
                updated_at: now,
                detail: None,
            },
        );

        EnqueueOutcome::accepted()
    }

    pub fn status(
        &self,
        patch: &str,
        lane: &str,
        player_champion: &str,
        enemy_champion: &str,
    ) -> Option<BackfillSnapshot> {
        let key = format!("{}|{}|{}|{}", patch, lane, player_champion, enemy_champion);
        self.snapshots.lock().unwrap().get(&key).cloned()
    }

    fn transition<F>(&self, key: &str, update: F)
    where
        F: FnOnce(&mut BackfillSnapshot),
    {
        let mut snapshots = self.snapshots.lock().unwrap();
        if let Some(snapshot) = snapshots.get_mut(key) {
            update(snapshot);
            snapshot.updated_at = Utc::now();
        }
    }
}

/// Spawn the single backfill worker
///
/// Strictly serial: one pair is collected at a time, in FIFO order. Failures
/// are recorded on the snapshot and never propagated to the enqueueing
/// caller.
pub fn spawn_worker(
    queue: Arc<BackfillQueue>,
    mut rx: mpsc::Receiver<PairRequest>,
    client: Arc<RiotClient>,
    store: Arc<dyn MatchupStore>,
    config: Config,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        logger::info(LogTag::Backfill, "backfill worker started");

        while let Some(request) = rx.recv().await {
            let key = request.key();
            logger::info(
                LogTag::Backfill,
                &format!(
                    "collecting {} vs {} ({} {}, target {} games)",
                    request.player_champion,
                    request.enemy_champion,
                    request.patch,
                    request.lane,
                    request.target_games
                ),
            );
            queue.transition(&key, |snapshot| {
                snapshot.state = BackfillState::Processing;
            });

            let settings = JobSettings::live(&config, &request.patch, &request.lane);
            let job = CollectionJob::new(client.clone(), store.clone(), settings);
            let run_result = job.run().await;

            // What a reader will actually see decides complete vs partial
            let observed = match store
                .get(
                    &request.patch,
                    &request.lane,
                    &request.player_champion,
                    &request.enemy_champion,
                )
                .await
            {
                Ok(record) => record.map(|r| r.games).unwrap_or(0),
                Err(e) => {
                    logger::warning(
                        LogTag::Backfill,
                        &format!("could not read back {}: {}", key, e),
                    );
                    0
                }
            };

            let now = Utc::now();
            match run_result {
                Ok(outcome) => {
                    let state = if observed >= request.target_games {
                        BackfillState::Complete
                    } else {
                        BackfillState::Partial
                    };
                    logger::info(
                        LogTag::Backfill,
                        &format!(
                            "{} finished: {:?} ({} observed games, {} matches processed)",
                            key, state, observed, outcome.matches_processed
                        ),
                    );
                    queue.transition(&key, |snapshot| {
                        snapshot.state = state;
                        snapshot.observed_games = observed;
                        snapshot.last_attempt = Some(now);
                        snapshot.detail = None;
                    });
                }
                Err(e) => {
                    logger::warning(LogTag::Backfill, &format!("{} failed: {}", key, e));
                    queue.transition(&key, |snapshot| {
                        snapshot.state = BackfillState::Error;
                        snapshot.observed_games = observed;
                        snapshot.last_attempt = Some(now);
                        snapshot.detail = Some(e.to_string());
                    });
                }
            }
        }

        logger::info(LogTag::Backfill, "backfill worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(enabled: bool, capacity: usize) -> Config {
        let mut config = Config::default();
        config.backfill.enabled = enabled;
        config.backfill.capacity = capacity;
        config.backfill.cooldown_secs = 900;
        config
    }

    fn request(player: &str, enemy: &str) -> PairRequest {
        PairRequest {
            patch: "25.10".to_string(),
            lane: "TOP".to_string(),
            player_champion: player.to_string(),
            enemy_champion: enemy.to_string(),
            target_games: 10,
        }
    }

    #[tokio::test]
    async fn second_enqueue_for_a_queued_pair_is_rejected() {
        let (queue, _rx) = BackfillQueue::new(&test_config(true, 8));

        let first = queue.enqueue(request("Darius", "Garen"));
        assert!(first.queued);
        assert_eq!(first.reason, None);

        let second = queue.enqueue(request("Darius", "Garen"));
        assert_eq!(
            second,
            EnqueueOutcome::rejected(RejectReason::AlreadyQueued)
        );
        assert_eq!(second.reason.unwrap().as_str(), "already_queued");
    }

    #[tokio::test]
    async fn processing_pairs_are_rejected_distinctly() {
        let (queue, _rx) = BackfillQueue::new(&test_config(true, 8));
        queue.enqueue(request("Darius", "Garen"));
        queue.transition("25.10|TOP|Darius|Garen", |s| {
            s.state = BackfillState::Processing;
        });

        let outcome = queue.enqueue(request("Darius", "Garen"));
        assert_eq!(
            outcome,
            EnqueueOutcome::rejected(RejectReason::AlreadyProcessing)
        );
    }

    #[tokio::test]
    async fn cooldown_rejects_until_it_elapses() {
        let (queue, _rx) = BackfillQueue::new(&test_config(true, 8));
        queue.enqueue(request("Darius", "Garen"));

        // Attempt just completed
        queue.transition("25.10|TOP|Darius|Garen", |s| {
            s.state = BackfillState::Complete;
            s.observed_games = 12;
            s.last_attempt = Some(Utc::now());
        });

        let during = queue.enqueue(request("Darius", "Garen"));
        assert_eq!(during, EnqueueOutcome::rejected(RejectReason::Cooldown));

        // Pretend the cooldown window has passed
        queue.transition("25.10|TOP|Darius|Garen", |s| {
            s.last_attempt = Some(Utc::now() - ChronoDuration::seconds(901));
        });

        let after = queue.enqueue(request("Darius", "Garen"));
        assert!(after.queued);
    }

    #[tokio::test]
    async fn full_queue_rejects_with_queue_full() {
        let (queue, _rx) = BackfillQueue::new(&test_config(true, 1));

        assert!(queue.enqueue(request("Darius", "Garen")).queued);
        let overflow = queue.enqueue(request("Ahri", "Zed"));
        assert_eq!(overflow, EnqueueOutcome::rejected(RejectReason::QueueFull));
    }

    #[tokio::test]
    async fn disabled_feature_rejects_everything() {
        let (queue, _rx) = BackfillQueue::new(&test_config(false, 8));
        let outcome = queue.enqueue(request("Darius", "Garen"));
        assert_eq!(outcome, EnqueueOutcome::rejected(RejectReason::Disabled));
    }

    #[tokio::test]
    async fn status_reports_the_snapshot_and_survives_completion() {
        let (queue, _rx) = BackfillQueue::new(&test_config(true, 8));
        assert!(queue.status("25.10", "TOP", "Darius", "Garen").is_none());

        queue.enqueue(request("Darius", "Garen"));
        let queued = queue.status("25.10", "TOP", "Darius", "Garen").unwrap();
        assert_eq!(queued.state, BackfillState::Queued);
        assert_eq!(queued.target_games, 10);

        queue.transition("25.10|TOP|Darius|Garen", |s| {
            s.state = BackfillState::Partial;
            s.observed_games = 4;
            s.last_attempt = Some(Utc::now());
        });

        let finished = queue.status("25.10", "TOP", "Darius", "Garen").unwrap();
        assert_eq!(finished.state, BackfillState::Partial);
        assert_eq!(finished.observed_games, 4);
    }
}
