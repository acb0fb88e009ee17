//! Nightly bulk collection scheduler
//!
//! One long-lived task loops: sleep until the configured UTC hour, run one
//! bulk collection job, log the outcome, re-arm. The loop body is sequential,
//! so two bulk jobs can never overlap, and a process-wide guard keeps a
//! second chain from being started by mistake.

use crate::collector::{CollectionJob, JobSettings};
use crate::config::Config;
use crate::logger::{self, LogTag};
use crate::riot::RiotClient;
use crate::store::MatchupStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

static SCHEDULER_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Delay until the next occurrence of `hour_utc`
///
/// An instant exactly on the slot schedules for the following day, so a job
/// that finishes within the same second cannot double-fire.
pub fn next_run_delay(now: DateTime<Utc>, hour_utc: u32) -> Duration {
    let today_slot = now
        .date_naive()
        .and_hms_opt(hour_utc, 0, 0)
        .expect("hour_utc validated to 0-23")
        .and_utc();

    let next = if today_slot > now {
        today_slot
    } else {
        today_slot + ChronoDuration::days(1)
    };

    (next - now).to_std().unwrap_or_default()
}

/// Run the nightly chain until process exit
///
/// Re-arms after every run regardless of success or failure. Only one chain
/// may be active per process; a second call logs a warning and returns.
pub async fn run_nightly(
    client: Arc<RiotClient>,
    store: Arc<dyn MatchupStore>,
    config: Config,
    patch: String,
    lanes: Vec<String>,
) {
    if SCHEDULER_ACTIVE.swap(true, Ordering::SeqCst) {
        logger::warning(
            LogTag::Scheduler,
            "nightly scheduler already active, refusing a second chain",
        );
        return;
    }

    logger::info(
        LogTag::Scheduler,
        &format!(
            "⏰ nightly scheduler armed for {:02}:00 UTC (patch {})",
            config.scheduler.hour_utc, patch
        ),
    );

    loop {
        let delay = next_run_delay(Utc::now(), config.scheduler.hour_utc);
        logger::info(
            LogTag::Scheduler,
            &format!(
                "next bulk run in {}h{:02}m",
                delay.as_secs() / 3600,
                (delay.as_secs() % 3600) / 60
            ),
        );
        tokio::time::sleep(delay).await;

        logger::info(LogTag::Scheduler, "starting nightly bulk collection");
        let settings = JobSettings::bulk(&config, &patch, lanes.clone());
        let job = CollectionJob::new(client.clone(), store.clone(), settings);

        match job.run().await {
            Ok(outcome) => {
                logger::info(
                    LogTag::Scheduler,
                    &format!(
                        "nightly run complete: {} matches, {} records, {} skipped",
                        outcome.matches_processed,
                        outcome.records_written,
                        outcome.items_skipped
                    ),
                );
            }
            Err(e) => {
                logger::error(LogTag::Scheduler, &format!("nightly run failed: {}", e));
            }
        }
        // Loop re-arms for the next slot, success or failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn delay_targets_the_same_day_before_the_slot() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 1, 30, 0).unwrap();
        let delay = next_run_delay(now, 3);
        assert_eq!(delay, Duration::from_secs(90 * 60));
    }

    #[test]
    fn delay_rolls_to_the_next_day_after_the_slot() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 4, 0, 0).unwrap();
        let delay = next_run_delay(now, 3);
        assert_eq!(delay, Duration::from_secs(23 * 3600));
    }

    #[test]
    fn exactly_on_the_slot_schedules_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 3, 0, 0).unwrap();
        let delay = next_run_delay(now, 3);
        assert_eq!(delay, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn midnight_slot_works() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 23, 59, 0).unwrap();
        let delay = next_run_delay(now, 0);
        assert_eq!(delay, Duration::from_secs(60));
    }
}
