//! Rate-limited client for the match-history API
//!
//! Single choke point for every outbound call: the bulk job, the backfill
//! worker, and live lookups all share one `RiotClient` so the provider's
//! budget is respected globally. Admission to the budget is serialized
//! through a one-permit semaphore and two sliding windows (short burst window
//! and long sustained window). A 429 puts the whole client into cooldown;
//! while cooling down, calls fail fast instead of queueing against a budget
//! that cannot serve them.

use crate::config::RiotConfig;
use crate::errors::RiotApiError;
use crate::logger::{self, LogTag};
use crate::riot::types::{EndpointClass, LeagueListDto, MatchDto, TimelineDto};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Bodies longer than this are truncated before being attached to errors
const ERROR_BODY_LIMIT: usize = 512;

/// Which routing host an endpoint lives on
#[derive(Debug, Clone, Copy)]
enum Host {
    Platform,
    Regional,
}

struct Windows {
    short: VecDeque<Instant>,
    long: VecDeque<Instant>,
}

/// Sliding-window admission gate shared by all callers
///
/// `admit` serializes callers through a single permit, waits until both
/// windows have room, then records the call. The permit is released before
/// any network I/O so requests may overlap once admitted; only admission to
/// the budget is serialized.
pub struct RateGate {
    permit: Semaphore,
    windows: Mutex<Windows>,
    short_limit: usize,
    short_span: Duration,
    long_limit: usize,
    long_span: Duration,
}

impl RateGate {
    pub fn new(
        short_limit: usize,
        short_span: Duration,
        long_limit: usize,
        long_span: Duration,
    ) -> Self {
        Self {
            permit: Semaphore::new(1),
            windows: Mutex::new(Windows {
                short: VecDeque::new(),
                long: VecDeque::new(),
            }),
            short_limit,
            short_span,
            long_limit,
            long_span,
        }
    }

    /// Wait for budget room and record the call. Returns the admission instant.
    pub async fn admit(&self) -> Instant {
        let _guard = self
            .permit
            .acquire()
            .await
            .expect("rate gate semaphore closed");

        loop {
            let wait = {
                let mut windows = self.windows.lock().expect("rate gate lock poisoned");
                let now = Instant::now();
                Self::prune(&mut windows.short, self.short_span, now);
                Self::prune(&mut windows.long, self.long_span, now);

                if windows.short.len() < self.short_limit && windows.long.len() < self.long_limit {
                    windows.short.push_back(now);
                    windows.long.push_back(now);
                    return now;
                }

                let mut until = now;
                if windows.short.len() >= self.short_limit {
                    if let Some(oldest) = windows.short.front() {
                        until = until.max(*oldest + self.short_span);
                    }
                }
                if windows.long.len() >= self.long_limit {
                    if let Some(oldest) = windows.long.front() {
                        until = until.max(*oldest + self.long_span);
                    }
                }
                until.saturating_duration_since(now)
            };

            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    fn prune(window: &mut VecDeque<Instant>, span: Duration, now: Instant) {
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= span {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

pub struct RiotClient {
    http: Client,
    api_key: String,
    platform_host: String,
    regional_host: String,
    queue_id: u32,
    queue_name: String,
    gate: Arc<RateGate>,
    cooldown_until: Mutex<Option<Instant>>,
    cooldown_floor: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    max_retry_delay: Duration,
}

impl RiotClient {
    pub fn new(config: &RiotConfig, api_key: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            platform_host: config.platform_host.clone(),
            regional_host: config.regional_host.clone(),
            queue_id: config.queue_id,
            queue_name: config.queue_name.clone(),
            gate: Arc::new(RateGate::new(
                config.short_window_limit,
                Duration::from_secs(config.short_window_secs),
                config.long_window_limit,
                Duration::from_secs(config.long_window_secs),
            )),
            cooldown_until: Mutex::new(None),
            cooldown_floor: Duration::from_secs(config.cooldown_floor_secs),
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_retry_delay: Duration::from_millis(config.max_retry_delay_ms),
        })
    }

    // =========================================================================
    // TYPED ENDPOINTS
    // =========================================================================

    /// Top-tier leaderboard for the configured ranked queue
    pub async fn challenger_league(&self) -> Result<LeagueListDto, RiotApiError> {
        let path = format!(
            "/lol/league/v4/challengerleagues/by-queue/{}",
            self.queue_name
        );
        self.get(EndpointClass::League, Host::Platform, &path, &[])
            .await
    }

    /// Recent ranked match ids for a player
    pub async fn match_ids_by_puuid(
        &self,
        puuid: &str,
        count: usize,
    ) -> Result<Vec<String>, RiotApiError> {
        let path = format!("/lol/match/v5/matches/by-puuid/{}/ids", puuid);
        let query = [
            ("queue".to_string(), self.queue_id.to_string()),
            ("count".to_string(), count.to_string()),
        ];
        self.get(EndpointClass::MatchIds, Host::Regional, &path, &query)
            .await
    }

    pub async fn match_detail(&self, match_id: &str) -> Result<MatchDto, RiotApiError> {
        let path = format!("/lol/match/v5/matches/{}", match_id);
        self.get(EndpointClass::Match, Host::Regional, &path, &[])
            .await
    }

    pub async fn match_timeline(&self, match_id: &str) -> Result<TimelineDto, RiotApiError> {
        let path = format!("/lol/match/v5/matches/{}/timeline", match_id);
        self.get(EndpointClass::Timeline, Host::Regional, &path, &[])
            .await
    }

    // =========================================================================
    // REQUEST PIPELINE
    // =========================================================================

    async fn get<T>(
        &self,
        class: EndpointClass,
        host: Host,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, RiotApiError>
    where
        T: DeserializeOwned,
    {
        let host_name = match host {
            Host::Platform => &self.platform_host,
            Host::Regional => &self.regional_host,
        };
        let url = format!("https://{}{}", host_name, path);
        let endpoint = class.as_str();

        let mut attempt: u32 = 0;
        loop {
            // Fail fast while a 429 cooldown is in force, including one that
            // another caller triggered while we were queued.
            if let Some(remaining) = self.remaining_cooldown() {
                return Err(RiotApiError::CooldownActive { remaining });
            }

            let admitted = self.gate.admit().await;
            attempt += 1;

            let response = self
                .http
                .get(&url)
                .header("X-Riot-Token", &self.api_key)
                .query(query)
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    if attempt <= self.retry_attempts {
                        let delay = self.backoff_delay(attempt);
                        logger::warning(
                            LogTag::Api,
                            &format!(
                                "{} request failed ({}), retrying in {:?} (attempt {}/{})",
                                endpoint, err, delay, attempt, self.retry_attempts
                            ),
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(RiotApiError::Network {
                        endpoint: endpoint.to_string(),
                        detail: err.to_string(),
                    });
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let advertised = parse_retry_after(
                    response
                        .headers()
                        .get("Retry-After")
                        .and_then(|value| value.to_str().ok()),
                );
                let cooldown = advertised.unwrap_or(self.cooldown_floor).max(self.cooldown_floor);
                self.begin_cooldown(cooldown);
                logger::warning(
                    LogTag::Api,
                    &format!(
                        "429 on {}, entering {}s cooldown",
                        endpoint,
                        cooldown.as_secs()
                    ),
                );

                if attempt <= self.retry_attempts {
                    // The triggering call sleeps through its own cooldown and
                    // retries; every other caller fails fast in the meantime.
                    tokio::time::sleep(cooldown).await;
                    continue;
                }
                return Err(RiotApiError::RateLimited {
                    endpoint: endpoint.to_string(),
                    retry_after: cooldown,
                });
            }

            if status == StatusCode::NOT_FOUND {
                return Err(RiotApiError::NotFound {
                    endpoint: format!("{} {}", endpoint, path),
                });
            }

            if !status.is_success() {
                let body = truncate_body(response.text().await.unwrap_or_default());
                if status.is_server_error() && attempt <= self.retry_attempts {
                    let delay = self.backoff_delay(attempt);
                    logger::warning(
                        LogTag::Api,
                        &format!(
                            "HTTP {} on {}, retrying in {:?} (attempt {}/{})",
                            status, endpoint, delay, attempt, self.retry_attempts
                        ),
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(RiotApiError::Http {
                    endpoint: endpoint.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }

            return match response.json::<T>().await {
                Ok(value) => {
                    logger::debug(
                        LogTag::Api,
                        &format!(
                            "{} {} ok in {}ms",
                            endpoint,
                            path,
                            admitted.elapsed().as_millis()
                        ),
                    );
                    Ok(value)
                }
                Err(err) => Err(RiotApiError::Parse {
                    endpoint: endpoint.to_string(),
                    detail: err.to_string(),
                }),
            };
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .retry_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_retry_delay);
        let jitter = rand::thread_rng().gen_range(0..=self.retry_delay.as_millis() as u64 / 2);
        capped + Duration::from_millis(jitter)
    }

    fn begin_cooldown(&self, duration: Duration) {
        let mut guard = self.cooldown_until.lock().expect("cooldown lock poisoned");
        let candidate = Instant::now() + duration;
        *guard = Some(match *guard {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        });
    }

    fn remaining_cooldown(&self) -> Option<Duration> {
        let mut guard = self.cooldown_until.lock().expect("cooldown lock poisoned");
        match *guard {
            Some(until) => {
                let now = Instant::now();
                if until > now {
                    Some(until - now)
                } else {
                    *guard = None;
                    None
                }
            }
            None => None,
        }
    }
}

fn parse_retry_after(header: Option<&str>) -> Option<Duration> {
    header
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate_body(body: String) -> String {
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &body[..cut])
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_client() -> RiotClient {
        let config = Config::default();
        RiotClient::new(&config.riot, "test-key".to_string()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sliding_window_never_exceeds_short_ceiling() {
        let gate = Arc::new(RateGate::new(
            3,
            Duration::from_millis(300),
            100,
            Duration::from_secs(120),
        ));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move { gate.admit().await }));
        }

        let mut admissions = Vec::new();
        for handle in handles {
            admissions.push(handle.await.unwrap());
        }
        admissions.sort();

        // Every sliding 300ms window must contain at most 3 admissions
        for (i, start) in admissions.iter().enumerate() {
            let in_window = admissions[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < Duration::from_millis(300))
                .count();
            assert!(
                in_window <= 3,
                "window starting at admission {} held {} calls",
                i,
                in_window
            );
        }
    }

    #[tokio::test]
    async fn long_window_is_enforced_too() {
        let gate = RateGate::new(100, Duration::from_millis(10), 2, Duration::from_millis(200));

        let first = gate.admit().await;
        gate.admit().await;
        let third = gate.admit().await;

        // Third admission had to wait for the long window to roll over
        assert!(third.duration_since(first) >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn cooldown_fails_fast_with_remaining_time() {
        let client = test_client();
        client.begin_cooldown(Duration::from_secs(30));

        let result: Result<serde_json::Value, _> = client
            .get(EndpointClass::Match, Host::Regional, "/lol/test", &[])
            .await;

        match result {
            Err(RiotApiError::CooldownActive { remaining }) => {
                assert!(remaining <= Duration::from_secs(30));
                assert!(remaining > Duration::from_secs(25));
            }
            other => panic!("expected CooldownActive, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn cooldown_expires() {
        let client = test_client();
        client.begin_cooldown(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(client.remaining_cooldown().is_none());
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after(Some("7")), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(Some(" 12 ")), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
