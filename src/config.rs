use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub riot: RiotConfig,
    pub storage: StorageConfig,
    pub collection: CollectionConfig,
    pub backfill: BackfillConfig,
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiotConfig {
    /// API credential; may be left empty and supplied via RIOT_API_KEY
    pub api_key: String,
    /// Platform routing host (league-v4 endpoints)
    pub platform_host: String,
    /// Regional routing host (match-v5 endpoints)
    pub regional_host: String,
    /// Ranked queue identifier used for match-id listings
    pub queue_id: u32,
    /// Queue name used for the leaderboard endpoint
    pub queue_name: String,
    pub short_window_limit: usize,
    pub short_window_secs: u64,
    pub long_window_limit: usize,
    pub long_window_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Minimum cooldown after a 429, even when Retry-After is shorter
    pub cooldown_floor_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "postgres"
    pub backend: String,
    pub sqlite_path: String,
    #[serde(default)]
    pub postgres_url: String,
    pub upsert_chunk_size: usize,
    /// Records expire this long after they are computed
    pub ttl_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// How many leaderboard players seed the crawl
    pub player_pool: usize,
    pub matches_per_player: usize,
    pub max_matches: usize,
    pub lanes: Vec<String>,
    pub checkpoint_path: String,
    /// Checkpoint after this many processed units
    pub checkpoint_interval: usize,
    pub worker_concurrency: usize,
    /// Retry a failed player/match once within the run before skipping it
    pub retry_failed_items: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    pub enabled: bool,
    /// Maximum queued pairs awaiting the worker
    pub capacity: usize,
    /// Per-pair cooldown after any attempt, success or failure
    pub cooldown_secs: u64,
    pub default_target_games: u32,
    /// Reduced caps for live collections so they stay cheap
    pub live_player_pool: usize,
    pub live_matches_per_player: usize,
    pub live_max_matches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Hour of day (UTC) the nightly bulk job starts
    pub hour_utc: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Upper bound on a live read against the store
    pub store_timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 2_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            riot: RiotConfig {
                api_key: String::new(),
                platform_host: "euw1.api.riotgames.com".to_string(),
                regional_host: "europe.api.riotgames.com".to_string(),
                queue_id: 420,
                queue_name: "RANKED_SOLO_5x5".to_string(),
                short_window_limit: 20,
                short_window_secs: 1,
                long_window_limit: 100,
                long_window_secs: 120,
                retry_attempts: 3,
                retry_delay_ms: 500,
                max_retry_delay_ms: 8_000,
                cooldown_floor_secs: 10,
                request_timeout_secs: 10,
            },
            storage: StorageConfig {
                backend: "sqlite".to_string(),
                sqlite_path: "lanescout.db".to_string(),
                postgres_url: String::new(),
                upsert_chunk_size: 200,
                ttl_hours: 24,
            },
            collection: CollectionConfig {
                player_pool: 50,
                matches_per_player: 20,
                max_matches: 400,
                lanes: vec![
                    "TOP".to_string(),
                    "JUNGLE".to_string(),
                    "MIDDLE".to_string(),
                    "BOTTOM".to_string(),
                    "UTILITY".to_string(),
                ],
                checkpoint_path: "lanescout-checkpoint.json".to_string(),
                checkpoint_interval: 25,
                worker_concurrency: 4,
                retry_failed_items: true,
            },
            backfill: BackfillConfig {
                enabled: true,
                capacity: 32,
                cooldown_secs: 900,
                default_target_games: 10,
                live_player_pool: 10,
                live_matches_per_player: 5,
                live_max_matches: 40,
            },
            scheduler: SchedulerConfig {
                enabled: true,
                hour_utc: 3,
            },
            lookup: LookupConfig::default(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            let default_config = Self::default();
            default_config.save(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        match self.storage.backend.as_str() {
            "sqlite" => {
                if self.storage.sqlite_path.is_empty() {
                    return Err(anyhow::anyhow!("storage.sqlite_path is required"));
                }
            }
            "postgres" => {
                if self.storage.postgres_url.is_empty() {
                    return Err(anyhow::anyhow!(
                        "storage.postgres_url is required for the postgres backend"
                    ));
                }
            }
            other => {
                return Err(anyhow::anyhow!(
                    "unknown storage backend '{}' (expected sqlite or postgres)",
                    other
                ));
            }
        }

        if self.riot.short_window_limit == 0 || self.riot.long_window_limit == 0 {
            return Err(anyhow::anyhow!("rate limit windows must allow at least one call"));
        }
        if self.collection.worker_concurrency == 0 {
            return Err(anyhow::anyhow!("collection.worker_concurrency must be > 0"));
        }
        if self.scheduler.hour_utc > 23 {
            return Err(anyhow::anyhow!("scheduler.hour_utc must be 0-23"));
        }

        Ok(())
    }

    /// Resolve the API credential: environment wins over the config file
    pub fn resolved_api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var("RIOT_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }
        if !self.riot.api_key.trim().is_empty() {
            return Ok(self.riot.api_key.clone());
        }
        Err(anyhow::anyhow!(
            "no API credential: set riot.api_key in the config or the RIOT_API_KEY env var"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn postgres_backend_requires_url() {
        let mut config = Config::default();
        config.storage.backend = "postgres".to_string();
        assert!(config.validate().is_err());

        config.storage.postgres_url = "postgres://localhost/lanescout".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut config = Config::default();
        config.storage.backend = "redis".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_creates_default_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let path_str = path.to_str().unwrap();

        let config = Config::load(path_str).unwrap();
        assert!(path.exists());
        assert_eq!(config.storage.backend, "sqlite");

        // Round-trips through the file it just wrote
        let reloaded = Config::load(path_str).unwrap();
        assert_eq!(reloaded.collection.player_pool, config.collection.player_pool);
    }
}
