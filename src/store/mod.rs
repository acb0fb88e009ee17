//! Freshness-aware cache store for finalized matchup statistics
//!
//! One contract, two interchangeable backends: an embedded sqlite file for
//! single-host deployments and a networked postgres store. Callers pick a
//! backend once at startup via [`open_store`] and are agnostic afterwards.
//!
//! Freshness is never filtered implicitly: `get` returns stale rows, and the
//! overview/listing operations classify rows against a caller-supplied "now".

pub mod postgres;
pub mod sqlite;

use crate::config::StorageConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Finalized per-pair statistics row
///
/// Identified by (patch, lane, player_champion, enemy_champion); symmetric
/// pairings are two independent directed rows. Numeric fields are stored
/// already rounded, so a round-trip through any backend is exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupStatRecord {
    pub patch: String,
    pub lane: String,
    pub player_champion: String,
    pub enemy_champion: String,
    pub games: u32,
    pub wins: u32,
    pub win_rate: f64,
    /// Average gold differential at the 15-minute snapshot, nearest integer
    pub gold_diff_at_15: i64,
    /// Kills before the 6-minute mark per game, 3 decimals
    pub early_kill_rate: f64,
    pub early_death_rate: f64,
    /// Top-3 keystone runes by pick frequency
    pub keystones: Vec<UsageStat>,
    /// Top-3 first-purchased items by frequency
    pub first_items: Vec<UsageStat>,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MatchupStatRecord {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// One entry of a usage histogram: identifier, raw count, count/games
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStat {
    pub id: i64,
    pub count: u32,
    pub rate: f64,
}

/// Aggregate freshness snapshot for a patch (optionally one lane)
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOverview {
    pub total: u64,
    pub fresh: u64,
    pub stale: u64,
    pub latest_computed_at: Option<DateTime<Utc>>,
}

/// Listing row, ordered most recently computed first
#[derive(Debug, Clone, PartialEq)]
pub struct PairSummary {
    pub lane: String,
    pub player_champion: String,
    pub enemy_champion: String,
    pub games: u32,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("postgres pool: {0}")]
    Pool(String),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait MatchupStore: Send + Sync {
    /// Point lookup; no implicit freshness filtering
    async fn get(
        &self,
        patch: &str,
        lane: &str,
        player_champion: &str,
        enemy_champion: &str,
    ) -> Result<Option<MatchupStatRecord>, StoreError>;

    /// Idempotent insert-or-replace on the unique tuple
    async fn upsert(&self, record: &MatchupStatRecord) -> Result<(), StoreError>;

    /// Bulk upsert in bounded chunks; each chunk commits atomically, and a
    /// failed chunk rolls back only itself. Returns the number of records
    /// committed.
    async fn upsert_many(&self, records: &[MatchupStatRecord]) -> Result<usize, StoreError>;

    /// Freshness overview computed against the supplied `now`
    async fn overview(
        &self,
        patch: &str,
        lane: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CacheOverview, StoreError>;

    /// Cached pairs, most recently computed first
    async fn list_pairs(
        &self,
        patch: &str,
        lane: Option<&str>,
        limit: usize,
        fresh_only: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<PairSummary>, StoreError>;

    /// Distinct champions observed on either side of a pairing in a lane
    async fn champions_in_lane(&self, patch: &str, lane: &str)
        -> Result<Vec<String>, StoreError>;
}

/// Select and initialize the configured backend
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn MatchupStore>, StoreError> {
    match config.backend.as_str() {
        "sqlite" => {
            let store = sqlite::SqliteStore::open(&config.sqlite_path, config.upsert_chunk_size)?;
            Ok(Arc::new(store))
        }
        "postgres" => {
            let store =
                postgres::PostgresStore::connect(&config.postgres_url, config.upsert_chunk_size)
                    .await?;
            Ok(Arc::new(store))
        }
        other => Err(StoreError::Backend(format!(
            "unknown storage backend '{}'",
            other
        ))),
    }
}
