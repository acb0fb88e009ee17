//! Networked postgres backend for the matchup store
//!
//! Pools connections with deadpool-postgres and satisfies the same
//! [`MatchupStore`] contract as the embedded backend. Histograms are JSONB,
//! timestamps are TIMESTAMPTZ, and bulk upserts commit per chunk inside a
//! transaction so a failed chunk never touches previously committed ones.

use super::{CacheOverview, MatchupStatRecord, MatchupStore, PairSummary, StoreError, UsageStat};
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

pub struct PostgresStore {
    pool: Pool,
    chunk_size: usize,
}

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS matchup_stats (
    patch TEXT NOT NULL,
    lane TEXT NOT NULL,
    player_champion TEXT NOT NULL,
    enemy_champion TEXT NOT NULL,
    games INTEGER NOT NULL CHECK (games > 0),
    wins INTEGER NOT NULL,
    win_rate DOUBLE PRECISION NOT NULL,
    gold_diff_at_15 BIGINT NOT NULL,
    early_kill_rate DOUBLE PRECISION NOT NULL,
    early_death_rate DOUBLE PRECISION NOT NULL,
    keystones JSONB NOT NULL,
    first_items JSONB NOT NULL,
    computed_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (patch, lane, player_champion, enemy_champion)
)";

const UPSERT_SQL: &str = "INSERT INTO matchup_stats
    (patch, lane, player_champion, enemy_champion, games, wins, win_rate,
     gold_diff_at_15, early_kill_rate, early_death_rate, keystones,
     first_items, computed_at, expires_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT (patch, lane, player_champion, enemy_champion) DO UPDATE SET
        games = EXCLUDED.games,
        wins = EXCLUDED.wins,
        win_rate = EXCLUDED.win_rate,
        gold_diff_at_15 = EXCLUDED.gold_diff_at_15,
        early_kill_rate = EXCLUDED.early_kill_rate,
        early_death_rate = EXCLUDED.early_death_rate,
        keystones = EXCLUDED.keystones,
        first_items = EXCLUDED.first_items,
        computed_at = EXCLUDED.computed_at,
        expires_at = EXCLUDED.expires_at";

impl PostgresStore {
    /// Connect to the database, create the pool, and ensure the schema exists
    pub async fn connect(url: &str, chunk_size: usize) -> Result<Self, StoreError> {
        let mut cfg = Config::new();
        cfg.url = Some(url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(format!("failed to create pool: {}", e)))?;

        let store = Self {
            pool,
            chunk_size: chunk_size.max(1),
        };

        let conn = store.get_conn().await?;
        conn.execute(SCHEMA_SQL, &[]).await?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_matchup_recency
             ON matchup_stats (patch, lane, computed_at DESC)",
            &[],
        )
        .await?;

        Ok(store)
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn row_to_record(row: &Row) -> Result<MatchupStatRecord, StoreError> {
    let keystones: serde_json::Value = row.get(10);
    let first_items: serde_json::Value = row.get(11);
    let keystones: Vec<UsageStat> = serde_json::from_value(keystones)?;
    let first_items: Vec<UsageStat> = serde_json::from_value(first_items)?;

    Ok(MatchupStatRecord {
        patch: row.get(0),
        lane: row.get(1),
        player_champion: row.get(2),
        enemy_champion: row.get(3),
        games: row.get::<_, i32>(4) as u32,
        wins: row.get::<_, i32>(5) as u32,
        win_rate: row.get(6),
        gold_diff_at_15: row.get(7),
        early_kill_rate: row.get(8),
        early_death_rate: row.get(9),
        keystones,
        first_items,
        computed_at: row.get(12),
        expires_at: row.get(13),
    })
}

type EncodedRecord = (serde_json::Value, serde_json::Value, i32, i32);

fn upsert_params(record: &MatchupStatRecord) -> Result<EncodedRecord, StoreError> {
    Ok((
        serde_json::to_value(&record.keystones)?,
        serde_json::to_value(&record.first_items)?,
        record.games as i32,
        record.wins as i32,
    ))
}

#[async_trait]
impl MatchupStore for PostgresStore {
    async fn get(
        &self,
        patch: &str,
        lane: &str,
        player_champion: &str,
        enemy_champion: &str,
    ) -> Result<Option<MatchupStatRecord>, StoreError> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT patch, lane, player_champion, enemy_champion, games, wins,
                        win_rate, gold_diff_at_15, early_kill_rate, early_death_rate,
                        keystones, first_items, computed_at, expires_at
                 FROM matchup_stats
                 WHERE patch = $1 AND lane = $2 AND player_champion = $3 AND enemy_champion = $4",
                &[&patch, &lane, &player_champion, &enemy_champion],
            )
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: &MatchupStatRecord) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let (keystones, first_items, games, wins) = upsert_params(record)?;

        conn.execute(
            UPSERT_SQL,
            &[
                &record.patch,
                &record.lane,
                &record.player_champion,
                &record.enemy_champion,
                &games,
                &wins,
                &record.win_rate,
                &record.gold_diff_at_15,
                &record.early_kill_rate,
                &record.early_death_rate,
                &keystones,
                &first_items,
                &record.computed_at,
                &record.expires_at,
            ],
        )
        .await?;

        Ok(())
    }

    async fn upsert_many(&self, records: &[MatchupStatRecord]) -> Result<usize, StoreError> {
        let mut conn = self.get_conn().await?;
        let mut committed = 0usize;

        for chunk in records.chunks(self.chunk_size) {
            let tx = conn.transaction().await?;
            let stmt = tx.prepare(UPSERT_SQL).await?;

            let mut chunk_failed = None;
            for record in chunk {
                let (keystones, first_items, games, wins) = match upsert_params(record) {
                    Ok(values) => values,
                    Err(e) => {
                        chunk_failed = Some(e);
                        break;
                    }
                };
                let params: [&(dyn ToSql + Sync); 14] = [
                    &record.patch,
                    &record.lane,
                    &record.player_champion,
                    &record.enemy_champion,
                    &games,
                    &wins,
                    &record.win_rate,
                    &record.gold_diff_at_15,
                    &record.early_kill_rate,
                    &record.early_death_rate,
                    &keystones,
                    &first_items,
                    &record.computed_at,
                    &record.expires_at,
                ];
                if let Err(e) = tx.execute(&stmt, &params).await {
                    chunk_failed = Some(StoreError::Postgres(e));
                    break;
                }
            }

            if let Some(e) = chunk_failed {
                // Dropping the transaction rolls back this chunk only
                drop(tx);
                logger::warning(
                    LogTag::Cache,
                    &format!(
                        "bulk upsert aborted after {} committed records: {}",
                        committed, e
                    ),
                );
                return Err(e);
            }

            tx.commit().await?;
            committed += chunk.len();
        }

        Ok(committed)
    }

    async fn overview(
        &self,
        patch: &str,
        lane: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CacheOverview, StoreError> {
        let conn = self.get_conn().await?;

        let row = match lane {
            Some(lane) => {
                conn.query_one(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN expires_at > $1 THEN 1 ELSE 0 END), 0),
                            MAX(computed_at)
                     FROM matchup_stats WHERE patch = $2 AND lane = $3",
                    &[&now, &patch, &lane],
                )
                .await?
            }
            None => {
                conn.query_one(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN expires_at > $1 THEN 1 ELSE 0 END), 0),
                            MAX(computed_at)
                     FROM matchup_stats WHERE patch = $2",
                    &[&now, &patch],
                )
                .await?
            }
        };

        let total = row.get::<_, i64>(0) as u64;
        let fresh = row.get::<_, i64>(1) as u64;

        Ok(CacheOverview {
            total,
            fresh,
            stale: total - fresh,
            latest_computed_at: row.get(2),
        })
    }

    async fn list_pairs(
        &self,
        patch: &str,
        lane: Option<&str>,
        limit: usize,
        fresh_only: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<PairSummary>, StoreError> {
        let conn = self.get_conn().await?;
        let limit = limit as i64;

        let mut sql = String::from(
            "SELECT lane, player_champion, enemy_champion, games, computed_at
             FROM matchup_stats WHERE patch = $1",
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&patch];

        if let Some(ref lane_val) = lane {
            params.push(lane_val);
            sql.push_str(&format!(" AND lane = ${}", params.len()));
        }
        if fresh_only {
            params.push(&now);
            sql.push_str(&format!(" AND expires_at > ${}", params.len()));
        }
        params.push(&limit);
        sql.push_str(&format!(
            " ORDER BY computed_at DESC LIMIT ${}",
            params.len()
        ));

        let rows = conn.query(&sql, params.as_slice()).await?;

        Ok(rows
            .iter()
            .map(|row| PairSummary {
                lane: row.get(0),
                player_champion: row.get(1),
                enemy_champion: row.get(2),
                games: row.get::<_, i32>(3) as u32,
                computed_at: row.get(4),
            })
            .collect())
    }

    async fn champions_in_lane(
        &self,
        patch: &str,
        lane: &str,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT player_champion FROM matchup_stats WHERE patch = $1 AND lane = $2
                 UNION
                 SELECT enemy_champion FROM matchup_stats WHERE patch = $1 AND lane = $2
                 ORDER BY 1",
                &[&patch, &lane],
            )
            .await?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}
