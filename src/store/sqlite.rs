//! Embedded sqlite backend for the matchup store
//!
//! Single-file database behind a shared connection. Histogram columns are
//! JSON text; timestamps are RFC 3339 text, which keeps lexicographic and
//! chronological ordering identical so freshness comparisons can run in SQL.

use super::{CacheOverview, MatchupStatRecord, MatchupStore, PairSummary, StoreError, UsageStat};
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    chunk_size: usize,
}

impl SqliteStore {
    pub fn open(path: &str, chunk_size: usize) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, chunk_size)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory(chunk_size: usize) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, chunk_size)
    }

    fn from_connection(conn: Connection, chunk_size: usize) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            chunk_size: chunk_size.max(1),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS matchup_stats (
            patch TEXT NOT NULL,
            lane TEXT NOT NULL,
            player_champion TEXT NOT NULL,
            enemy_champion TEXT NOT NULL,
            games INTEGER NOT NULL CHECK (games > 0),
            wins INTEGER NOT NULL,
            win_rate REAL NOT NULL,
            gold_diff_at_15 INTEGER NOT NULL,
            early_kill_rate REAL NOT NULL,
            early_death_rate REAL NOT NULL,
            keystones TEXT NOT NULL,
            first_items TEXT NOT NULL,
            computed_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (patch, lane, player_champion, enemy_champion)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_matchup_recency
         ON matchup_stats (patch, lane, computed_at DESC)",
        [],
    )?;

    Ok(())
}

fn ts_to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn ts_from_text(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MatchupStatRecord> {
    let keystones_raw: String = row.get(10)?;
    let first_items_raw: String = row.get(11)?;
    let computed_raw: String = row.get(12)?;
    let expires_raw: String = row.get(13)?;

    let keystones: Vec<UsageStat> = serde_json::from_str(&keystones_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;
    let first_items: Vec<UsageStat> = serde_json::from_str(&first_items_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;

    Ok(MatchupStatRecord {
        patch: row.get(0)?,
        lane: row.get(1)?,
        player_champion: row.get(2)?,
        enemy_champion: row.get(3)?,
        games: row.get(4)?,
        wins: row.get(5)?,
        win_rate: row.get(6)?,
        gold_diff_at_15: row.get(7)?,
        early_kill_rate: row.get(8)?,
        early_death_rate: row.get(9)?,
        keystones,
        first_items,
        computed_at: ts_from_text(&computed_raw, 12)?,
        expires_at: ts_from_text(&expires_raw, 13)?,
    })
}

const UPSERT_SQL: &str = "INSERT INTO matchup_stats
    (patch, lane, player_champion, enemy_champion, games, wins, win_rate,
     gold_diff_at_15, early_kill_rate, early_death_rate, keystones,
     first_items, computed_at, expires_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
    ON CONFLICT(patch, lane, player_champion, enemy_champion) DO UPDATE SET
        games = excluded.games,
        wins = excluded.wins,
        win_rate = excluded.win_rate,
        gold_diff_at_15 = excluded.gold_diff_at_15,
        early_kill_rate = excluded.early_kill_rate,
        early_death_rate = excluded.early_death_rate,
        keystones = excluded.keystones,
        first_items = excluded.first_items,
        computed_at = excluded.computed_at,
        expires_at = excluded.expires_at";

fn execute_upsert(conn: &Connection, record: &MatchupStatRecord) -> Result<(), StoreError> {
    let keystones = serde_json::to_string(&record.keystones)?;
    let first_items = serde_json::to_string(&record.first_items)?;

    conn.execute(
        UPSERT_SQL,
        params![
            record.patch,
            record.lane,
            record.player_champion,
            record.enemy_champion,
            record.games,
            record.wins,
            record.win_rate,
            record.gold_diff_at_15,
            record.early_kill_rate,
            record.early_death_rate,
            keystones,
            first_items,
            ts_to_text(record.computed_at),
            ts_to_text(record.expires_at),
        ],
    )?;

    Ok(())
}

#[async_trait]
impl MatchupStore for SqliteStore {
    async fn get(
        &self,
        patch: &str,
        lane: &str,
        player_champion: &str,
        enemy_champion: &str,
    ) -> Result<Option<MatchupStatRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT patch, lane, player_champion, enemy_champion, games, wins,
                    win_rate, gold_diff_at_15, early_kill_rate, early_death_rate,
                    keystones, first_items, computed_at, expires_at
             FROM matchup_stats
             WHERE patch = ?1 AND lane = ?2 AND player_champion = ?3 AND enemy_champion = ?4",
        )?;

        let mut rows = stmt.query_map(
            params![patch, lane, player_champion, enemy_champion],
            row_to_record,
        )?;

        match rows.next() {
            Some(record) => Ok(Some(record?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: &MatchupStatRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        execute_upsert(&conn, record)
    }

    async fn upsert_many(&self, records: &[MatchupStatRecord]) -> Result<usize, StoreError> {
        let mut committed = 0usize;
        let mut conn = self.conn.lock().unwrap();

        for chunk in records.chunks(self.chunk_size) {
            let tx = conn.transaction()?;
            for record in chunk {
                if let Err(e) = execute_upsert(&tx, record) {
                    // The failed chunk rolls back on drop; earlier chunks stay
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
            }
            tx.commit()?;
            committed += chunk.len();
            logger::debug(
                LogTag::Cache,
                &format!("committed upsert chunk ({} total)", committed),
            );
        }

        Ok(committed)
    }

    async fn overview(
        &self,
        patch: &str,
        lane: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CacheOverview, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now_text = ts_to_text(now);

        let (sql, params_vec): (&str, Vec<&dyn rusqlite::ToSql>) = match lane {
            Some(ref lane_val) => (
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0),
                        MAX(computed_at)
                 FROM matchup_stats WHERE patch = ?2 AND lane = ?3",
                vec![&now_text, &patch, lane_val],
            ),
            None => (
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0),
                        MAX(computed_at)
                 FROM matchup_stats WHERE patch = ?2",
                vec![&now_text, &patch],
            ),
        };

        let (total, fresh, latest_raw): (u64, u64, Option<String>) =
            conn.query_row(sql, params_vec.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;

        let latest_computed_at = match latest_raw {
            Some(raw) => Some(ts_from_text(&raw, 2).map_err(StoreError::Sqlite)?),
            None => None,
        };

        Ok(CacheOverview {
            total,
            fresh,
            stale: total - fresh,
            latest_computed_at,
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
        let conn = self.conn.lock().unwrap();
        let now_text = ts_to_text(now);
        let limit = limit as i64;

        let mut sql = String::from(
            "SELECT lane, player_champion, enemy_champion, games, computed_at
             FROM matchup_stats WHERE patch = ?1",
        );
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&patch];

        if let Some(ref lane_val) = lane {
            sql.push_str(" AND lane = ?2");
            params_vec.push(lane_val);
        }
        if fresh_only {
            sql.push_str(&format!(" AND expires_at > ?{}", params_vec.len() + 1));
            params_vec.push(&now_text);
        }
        sql.push_str(&format!(
            " ORDER BY computed_at DESC LIMIT ?{}",
            params_vec.len() + 1
        ));
        params_vec.push(&limit);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_vec.as_slice(), |row| {
            let computed_raw: String = row.get(4)?;
            Ok(PairSummary {
                lane: row.get(0)?,
                player_champion: row.get(1)?,
                enemy_champion: row.get(2)?,
                games: row.get(3)?,
                computed_at: ts_from_text(&computed_raw, 4)?,
            })
        })?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    async fn champions_in_lane(
        &self,
        patch: &str,
        lane: &str,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT player_champion FROM matchup_stats WHERE patch = ?1 AND lane = ?2
             UNION
             SELECT enemy_champion FROM matchup_stats WHERE patch = ?1 AND lane = ?2
             ORDER BY 1",
        )?;

        let rows = stmt.query_map(params![patch, lane], |row| row.get::<_, String>(0))?;

        let mut champions = Vec::new();
        for row in rows {
            champions.push(row?);
        }
        Ok(champions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn record(
        lane: &str,
        player: &str,
        enemy: &str,
        computed_at: DateTime<Utc>,
    ) -> MatchupStatRecord {
        MatchupStatRecord {
            patch: "25.10".to_string(),
            lane: lane.to_string(),
            player_champion: player.to_string(),
            enemy_champion: enemy.to_string(),
            games: 12,
            wins: 7,
            win_rate: 0.583,
            gold_diff_at_15: 240,
            early_kill_rate: 0.417,
            early_death_rate: 0.25,
            keystones: vec![UsageStat {
                id: 8112,
                count: 9,
                rate: 0.75,
            }],
            first_items: vec![UsageStat {
                id: 3070,
                count: 6,
                rate: 0.5,
            }],
            computed_at,
            expires_at: computed_at + ChronoDuration::hours(24),
        }
    }

    #[tokio::test]
    async fn round_trip_preserves_the_record() {
        let store = SqliteStore::open_in_memory(50).unwrap();
        let now = Utc::now();
        let original = record("TOP", "Darius", "Garen", now);

        store.upsert(&original).await.unwrap();
        let loaded = store
            .get("25.10", "TOP", "Darius", "Garen")
            .await
            .unwrap()
            .expect("record should exist");

        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn get_misses_on_unknown_pair() {
        let store = SqliteStore::open_in_memory(50).unwrap();
        let result = store.get("25.10", "TOP", "Darius", "Garen").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_instead_of_duplicating() {
        let store = SqliteStore::open_in_memory(50).unwrap();
        let now = Utc::now();

        let mut rec = record("MIDDLE", "Ahri", "Zed", now);
        store.upsert(&rec).await.unwrap();
        rec.games = 20;
        rec.wins = 11;
        store.upsert(&rec).await.unwrap();

        let overview = store.overview("25.10", None, now).await.unwrap();
        assert_eq!(overview.total, 1);

        let loaded = store
            .get("25.10", "MIDDLE", "Ahri", "Zed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.games, 20);
    }

    #[tokio::test]
    async fn expired_rows_count_as_stale_not_fresh() {
        let store = SqliteStore::open_in_memory(50).unwrap();
        let now = Utc::now();

        // Computed two days ago with a 24h TTL: expired relative to now
        let old = record("TOP", "Garen", "Darius", now - ChronoDuration::days(2));
        let recent = record("TOP", "Darius", "Garen", now);
        store.upsert(&old).await.unwrap();
        store.upsert(&recent).await.unwrap();

        let overview = store.overview("25.10", Some("TOP"), now).await.unwrap();
        assert_eq!(overview.total, 2);
        assert_eq!(overview.fresh, 1);
        assert_eq!(overview.stale, 1);
        assert_eq!(overview.latest_computed_at, Some(recent.computed_at));
    }

    #[tokio::test]
    async fn list_pairs_orders_by_recency_and_honors_fresh_only() {
        let store = SqliteStore::open_in_memory(50).unwrap();
        let now = Utc::now();

        let stale = record("TOP", "Garen", "Darius", now - ChronoDuration::days(2));
        let fresh_old = record("TOP", "Sett", "Mordekaiser", now - ChronoDuration::hours(2));
        let fresh_new = record("TOP", "Darius", "Garen", now);
        store.upsert(&stale).await.unwrap();
        store.upsert(&fresh_old).await.unwrap();
        store.upsert(&fresh_new).await.unwrap();

        let all = store
            .list_pairs("25.10", Some("TOP"), 10, false, now)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].player_champion, "Darius");
        assert_eq!(all[2].player_champion, "Garen");

        let fresh = store
            .list_pairs("25.10", Some("TOP"), 10, true, now)
            .await
            .unwrap();
        assert_eq!(fresh.len(), 2);

        let limited = store
            .list_pairs("25.10", None, 1, false, now)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn champions_cover_both_sides_of_pairings() {
        let store = SqliteStore::open_in_memory(50).unwrap();
        let now = Utc::now();

        store.upsert(&record("TOP", "Darius", "Garen", now)).await.unwrap();
        store.upsert(&record("TOP", "Garen", "Darius", now)).await.unwrap();
        store.upsert(&record("TOP", "Sett", "Darius", now)).await.unwrap();

        let champions = store.champions_in_lane("25.10", "TOP").await.unwrap();
        assert_eq!(champions, vec!["Darius", "Garen", "Sett"]);
    }

    #[tokio::test]
    async fn failed_chunk_rolls_back_only_itself() {
        let store = SqliteStore::open_in_memory(2).unwrap();
        let now = Utc::now();

        let mut batch = vec![
            record("TOP", "Darius", "Garen", now),
            record("TOP", "Garen", "Darius", now),
            record("TOP", "Sett", "Mordekaiser", now),
            record("TOP", "Mordekaiser", "Sett", now),
        ];
        // Third record violates the games > 0 constraint, so the second
        // chunk fails while the first chunk stays committed
        batch[2].games = 0;

        let result = store.upsert_many(&batch).await;
        assert!(result.is_err());

        let overview = store.overview("25.10", None, now).await.unwrap();
        assert_eq!(overview.total, 2);
        assert!(store
            .get("25.10", "TOP", "Darius", "Garen")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get("25.10", "TOP", "Sett", "Mordekaiser")
            .await
            .unwrap()
            .is_none());
    }
}
