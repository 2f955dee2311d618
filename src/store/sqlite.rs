//! SQLite-backed store and history
//! One connection per call; the file path is the only shared state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection};
use tracing::{debug, info};

use super::{HistoryStore, StoreConfigStore};
use crate::error::{LotteryError, LotteryResult};
use crate::models::{DrawRecord, PrizeInventory, StoreState};

pub struct SqliteLotteryStore {
    db_path: String,
}

impl SqliteLotteryStore {
    /// Open (creating if needed) the database and its schema.
    pub fn new(db_path: &str) -> LotteryResult<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        info!("🗄️  Lottery store ready at {}", db_path);
        Ok(store)
    }

    fn connect(&self) -> LotteryResult<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn init_db(&self) -> LotteryResult<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS stores (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                dashboard_title TEXT NOT NULL DEFAULT '',
                min_spend REAL NOT NULL,
                prizes_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS draw_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL,
                store_id INTEGER NOT NULL,
                store_name TEXT NOT NULL,
                prize_name TEXT NOT NULL,
                spent REAL NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_draw_history_code ON draw_history(code)",
            [],
        )?;

        Ok(())
    }

    fn read_store(&self, id: i64) -> LotteryResult<StoreState> {
        let conn = self.connect()?;
        let row = conn.query_row(
            "SELECT id, name, dashboard_title, min_spend, prizes_json FROM stores WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        );

        let (id, name, dashboard_title, min_spend, prizes_json) = match row {
            Ok(r) => r,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(LotteryError::StoreNotFound(id))
            }
            Err(e) => return Err(e.into()),
        };

        let inventory: PrizeInventory = serde_json::from_str(&prizes_json)?;
        Ok(StoreState {
            id,
            name,
            dashboard_title,
            min_spend,
            inventory,
        })
    }

    fn write_store(&self, state: &StoreState) -> LotteryResult<()> {
        let conn = self.connect()?;
        let prizes_json = serde_json::to_string(&state.inventory)?;

        conn.execute(
            "INSERT INTO stores (id, name, dashboard_title, min_spend, prizes_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                dashboard_title = excluded.dashboard_title,
                min_spend = excluded.min_spend,
                prizes_json = excluded.prizes_json,
                updated_at = excluded.updated_at",
            params![
                state.id,
                state.name,
                state.dashboard_title,
                state.min_spend,
                prizes_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!(store_id = state.id, remaining = state.inventory.total(), "store written");
        Ok(())
    }

    fn read_history(&self, code: &str) -> LotteryResult<Vec<DrawRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT code, store_id, store_name, prize_name, spent, created_at
             FROM draw_history WHERE code = ?1 ORDER BY id ASC",
        )?;

        let records = stmt
            .query_map(params![code], |row| {
                let created_raw: String = row.get(5)?;
                let created_at = DateTime::parse_from_rfc3339(&created_raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?;
                Ok(DrawRecord {
                    code: row.get(0)?,
                    store_id: row.get(1)?,
                    store_name: row.get(2)?,
                    prize_name: row.get(3)?,
                    spent: row.get(4)?,
                    created_at,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn append_history(&self, record: &DrawRecord) -> LotteryResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO draw_history (code, store_id, store_name, prize_name, spent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.code,
                record.store_id,
                record.store_name,
                record.prize_name,
                record.spent,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl StoreConfigStore for SqliteLotteryStore {
    async fn get_store(&self, id: i64) -> LotteryResult<StoreState> {
        self.read_store(id)
    }

    async fn update_store(&self, state: &StoreState) -> LotteryResult<()> {
        self.write_store(state)
    }
}

#[async_trait]
impl HistoryStore for SqliteLotteryStore {
    async fn get_history(&self, code: &str) -> LotteryResult<Vec<DrawRecord>> {
        self.read_history(code)
    }

    async fn post_history(&self, record: &DrawRecord) -> LotteryResult<()> {
        self.append_history(record)
    }
}
