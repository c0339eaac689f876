use crate::common::error::{HarvestError, Result};
use crate::common::types::{RawRecord, RunStatus};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// External run/event audit store. The core treats `append_rows` as
/// fire-and-forget (callers log and continue on failure) but a failed
/// `finish_run` must propagate: it means the run's terminal status is
/// unknown.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn start_run(&self, source: &str, label: &str) -> Result<i64>;
    async fn finish_run(&self, run_id: i64, status: RunStatus, meta: Option<RawRecord>)
        -> Result<()>;
    async fn append_rows(&self, run_id: i64, source: &str, rows: &[RawRecord]) -> Result<()>;
}

/// SQLite-backed recorder with the two append-only tables the operator
/// console reads: `runs` and `events` (one event row per harvested entity or
/// run summary). Only `runs.status`/`finished_at` are ever updated.
pub struct SqliteRunRecorder {
    conn: Mutex<Connection>,
}

impl SqliteRunRecorder {
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Result<Self> {
        let db_path = data_root.as_ref().join("runs").join("harvest.db");
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS runs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                source      TEXT NOT NULL,
                label       TEXT NOT NULL DEFAULT '',
                started_at  TEXT NOT NULL,
                finished_at TEXT,
                status      TEXT NOT NULL DEFAULT 'running',
                meta        TEXT
            );
            CREATE TABLE IF NOT EXISTS events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id      INTEGER REFERENCES runs(id) ON DELETE SET NULL,
                source      TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                payload     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_source_created ON events(source, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_events_run_id ON events(run_id);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Status and meta of a run, for the console and for tests.
    pub fn run_status(&self, run_id: i64) -> Result<Option<(String, Option<String>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, meta FROM runs WHERE id = ?1")?;
        let mut rows = stmt.query(params![run_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some((row.get(0)?, row.get(1)?)))
        } else {
            Ok(None)
        }
    }

    pub fn event_count(&self, run_id: i64) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[async_trait]
impl RunRecorder for SqliteRunRecorder {
    async fn start_run(&self, source: &str, label: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs (source, label, started_at, status) VALUES (?1, ?2, ?3, 'running')",
            params![source, label, Utc::now().to_rfc3339()],
        )?;
        let run_id = conn.last_insert_rowid();
        debug!(source, run_id, "Started run");
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        meta: Option<RawRecord>,
    ) -> Result<()> {
        if status == RunStatus::Running {
            return Err(HarvestError::Api {
                message: "finish_run requires a terminal status".into(),
            });
        }
        let meta_json = meta.map(|m| m.to_string());
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, meta = ?3 WHERE id = ?4",
            params![status.as_str(), Utc::now().to_rfc3339(), meta_json, run_id],
        )?;
        if updated == 0 {
            return Err(HarvestError::Api {
                message: format!("finish_run: no run with id {run_id}"),
            });
        }
        debug!(run_id, status = status.as_str(), "Finished run");
        Ok(())
    }

    async fn append_rows(&self, run_id: i64, source: &str, rows: &[RawRecord]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events (run_id, source, created_at, payload) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let now = Utc::now().to_rfc3339();
            for row in rows {
                stmt.execute(params![run_id, source, now, row.to_string()])?;
            }
        }
        tx.commit()?;
        debug!(run_id, source, rows = rows.len(), "Appended result rows");
        Ok(())
    }
}
