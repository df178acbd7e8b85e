mod events;
mod jobs;
mod scans;

use std::sync::Arc;

use anyhow::Result;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

pub use events::{event_types, EventLevel, ScanEvent};
pub use jobs::{EnqueueOutcome, JobRecord, JobStatus};
pub use scans::{ScanRecord, ScanStatus};

/// SQLite-backed store for scans, their event logs and the job queue.
/// One connection per process behind an async mutex; per-scan event append
/// serializes through the mutex and retries on unique violations so it also
/// stays safe with multi-process workers.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS scans (
                id TEXT PRIMARY KEY,
                chain TEXT NOT NULL,
                token_address TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                duration_ms INTEGER,
                scanner_version TEXT NOT NULL,
                score_version TEXT NOT NULL,
                evidence TEXT,
                assessment TEXT,
                narrative TEXT,
                model_id TEXT,
                error TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scans_chain_token
             ON scans (chain, token_address)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS scan_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scan_id TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                ts TEXT NOT NULL,
                level TEXT NOT NULL,
                event_type TEXT NOT NULL,
                step_key TEXT,
                message TEXT NOT NULL,
                payload TEXT,
                UNIQUE (scan_id, seq)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scan_events_scan_id
             ON scan_events (scan_id, id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS scan_jobs (
                id TEXT PRIMARY KEY,
                scan_id TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                error TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scan_jobs_status_created
             ON scan_jobs (status, created_at)",
            [],
        )?;

        info!("Scan store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
