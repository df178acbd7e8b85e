use anyhow::{anyhow, Result};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{now_rfc3339, Db};

/// Event type strings shared by the runner and the stream fan-out.
pub mod event_types {
    pub const READY: &str = "ready";
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const LOG_LINE: &str = "log.line";
    pub const EVIDENCE_ITEM: &str = "evidence.item";
    pub const ARTIFACT_PLAN: &str = "artifact.plan";
    pub const ASSESSMENT_FINAL: &str = "assessment.final";
    pub const END: &str = "end";

    pub fn is_terminal(event_type: &str) -> bool {
        event_type == RUN_COMPLETED || event_type == RUN_FAILED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl EventLevel {
    fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Success => "success",
            EventLevel::Warning => "warning",
            EventLevel::Error => "error",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "success" => EventLevel::Success,
            "warning" => EventLevel::Warning,
            "error" => EventLevel::Error,
            _ => EventLevel::Info,
        }
    }
}

/// One immutable row of a scan's timeline. `seq` is unique per scan and
/// contiguous from 1; `id` is the global cursor the stream resumes on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    pub id: i64,
    pub scan_id: String,
    pub seq: i64,
    pub ts: String,
    pub level: EventLevel,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ScanEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let level_raw: String = row.get("level")?;
        let payload: Option<String> = row.get("payload")?;
        Ok(ScanEvent {
            id: row.get("id")?,
            scan_id: row.get("scan_id")?,
            seq: row.get("seq")?,
            ts: row.get("ts")?,
            level: EventLevel::parse(&level_raw),
            event_type: row.get("event_type")?,
            step_key: row.get("step_key")?,
            message: row.get("message")?,
            payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
        })
    }
}

/// Bounded retries when a concurrent appender for the same scan wins the
/// `(scan_id, seq)` slot first.
const APPEND_RETRIES: usize = 5;

const EVENT_COLUMNS: &str = "id, scan_id, seq, ts, level, event_type, step_key, message, payload";

impl Db {
    /// Append with `seq = max(seq)+1`. The connection mutex serializes
    /// in-process appenders; the unique-violation retry covers other
    /// processes writing the same scan.
    pub async fn append_event(
        &self,
        scan_id: &str,
        level: EventLevel,
        event_type: &str,
        step_key: Option<&str>,
        message: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<ScanEvent> {
        let payload_text = payload.map(serde_json::to_string).transpose()?;

        for _ in 0..APPEND_RETRIES {
            let conn = self.conn().lock().await;
            let next_seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM scan_events WHERE scan_id = ?1",
                params![scan_id],
                |row| row.get(0),
            )?;

            let ts = now_rfc3339();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO scan_events
                     (scan_id, seq, ts, level, event_type, step_key, message, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    scan_id,
                    next_seq,
                    ts,
                    level.as_str(),
                    event_type,
                    step_key,
                    message,
                    payload_text,
                ],
            )?;

            if inserted == 1 {
                let id = conn.last_insert_rowid();
                return Ok(ScanEvent {
                    id,
                    scan_id: scan_id.to_string(),
                    seq: next_seq,
                    ts,
                    level,
                    event_type: event_type.to_string(),
                    step_key: step_key.map(String::from),
                    message: message.to_string(),
                    payload: payload.cloned(),
                });
            }
            // Lost the seq slot to a concurrent writer; recompute and retry.
        }

        Err(anyhow!(
            "could not allocate event seq for scan {} after {} attempts",
            scan_id,
            APPEND_RETRIES
        ))
    }

    pub async fn list_events(&self, scan_id: &str) -> Result<Vec<ScanEvent>> {
        let conn = self.conn().lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scan_events WHERE scan_id = ?1 ORDER BY id ASC",
            EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![scan_id], ScanEvent::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Events with global id strictly greater than `after_id`, in order.
    pub async fn list_events_after(&self, scan_id: &str, after_id: i64) -> Result<Vec<ScanEvent>> {
        let conn = self.conn().lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scan_events WHERE scan_id = ?1 AND id > ?2 ORDER BY id ASC",
            EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![scan_id, after_id], ScanEvent::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub async fn latest_event(&self, scan_id: &str) -> Result<Option<ScanEvent>> {
        let conn = self.conn().lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scan_events WHERE scan_id = ?1 ORDER BY id DESC LIMIT 1",
            EVENT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![scan_id], ScanEvent::from_row)?;
        Ok(rows.next().transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scan(db: &Db) -> String {
        db.insert_scan("base", "0xabc0000000000000000000000000000000000abc")
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn seq_is_contiguous_from_one() {
        let db = Db::open_in_memory().unwrap();
        let scan_id = scan(&db).await;

        for i in 0..5 {
            db.append_event(
                &scan_id,
                EventLevel::Info,
                event_types::LOG_LINE,
                None,
                &format!("line {}", i),
                None,
            )
            .await
            .unwrap();
        }

        let events = db.list_events(&scan_id).await.unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn seq_is_per_scan_not_global() {
        let db = Db::open_in_memory().unwrap();
        let a = scan(&db).await;
        let b = db
            .insert_scan("base", "0xdef0000000000000000000000000000000000def")
            .await
            .unwrap()
            .id;

        db.append_event(&a, EventLevel::Info, "run.started", None, "a1", None)
            .await
            .unwrap();
        db.append_event(&b, EventLevel::Info, "run.started", None, "b1", None)
            .await
            .unwrap();
        db.append_event(&a, EventLevel::Info, "log.line", None, "a2", None)
            .await
            .unwrap();

        assert_eq!(db.latest_event(&a).await.unwrap().unwrap().seq, 2);
        assert_eq!(db.latest_event(&b).await.unwrap().unwrap().seq, 1);
    }

    #[tokio::test]
    async fn timestamps_are_monotone_in_seq_order() {
        let db = Db::open_in_memory().unwrap();
        let scan_id = scan(&db).await;
        for _ in 0..4 {
            db.append_event(&scan_id, EventLevel::Info, "log.line", None, "x", None)
                .await
                .unwrap();
        }
        let events = db.list_events(&scan_id).await.unwrap();
        for pair in events.windows(2) {
            assert!(pair[0].ts <= pair[1].ts);
            assert!(pair[0].seq < pair[1].seq);
        }
    }

    #[tokio::test]
    async fn list_after_returns_strictly_greater_ids() {
        let db = Db::open_in_memory().unwrap();
        let scan_id = scan(&db).await;
        let mut ids = Vec::new();
        for i in 0..4 {
            let e = db
                .append_event(&scan_id, EventLevel::Info, "log.line", None, &format!("{}", i), None)
                .await
                .unwrap();
            ids.push(e.id);
        }

        let tail = db.list_events_after(&scan_id, ids[1]).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail.iter().all(|e| e.id > ids[1]));
        assert_eq!(tail[0].id, ids[2]);
    }

    #[tokio::test]
    async fn concurrent_appends_keep_contiguity() {
        let db = Db::open_in_memory().unwrap();
        let scan_id = scan(&db).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let db = db.clone();
            let scan_id = scan_id.clone();
            handles.push(tokio::spawn(async move {
                db.append_event(
                    &scan_id,
                    EventLevel::Info,
                    "log.line",
                    None,
                    &format!("writer {}", i),
                    None,
                )
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut seqs: Vec<i64> = db
            .list_events(&scan_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.seq)
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=10).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn payload_round_trips_as_json() {
        let db = Db::open_in_memory().unwrap();
        let scan_id = scan(&db).await;
        let payload = serde_json::json!({"tool": "rpc_getBytecode", "ok": true});
        db.append_event(
            &scan_id,
            EventLevel::Success,
            event_types::EVIDENCE_ITEM,
            Some("rpc_bytecode"),
            "evidence",
            Some(&payload),
        )
        .await
        .unwrap();

        let events = db.list_events(&scan_id).await.unwrap();
        assert_eq!(events[0].payload.as_ref().unwrap()["tool"], "rpc_getBytecode");
        assert_eq!(events[0].step_key.as_deref(), Some("rpc_bytecode"));
        assert_eq!(events[0].level, EventLevel::Success);
    }

    #[test]
    fn terminal_event_types_are_run_completed_and_failed() {
        assert!(event_types::is_terminal(event_types::RUN_COMPLETED));
        assert!(event_types::is_terminal(event_types::RUN_FAILED));
        assert!(!event_types::is_terminal(event_types::STEP_FAILED));
    }
}
