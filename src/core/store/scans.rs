use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{now_rfc3339, Db};

pub const SCANNER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SCORE_VERSION: &str = "2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Running,
    Complete,
    Failed,
    Canceled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Queued => "queued",
            ScanStatus::Running => "running",
            ScanStatus::Complete => "complete",
            ScanStatus::Failed => "failed",
            ScanStatus::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(ScanStatus::Queued),
            "running" => Some(ScanStatus::Running),
            "complete" => Some(ScanStatus::Complete),
            "failed" => Some(ScanStatus::Failed),
            "canceled" => Some(ScanStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Complete | ScanStatus::Failed | ScanStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: String,
    pub chain: String,
    pub token_address: String,
    pub status: ScanStatus,
    pub created_at: String,
    pub duration_ms: Option<i64>,
    pub scanner_version: String,
    pub score_version: String,
    pub evidence: Option<serde_json::Value>,
    pub assessment: Option<serde_json::Value>,
    pub narrative: Option<String>,
    pub model_id: Option<String>,
    pub error: Option<String>,
}

impl ScanRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status_raw: String = row.get("status")?;
        let evidence: Option<String> = row.get("evidence")?;
        let assessment: Option<String> = row.get("assessment")?;
        Ok(ScanRecord {
            id: row.get("id")?,
            chain: row.get("chain")?,
            token_address: row.get("token_address")?,
            status: ScanStatus::parse(&status_raw).unwrap_or(ScanStatus::Failed),
            created_at: row.get("created_at")?,
            duration_ms: row.get("duration_ms")?,
            scanner_version: row.get("scanner_version")?,
            score_version: row.get("score_version")?,
            evidence: evidence.and_then(|e| serde_json::from_str(&e).ok()),
            assessment: assessment.and_then(|a| serde_json::from_str(&a).ok()),
            narrative: row.get("narrative")?,
            model_id: row.get("model_id")?,
            error: row.get("error")?,
        })
    }

    /// Age in seconds relative to now; used by the create-scan cache path.
    pub fn age_seconds(&self) -> i64 {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_seconds())
            .unwrap_or(i64::MAX)
    }
}

const SCAN_COLUMNS: &str = "id, chain, token_address, status, created_at, duration_ms, \
                            scanner_version, score_version, evidence, assessment, narrative, \
                            model_id, error";

impl Db {
    /// Insert a fresh `queued` scan for the token.
    pub async fn insert_scan(&self, chain: &str, token_address: &str) -> Result<ScanRecord> {
        let record = ScanRecord {
            id: Uuid::new_v4().to_string(),
            chain: chain.to_string(),
            token_address: token_address.to_lowercase(),
            status: ScanStatus::Queued,
            created_at: now_rfc3339(),
            duration_ms: None,
            scanner_version: SCANNER_VERSION.to_string(),
            score_version: SCORE_VERSION.to_string(),
            evidence: None,
            assessment: None,
            narrative: None,
            model_id: None,
            error: None,
        };

        let conn = self.conn().lock().await;
        conn.execute(
            "INSERT INTO scans (id, chain, token_address, status, created_at,
                                scanner_version, score_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.chain,
                record.token_address,
                record.status.as_str(),
                record.created_at,
                record.scanner_version,
                record.score_version,
            ],
        )?;
        Ok(record)
    }

    pub async fn get_scan(&self, scan_id: &str) -> Result<Option<ScanRecord>> {
        let conn = self.conn().lock().await;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM scans WHERE id = ?1", SCAN_COLUMNS))?;
        let mut rows = stmt.query_map(params![scan_id], ScanRecord::from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// Most recent `complete` scan for the pair, for the cache-lookup path.
    pub async fn latest_complete_scan(
        &self,
        chain: &str,
        token_address: &str,
    ) -> Result<Option<ScanRecord>> {
        let conn = self.conn().lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scans
             WHERE chain = ?1 AND token_address = ?2 AND status = 'complete'
             ORDER BY created_at DESC LIMIT 1",
            SCAN_COLUMNS
        ))?;
        let mut rows = stmt.query_map(
            params![chain, token_address.to_lowercase()],
            ScanRecord::from_row,
        )?;
        Ok(rows.next().transpose()?)
    }

    /// Compare-and-swap `queued -> running`. Exactly one caller wins.
    pub async fn claim_scan(&self, scan_id: &str) -> Result<bool> {
        let conn = self.conn().lock().await;
        let changed = conn.execute(
            "UPDATE scans SET status = 'running' WHERE id = ?1 AND status = 'queued'",
            params![scan_id],
        )?;
        Ok(changed == 1)
    }

    /// Terminal transition `running -> complete` with the final artifacts.
    pub async fn complete_scan(
        &self,
        scan_id: &str,
        duration_ms: i64,
        evidence: &serde_json::Value,
        assessment: &serde_json::Value,
        narrative: &str,
        model_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn().lock().await;
        conn.execute(
            "UPDATE scans
             SET status = 'complete', duration_ms = ?2, evidence = ?3, assessment = ?4,
                 narrative = ?5, model_id = ?6
             WHERE id = ?1 AND status = 'running'",
            params![
                scan_id,
                duration_ms,
                serde_json::to_string(evidence)?,
                serde_json::to_string(assessment)?,
                narrative,
                model_id,
            ],
        )?;
        Ok(())
    }

    /// Terminal transition to `failed`, keeping the partial ledger for
    /// postmortem.
    pub async fn fail_scan(
        &self,
        scan_id: &str,
        duration_ms: i64,
        evidence: &serde_json::Value,
        error: &str,
    ) -> Result<()> {
        let conn = self.conn().lock().await;
        conn.execute(
            "UPDATE scans
             SET status = 'failed', duration_ms = ?2, evidence = ?3, error = ?4
             WHERE id = ?1 AND status IN ('queued', 'running')",
            params![scan_id, duration_ms, serde_json::to_string(evidence)?, error],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_lowercases_the_token_address() {
        let db = Db::open_in_memory().unwrap();
        let scan = db
            .insert_scan("base", "0xF43EB8DE897FBC7F2502483B2BEF7BB9EA179229")
            .await
            .unwrap();
        assert_eq!(scan.token_address, "0xf43eb8de897fbc7f2502483b2bef7bb9ea179229");
        assert_eq!(scan.status, ScanStatus::Queued);
    }

    #[tokio::test]
    async fn claim_wins_exactly_once() {
        let db = Db::open_in_memory().unwrap();
        let scan = db.insert_scan("base", "0xabc0000000000000000000000000000000000abc").await.unwrap();
        assert!(db.claim_scan(&scan.id).await.unwrap());
        assert!(!db.claim_scan(&scan.id).await.unwrap());
        let row = db.get_scan(&scan.id).await.unwrap().unwrap();
        assert_eq!(row.status, ScanStatus::Running);
    }

    #[tokio::test]
    async fn complete_persists_artifacts() {
        let db = Db::open_in_memory().unwrap();
        let scan = db.insert_scan("base", "0xabc0000000000000000000000000000000000abc").await.unwrap();
        db.claim_scan(&scan.id).await.unwrap();
        db.complete_scan(
            &scan.id,
            1234,
            &serde_json::json!({"items": []}),
            &serde_json::json!({"overallScore": 22}),
            "looks fine",
            Some("llama-3.3-70b"),
        )
        .await
        .unwrap();

        let row = db.get_scan(&scan.id).await.unwrap().unwrap();
        assert_eq!(row.status, ScanStatus::Complete);
        assert_eq!(row.duration_ms, Some(1234));
        assert_eq!(row.narrative.as_deref(), Some("looks fine"));
        assert_eq!(row.assessment.unwrap()["overallScore"], 22);
    }

    #[tokio::test]
    async fn latest_complete_scan_ignores_failed_rows() {
        let db = Db::open_in_memory().unwrap();
        let addr = "0xabc0000000000000000000000000000000000abc";
        let failed = db.insert_scan("base", addr).await.unwrap();
        db.fail_scan(&failed.id, 5, &serde_json::json!({"items": []}), "boom")
            .await
            .unwrap();
        assert!(db.latest_complete_scan("base", addr).await.unwrap().is_none());

        let done = db.insert_scan("base", addr).await.unwrap();
        db.claim_scan(&done.id).await.unwrap();
        db.complete_scan(&done.id, 5, &serde_json::json!({}), &serde_json::json!({}), "n", None)
            .await
            .unwrap();
        let found = db.latest_complete_scan("base", addr).await.unwrap().unwrap();
        assert_eq!(found.id, done.id);
    }

    #[tokio::test]
    async fn fresh_scan_age_is_small() {
        let db = Db::open_in_memory().unwrap();
        let scan = db.insert_scan("base", "0xabc0000000000000000000000000000000000abc").await.unwrap();
        assert!(scan.age_seconds() < 5);
    }
}
