use anyhow::Result;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{now_rfc3339, Db};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "skipped" => JobStatus::Skipped,
            _ => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub scan_id: String,
    pub status: JobStatus,
    pub attempt: i64,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

impl JobRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status_raw: String = row.get("status")?;
        Ok(JobRecord {
            id: row.get("id")?,
            scan_id: row.get("scan_id")?,
            status: JobStatus::parse(&status_raw),
            attempt: row.get("attempt")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            error: row.get("error")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOutcome {
    pub enqueued: bool,
    pub job_id: String,
    pub status: JobStatus,
}

const JOB_COLUMNS: &str =
    "id, scan_id, status, attempt, created_at, started_at, finished_at, error";

impl Db {
    /// Idempotent enqueue: at most one job per scan may be pending or
    /// running; if such a job exists it is returned instead.
    pub async fn enqueue_job(&self, scan_id: &str) -> Result<EnqueueOutcome> {
        let conn = self.conn().lock().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scan_jobs
             WHERE scan_id = ?1 AND status IN ('pending', 'running')
             ORDER BY created_at ASC LIMIT 1",
            JOB_COLUMNS
        ))?;
        let existing = stmt
            .query_map(params![scan_id], JobRecord::from_row)?
            .next()
            .transpose()?;

        if let Some(job) = existing {
            return Ok(EnqueueOutcome {
                enqueued: false,
                job_id: job.id,
                status: job.status,
            });
        }

        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO scan_jobs (id, scan_id, status, attempt, created_at)
             VALUES (?1, ?2, 'pending', 0, ?3)",
            params![id, scan_id, now_rfc3339()],
        )?;

        Ok(EnqueueOutcome {
            enqueued: true,
            job_id: id,
            status: JobStatus::Pending,
        })
    }

    /// Claim the oldest pending job with a conditional update; loop until a
    /// claim lands or the queue is drained. Exactly one claimer wins a row.
    pub async fn claim_next_job(&self) -> Result<Option<JobRecord>> {
        loop {
            let conn = self.conn().lock().await;

            let candidate: Option<String> = {
                let mut stmt = conn.prepare(
                    "SELECT id FROM scan_jobs WHERE status = 'pending'
                     ORDER BY created_at ASC LIMIT 1",
                )?;
                let mut rows = stmt.query_map([], |row| row.get(0))?;
                rows.next().transpose()?
            };

            let Some(job_id) = candidate else {
                return Ok(None);
            };

            let claimed = conn.execute(
                "UPDATE scan_jobs
                 SET status = 'running', started_at = ?2, attempt = attempt + 1
                 WHERE id = ?1 AND status = 'pending'",
                params![job_id, now_rfc3339()],
            )?;

            if claimed == 1 {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM scan_jobs WHERE id = ?1",
                    JOB_COLUMNS
                ))?;
                let job = stmt
                    .query_map(params![job_id], JobRecord::from_row)?
                    .next()
                    .transpose()?;
                return Ok(job);
            }
            // Another claimer won this row; try the next pending one.
        }
    }

    /// Peek without claiming; the worker uses this to close the race between
    /// draining and a concurrent enqueue.
    pub async fn has_pending_jobs(&self) -> Result<bool> {
        let conn = self.conn().lock().await;
        let pending: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM scan_jobs WHERE status = 'pending')",
            [],
            |row| row.get(0),
        )?;
        Ok(pending)
    }

    pub async fn finalize_job(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn().lock().await;
        conn.execute(
            "UPDATE scan_jobs SET status = ?2, finished_at = ?3, error = ?4 WHERE id = ?1",
            params![job_id, status.as_str(), now_rfc3339(), error],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn().lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scan_jobs WHERE id = ?1",
            JOB_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![job_id], JobRecord::from_row)?;
        Ok(rows.next().transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scan(db: &Db, addr: &str) -> String {
        db.insert_scan("base", addr).await.unwrap().id
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_while_job_is_live() {
        let db = Db::open_in_memory().unwrap();
        let scan_id = scan(&db, "0xaaa0000000000000000000000000000000000aaa").await;

        let first = db.enqueue_job(&scan_id).await.unwrap();
        assert!(first.enqueued);

        let second = db.enqueue_job(&scan_id).await.unwrap();
        assert!(!second.enqueued);
        assert_eq!(second.job_id, first.job_id);

        // still idempotent while running
        db.claim_next_job().await.unwrap().unwrap();
        let third = db.enqueue_job(&scan_id).await.unwrap();
        assert!(!third.enqueued);
        assert_eq!(third.job_id, first.job_id);
    }

    #[tokio::test]
    async fn enqueue_after_terminal_job_creates_a_new_one() {
        let db = Db::open_in_memory().unwrap();
        let scan_id = scan(&db, "0xaaa0000000000000000000000000000000000aaa").await;

        let first = db.enqueue_job(&scan_id).await.unwrap();
        let job = db.claim_next_job().await.unwrap().unwrap();
        db.finalize_job(&job.id, JobStatus::Completed, None).await.unwrap();

        let second = db.enqueue_job(&scan_id).await.unwrap();
        assert!(second.enqueued);
        assert_ne!(second.job_id, first.job_id);
    }

    #[tokio::test]
    async fn claim_takes_oldest_pending_and_increments_attempt() {
        let db = Db::open_in_memory().unwrap();
        let a = scan(&db, "0xaaa0000000000000000000000000000000000aaa").await;
        let b = scan(&db, "0xbbb0000000000000000000000000000000000bbb").await;
        let first = db.enqueue_job(&a).await.unwrap();
        db.enqueue_job(&b).await.unwrap();

        let claimed = db.claim_next_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, first.job_id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempt, 1);
        assert!(claimed.started_at.is_some());
    }

    #[tokio::test]
    async fn claim_returns_none_on_empty_queue() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.claim_next_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn each_job_is_claimed_at_most_once() {
        let db = Db::open_in_memory().unwrap();
        for i in 0..4 {
            let scan_id = scan(&db, &format!("0x{:040x}", i)).await;
            db.enqueue_job(&scan_id).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = db.claim_next_job().await.unwrap() {
                    claimed.push(job.id);
                }
                claimed
            }));
        }

        let mut all: Vec<String> = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(before, all.len(), "a job was claimed twice");
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn finalize_records_error_and_finish_time() {
        let db = Db::open_in_memory().unwrap();
        let scan_id = scan(&db, "0xaaa0000000000000000000000000000000000aaa").await;
        db.enqueue_job(&scan_id).await.unwrap();
        let job = db.claim_next_job().await.unwrap().unwrap();

        db.finalize_job(&job.id, JobStatus::Failed, Some("boom")).await.unwrap();
        let row = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("boom"));
        assert!(row.finished_at.is_some());
    }
}
