use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::core::pipeline::runner::{PipelineRunner, RunOutcome};
use crate::core::store::{Db, JobStatus};

/// Process-local worker. HTTP handlers enqueue a job and call `trigger()`
/// without awaiting; the drain loop claims jobs until the queue is empty and
/// then parks. At most one drain loop runs per process.
#[derive(Clone)]
pub struct ScanWorker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    db: Db,
    runner: Arc<PipelineRunner>,
    running: AtomicBool,
}

impl ScanWorker {
    pub fn new(db: Db, runner: Arc<PipelineRunner>) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                db,
                runner,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Launch the drain loop if it is not already running. Cheap to call on
    /// every enqueue.
    pub fn trigger(&self) {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inner = self.inner.clone();
        let worker = self.clone();
        tokio::spawn(async move {
            inner.drain().await;
            inner.running.store(false, Ordering::Release);

            // An enqueue that raced the shutdown of this loop would otherwise
            // sit unclaimed until the next trigger.
            if inner.db.has_pending_jobs().await.unwrap_or(false) {
                worker.trigger();
            }
        });
    }

    #[cfg(test)]
    pub async fn drain_for_test(&self) {
        self.inner.drain().await;
    }
}

impl WorkerInner {
    async fn drain(&self) {
        loop {
            let job = match self.db.claim_next_job().await {
                Ok(Some(job)) => job,
                Ok(None) => return,
                Err(e) => {
                    error!("worker could not claim a job: {}", e);
                    return;
                }
            };

            info!("worker claimed job {} for scan {}", job.id, job.scan_id);
            let (status, error) = match self.runner.run_scan(&job.scan_id).await {
                Ok(RunOutcome::Completed) => (JobStatus::Completed, None),
                Ok(RunOutcome::Failed(message)) => (JobStatus::Failed, Some(message)),
                Ok(RunOutcome::Skipped) => (JobStatus::Skipped, None),
                Err(e) => (JobStatus::Failed, Some(e.to_string())),
            };

            if let Err(e) = self
                .db
                .finalize_job(&job.id, status, error.as_deref())
                .await
            {
                error!("worker could not finalize job {}: {}", job.id, e);
            }
        }
    }
}
