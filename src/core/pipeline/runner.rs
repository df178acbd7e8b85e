use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};

use crate::core::evidence::{EvidenceLedger, ToolName};
use crate::core::llm::assessor::{fallback_assessment, Assessment, Assessor};
use crate::core::llm::planner::Planner;
use crate::core::store::{event_types, Db, EventLevel};
use crate::core::tools::ToolRegistry;

use super::plan::{baseline_plan, merge_plan, PlannedStep};

pub const STEP_VALIDATE_TARGET: &str = "validate_target";
pub const STEP_AGENT_PLAN: &str = "agent_plan";
pub const STEP_AGENT_ASSESSMENT: &str = "agent_assessment";

pub const NOT_A_CONTRACT_ERROR: &str = "Address does not contain contract bytecode on Base";

/// How one runner invocation ended, for job finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    /// The scan was already claimed or terminal; nothing ran.
    Skipped,
}

/// A hard pipeline failure. `emitted` records whether `step.failed` already
/// went out, so the failure branch does not double-emit.
struct StepFailure {
    step_key: Option<String>,
    message: String,
    emitted: bool,
}

impl From<anyhow::Error> for StepFailure {
    fn from(err: anyhow::Error) -> Self {
        StepFailure {
            step_key: None,
            message: err.to_string(),
            emitted: false,
        }
    }
}

/// Runs one scan end to end: claim, plan, execute steps, assess, persist.
/// Provider failures degrade into the ledger; only a confirmed non-contract
/// target or an unexpected error terminates the run.
pub struct PipelineRunner {
    db: Db,
    registry: Arc<ToolRegistry>,
    planner: Option<Planner>,
    assessor: Option<Assessor>,
    explorer_enabled: bool,
    holders_enabled: bool,
}

impl PipelineRunner {
    pub fn new(
        db: Db,
        registry: Arc<ToolRegistry>,
        planner: Option<Planner>,
        assessor: Option<Assessor>,
        explorer_enabled: bool,
        holders_enabled: bool,
    ) -> Self {
        Self {
            db,
            registry,
            planner,
            assessor,
            explorer_enabled,
            holders_enabled,
        }
    }

    async fn emit(
        &self,
        scan_id: &str,
        level: EventLevel,
        event_type: &str,
        step_key: Option<&str>,
        message: &str,
        payload: Option<serde_json::Value>,
    ) -> anyhow::Result<()> {
        self.db
            .append_event(scan_id, level, event_type, step_key, message, payload.as_ref())
            .await?;
        Ok(())
    }

    pub async fn run_scan(&self, scan_id: &str) -> anyhow::Result<RunOutcome> {
        let Some(scan) = self.db.get_scan(scan_id).await? else {
            warn!("run requested for unknown scan {}", scan_id);
            return Ok(RunOutcome::Skipped);
        };
        if scan.status.is_terminal() {
            info!("scan {} already terminal, skipping run", scan_id);
            return Ok(RunOutcome::Skipped);
        }
        if !self.db.claim_scan(scan_id).await? {
            info!("scan {} already claimed by another runner", scan_id);
            return Ok(RunOutcome::Skipped);
        }

        let started = Instant::now();
        let mut ledger = EvidenceLedger::default();

        match self
            .run_pipeline(scan_id, &scan.token_address, &mut ledger, &started)
            .await
        {
            Ok(()) => {
                info!(
                    "scan {} complete in {} ms",
                    scan_id,
                    started.elapsed().as_millis()
                );
                Ok(RunOutcome::Completed)
            }
            Err(failure) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                let ledger_json =
                    serde_json::to_value(&ledger).unwrap_or_else(|_| json!({ "items": [] }));

                // Persist the terminal state before announcing it.
                if let Err(e) = self
                    .db
                    .fail_scan(scan_id, duration_ms, &ledger_json, &failure.message)
                    .await
                {
                    warn!("could not persist failure for scan {}: {}", scan_id, e);
                }

                if !failure.emitted {
                    let _ = self
                        .emit(
                            scan_id,
                            EventLevel::Error,
                            event_types::STEP_FAILED,
                            failure.step_key.as_deref(),
                            &failure.message,
                            None,
                        )
                        .await;
                }
                let _ = self
                    .emit(
                        scan_id,
                        EventLevel::Error,
                        event_types::RUN_FAILED,
                        None,
                        &failure.message,
                        None,
                    )
                    .await;

                warn!("scan {} failed: {}", scan_id, failure.message);
                Ok(RunOutcome::Failed(failure.message))
            }
        }
    }

    async fn run_pipeline(
        &self,
        scan_id: &str,
        token_address: &str,
        ledger: &mut EvidenceLedger,
        started: &Instant,
    ) -> Result<(), StepFailure> {
        self.emit(
            scan_id,
            EventLevel::Info,
            event_types::RUN_STARTED,
            None,
            &format!("Scan started for {}", token_address),
            Some(json!({ "tokenAddress": token_address })),
        )
        .await?;

        self.emit(
            scan_id,
            EventLevel::Info,
            event_types::STEP_STARTED,
            Some(STEP_VALIDATE_TARGET),
            "Validating target address",
            None,
        )
        .await?;
        if !crate::core::is_valid_address(token_address) {
            let message = format!("'{}' is not a valid token address", token_address);
            self.emit(
                scan_id,
                EventLevel::Error,
                event_types::STEP_FAILED,
                Some(STEP_VALIDATE_TARGET),
                &message,
                None,
            )
            .await?;
            return Err(StepFailure {
                step_key: Some(STEP_VALIDATE_TARGET.to_string()),
                message,
                emitted: true,
            });
        }
        self.emit(
            scan_id,
            EventLevel::Success,
            event_types::STEP_COMPLETED,
            Some(STEP_VALIDATE_TARGET),
            "Target address is well-formed",
            None,
        )
        .await?;

        let plan = self.plan_steps(scan_id, token_address).await?;

        for step in &plan {
            self.run_step(scan_id, token_address, step, ledger).await?;
        }

        self.finish(scan_id, token_address, ledger, started).await
    }

    async fn plan_steps(
        &self,
        scan_id: &str,
        token_address: &str,
    ) -> Result<Vec<PlannedStep>, StepFailure> {
        self.emit(
            scan_id,
            EventLevel::Info,
            event_types::STEP_STARTED,
            Some(STEP_AGENT_PLAN),
            "Planning investigation",
            None,
        )
        .await?;

        let baseline = baseline_plan(self.explorer_enabled, self.holders_enabled);
        let available = self.registry.available_tools();

        let proposed = match &self.planner {
            Some(planner) => planner.propose_plan(token_address, &available).await,
            None => Err(anyhow::anyhow!("planner is not configured")),
        };

        let (merged, fallback) = match proposed {
            Ok(steps) => (merge_plan(baseline, steps, &available), false),
            Err(e) => {
                self.emit(
                    scan_id,
                    EventLevel::Warning,
                    event_types::LOG_LINE,
                    Some(STEP_AGENT_PLAN),
                    &format!("Planner unavailable, using baseline plan: {}", e),
                    None,
                )
                .await?;
                (baseline, true)
            }
        };

        self.emit(
            scan_id,
            if fallback {
                EventLevel::Warning
            } else {
                EventLevel::Info
            },
            event_types::ARTIFACT_PLAN,
            Some(STEP_AGENT_PLAN),
            "Investigation plan ready",
            Some(json!({
                "fallback": fallback,
                "steps": merged,
            })),
        )
        .await?;
        self.emit(
            scan_id,
            if fallback {
                EventLevel::Warning
            } else {
                EventLevel::Success
            },
            event_types::STEP_COMPLETED,
            Some(STEP_AGENT_PLAN),
            "Planning finished",
            None,
        )
        .await?;

        Ok(merged)
    }

    async fn run_step(
        &self,
        scan_id: &str,
        token_address: &str,
        step: &PlannedStep,
        ledger: &mut EvidenceLedger,
    ) -> Result<(), StepFailure> {
        self.emit(
            scan_id,
            EventLevel::Info,
            event_types::STEP_STARTED,
            Some(&step.step_key),
            &step.title,
            Some(json!({ "tool": step.tool, "reason": step.reason })),
        )
        .await?;

        let item = self
            .registry
            .execute(step.tool, token_address, ledger)
            .await;
        let ok = item.is_ok();
        let has_code = item.data.get("hasCode").and_then(|v| v.as_bool());
        let item_json = serde_json::to_value(&item).unwrap_or_else(|_| json!({}));
        ledger.push(item);

        self.emit(
            scan_id,
            EventLevel::Info,
            event_types::EVIDENCE_ITEM,
            Some(&step.step_key),
            &format!("Evidence collected from {}", step.tool),
            Some(item_json),
        )
        .await?;
        self.emit(
            scan_id,
            if ok {
                EventLevel::Info
            } else {
                EventLevel::Warning
            },
            event_types::LOG_LINE,
            Some(&step.step_key),
            &format!("{} -> {}", step.tool, if ok { "ok" } else { "unavailable" }),
            None,
        )
        .await?;

        // A confirmed empty code result is the one evidence outcome that
        // invalidates the whole run.
        if step.tool == ToolName::RpcGetBytecode && ok && has_code == Some(false) {
            self.emit(
                scan_id,
                EventLevel::Error,
                event_types::STEP_FAILED,
                Some(&step.step_key),
                NOT_A_CONTRACT_ERROR,
                None,
            )
            .await?;
            return Err(StepFailure {
                step_key: Some(step.step_key.clone()),
                message: NOT_A_CONTRACT_ERROR.to_string(),
                emitted: true,
            });
        }

        self.emit(
            scan_id,
            if ok {
                EventLevel::Success
            } else {
                EventLevel::Warning
            },
            event_types::STEP_COMPLETED,
            Some(&step.step_key),
            &format!("{} finished", step.title),
            None,
        )
        .await?;
        Ok(())
    }

    async fn finish(
        &self,
        scan_id: &str,
        token_address: &str,
        ledger: &EvidenceLedger,
        started: &Instant,
    ) -> Result<(), StepFailure> {
        self.emit(
            scan_id,
            EventLevel::Info,
            event_types::STEP_STARTED,
            Some(STEP_AGENT_ASSESSMENT),
            "Generating assessment",
            None,
        )
        .await?;

        let assessed: Option<(Assessment, String)> = match &self.assessor {
            Some(assessor) => match assessor.assess(token_address, ledger).await {
                Ok(result) => Some(result),
                Err(e) => {
                    self.emit(
                        scan_id,
                        EventLevel::Warning,
                        event_types::LOG_LINE,
                        Some(STEP_AGENT_ASSESSMENT),
                        &format!("Assessor unavailable, using deterministic assessment: {}", e),
                        None,
                    )
                    .await?;
                    None
                }
            },
            None => None,
        };

        let (assessment, model_id) = match assessed {
            Some((assessment, model_id)) => (assessment, Some(model_id)),
            None => (fallback_assessment(ledger), None),
        };

        let ledger_json = serde_json::to_value(ledger).map_err(anyhow::Error::from)?;
        let assessment_json = serde_json::to_value(&assessment).map_err(anyhow::Error::from)?;
        let duration_ms = started.elapsed().as_millis() as i64;

        // Persist the terminal state, then announce it.
        self.db
            .complete_scan(
                scan_id,
                duration_ms,
                &ledger_json,
                &assessment_json,
                &assessment.summary,
                model_id.as_deref(),
            )
            .await
            .map_err(StepFailure::from)?;

        self.emit(
            scan_id,
            EventLevel::Success,
            event_types::ASSESSMENT_FINAL,
            Some(STEP_AGENT_ASSESSMENT),
            "Assessment ready",
            Some(assessment_json),
        )
        .await?;
        self.emit(
            scan_id,
            EventLevel::Success,
            event_types::STEP_COMPLETED,
            Some(STEP_AGENT_ASSESSMENT),
            "Assessment finished",
            None,
        )
        .await?;
        self.emit(
            scan_id,
            EventLevel::Success,
            event_types::RUN_COMPLETED,
            None,
            "Scan complete",
            None,
        )
        .await?;
        Ok(())
    }
}
