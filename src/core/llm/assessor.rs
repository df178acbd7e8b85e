use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::evidence::EvidenceLedger;

use super::{is_no_output_error, ChatMessage, ChatModel};

/// Truncation bounds for the compact payload variant.
const COMPACT_MAX_STRING: usize = 200;
const COMPACT_MAX_DEPTH: usize = 2;
const COMPACT_MAX_ARRAY_CHILDREN: usize = 8;
const COMPACT_MAX_OBJECT_CHILDREN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Five fixed category axes, each 0-100.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScores {
    pub contract_security: u8,
    pub liquidity: u8,
    pub holder_distribution: u8,
    pub market_activity: u8,
    pub honeypot_exposure: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reason {
    pub title: String,
    pub detail: String,
    pub evidence_refs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub summary: String,
    pub overall_score: u8,
    pub risk_level: RiskLevel,
    pub confidence: Confidence,
    pub category_scores: CategoryScores,
    pub reasons: Vec<Reason>,
    pub missing_data: Vec<String>,
}

/// Why an otherwise-parseable assessment was rejected.
#[derive(Debug, PartialEq, Eq)]
pub enum ValidationError {
    NoReasons,
    BlankReasonText,
    UnresolvedRef(String),
    ScoreOutOfRange,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NoReasons => write!(f, "assessment has no reasons"),
            ValidationError::BlankReasonText => write!(f, "reason title or detail is blank"),
            ValidationError::UnresolvedRef(id) => {
                write!(f, "evidence ref '{}' does not resolve", id)
            }
            ValidationError::ScoreOutOfRange => write!(f, "a score is outside 0-100"),
        }
    }
}

/// Hydrate empty citation lists with the full ledger, then check referential
/// integrity. Reasons citing nothing real do not survive.
pub fn validate_assessment(
    assessment: &mut Assessment,
    ledger_ids: &[String],
) -> Result<(), ValidationError> {
    if assessment.reasons.is_empty() {
        return Err(ValidationError::NoReasons);
    }
    if assessment.summary.trim().is_empty() {
        return Err(ValidationError::BlankReasonText);
    }
    if assessment.overall_score > 100 {
        return Err(ValidationError::ScoreOutOfRange);
    }
    let scores = &assessment.category_scores;
    if [
        scores.contract_security,
        scores.liquidity,
        scores.holder_distribution,
        scores.market_activity,
        scores.honeypot_exposure,
    ]
    .iter()
    .any(|s| *s > 100)
    {
        return Err(ValidationError::ScoreOutOfRange);
    }

    for reason in &mut assessment.reasons {
        if reason.title.trim().is_empty() || reason.detail.trim().is_empty() {
            return Err(ValidationError::BlankReasonText);
        }
        if reason.evidence_refs.is_empty() {
            reason.evidence_refs = ledger_ids.to_vec();
        }
        for evidence_ref in &reason.evidence_refs {
            if !ledger_ids.contains(evidence_ref) {
                return Err(ValidationError::UnresolvedRef(evidence_ref.clone()));
            }
        }
    }
    Ok(())
}

/// Bound a JSON value for the compact payload: strings truncated, containers
/// depth-limited with child caps.
pub fn compact_value(value: &serde_json::Value, depth: usize) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            if s.chars().count() > COMPACT_MAX_STRING {
                let truncated: String = s.chars().take(COMPACT_MAX_STRING).collect();
                serde_json::Value::String(format!("{}…", truncated))
            } else {
                value.clone()
            }
        }
        serde_json::Value::Array(items) => {
            if depth == 0 {
                return serde_json::Value::String(format!("[{} items]", items.len()));
            }
            serde_json::Value::Array(
                items
                    .iter()
                    .take(COMPACT_MAX_ARRAY_CHILDREN)
                    .map(|v| compact_value(v, depth - 1))
                    .collect(),
            )
        }
        serde_json::Value::Object(map) => {
            if depth == 0 {
                return serde_json::Value::String(format!("{{{} fields}}", map.len()));
            }
            serde_json::Value::Object(
                map.iter()
                    .take(COMPACT_MAX_OBJECT_CHILDREN)
                    .map(|(k, v)| (k.clone(), compact_value(v, depth - 1)))
                    .collect(),
            )
        }
        _ => value.clone(),
    }
}

const ASSESSOR_SYSTEM_PROMPT: &str = "You are a token risk assessor. You are given the full \
evidence ledger collected for one token on Base. Respond with a JSON object: \
{\"summary\": string, \"overallScore\": 0-100, \"riskLevel\": \"low\"|\"medium\"|\"high\"|\"critical\", \
\"confidence\": \"low\"|\"medium\"|\"high\", \"categoryScores\": {\"contractSecurity\": 0-100, \
\"liquidity\": 0-100, \"holderDistribution\": 0-100, \"marketActivity\": 0-100, \
\"honeypotExposure\": 0-100}, \"reasons\": [{\"title\": string, \"detail\": string, \
\"evidenceRefs\": [string]}], \"missingData\": [string]}. \
Higher scores mean higher risk. Every reason must cite the ids of the evidence items it \
relies on. Only state what the evidence supports; list anything you could not verify in \
missingData instead of guessing.";

enum PayloadVariant {
    Full,
    Compact,
}

/// Calls the model across `(model, payload)` variants and validates citations.
pub struct Assessor {
    model: Arc<dyn ChatModel>,
    primary_model: String,
    fallback_model: String,
}

impl Assessor {
    pub fn new(model: Arc<dyn ChatModel>, primary_model: String, fallback_model: String) -> Self {
        Self {
            model,
            primary_model,
            fallback_model,
        }
    }

    /// Returns the validated assessment and the model id that produced it.
    pub async fn assess(
        &self,
        token_address: &str,
        ledger: &EvidenceLedger,
    ) -> Result<(Assessment, String)> {
        let ledger_ids = ledger.ids();
        let ledger_json = serde_json::to_value(ledger)?;

        let attempts = [
            (&self.primary_model, PayloadVariant::Full),
            (&self.primary_model, PayloadVariant::Compact),
            (&self.fallback_model, PayloadVariant::Full),
            (&self.fallback_model, PayloadVariant::Compact),
        ];

        let mut last_error = anyhow!("no assessment attempts ran");
        for (model_id, variant) in attempts {
            let payload = match variant {
                PayloadVariant::Full => ledger_json.clone(),
                PayloadVariant::Compact => compact_value(&ledger_json, COMPACT_MAX_DEPTH),
            };
            let messages = vec![
                ChatMessage::system(ASSESSOR_SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "Token address: {}\nEvidence ledger:\n{}",
                    token_address,
                    serde_json::to_string(&payload)?
                )),
            ];

            let raw = match self.model.complete(model_id, &messages, true).await {
                Ok(raw) => raw,
                Err(e) if is_no_output_error(&e) => {
                    warn!("assessor attempt on {} produced no output", model_id);
                    last_error = e;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut assessment: Assessment = match serde_json::from_str(&raw) {
                Ok(a) => a,
                Err(e) => {
                    warn!("assessor output from {} did not parse: {}", model_id, e);
                    last_error = anyhow!("assessor output did not match schema: {}", e);
                    continue;
                }
            };

            match validate_assessment(&mut assessment, &ledger_ids) {
                Ok(()) => {
                    info!("assessment accepted from {}", model_id);
                    return Ok((assessment, model_id.clone()));
                }
                Err(e) => {
                    warn!("assessment from {} rejected: {}", model_id, e);
                    last_error = anyhow!("assessment rejected: {}", e);
                    continue;
                }
            }
        }

        Err(last_error)
    }
}

/// Deterministic assessment used when every LLM attempt fails. Low confidence
/// by construction; cites the entire ledger so the citations still resolve.
pub fn fallback_assessment(ledger: &EvidenceLedger) -> Assessment {
    let all_ids = ledger.ids();
    let ok_count = ledger.items.iter().filter(|i| i.is_ok()).count();
    let unavailable = ledger.unavailable_tools();

    let mut missing_data = vec!["AI assessment output could not be generated".to_string()];
    if !unavailable.is_empty() {
        let names = unavailable
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        missing_data.push(format!("Upstream data was unavailable for: {}", names));
    }

    Assessment {
        summary: "AI assessment was unavailable for this scan. The evidence ledger below was \
                  collected normally; review it directly. Risk is reported as medium with low \
                  confidence because no model-based weighing took place."
            .to_string(),
        overall_score: 55,
        risk_level: RiskLevel::Medium,
        confidence: Confidence::Low,
        category_scores: CategoryScores {
            contract_security: 50,
            liquidity: 55,
            holder_distribution: 55,
            market_activity: 60,
            honeypot_exposure: 60,
        },
        reasons: vec![
            Reason {
                title: "Evidence collected without model assessment".to_string(),
                detail: format!(
                    "{} of {} investigation steps returned data. The findings were not weighed \
                     by the assessor model.",
                    ok_count,
                    ledger.items.len()
                ),
                evidence_refs: all_ids.clone(),
            },
            Reason {
                title: "Scores are placeholders".to_string(),
                detail: "Category scores default to a neutral band when the assessor is \
                         unavailable; treat them as unknowns, not findings."
                    .to_string(),
                evidence_refs: all_ids,
            },
        ],
        missing_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evidence::{EvidenceItem, ToolName};

    fn ledger_with(ids: &[&str]) -> (EvidenceLedger, Vec<String>) {
        let mut ledger = EvidenceLedger::default();
        for id in ids {
            let mut item = EvidenceItem::ok(
                ToolName::DexscreenerGetPairs,
                "Pairs",
                None,
                serde_json::json!({}),
            );
            item.id = id.to_string();
            ledger.push(item);
        }
        let ids = ledger.ids();
        (ledger, ids)
    }

    fn assessment(reasons: Vec<Reason>) -> Assessment {
        Assessment {
            summary: "ok".into(),
            overall_score: 22,
            risk_level: RiskLevel::Low,
            confidence: Confidence::High,
            category_scores: CategoryScores {
                contract_security: 10,
                liquidity: 20,
                holder_distribution: 30,
                market_activity: 40,
                honeypot_exposure: 50,
            },
            reasons,
            missing_data: vec![],
        }
    }

    #[test]
    fn empty_refs_hydrate_to_full_ledger() {
        let (_, ids) = ledger_with(&["ev_a_1", "ev_b_2"]);
        let mut a = assessment(vec![Reason {
            title: "t".into(),
            detail: "d".into(),
            evidence_refs: vec![],
        }]);
        validate_assessment(&mut a, &ids).unwrap();
        assert_eq!(a.reasons[0].evidence_refs, ids);
    }

    #[test]
    fn unresolved_ref_is_rejected_after_hydration() {
        let (_, ids) = ledger_with(&["ev_a_1"]);
        let mut a = assessment(vec![Reason {
            title: "t".into(),
            detail: "d".into(),
            evidence_refs: vec!["ev_ghost_9".into()],
        }]);
        assert_eq!(
            validate_assessment(&mut a, &ids),
            Err(ValidationError::UnresolvedRef("ev_ghost_9".into()))
        );
    }

    #[test]
    fn zero_reasons_and_blank_text_are_rejected() {
        let (_, ids) = ledger_with(&["ev_a_1"]);
        let mut a = assessment(vec![]);
        assert_eq!(validate_assessment(&mut a, &ids), Err(ValidationError::NoReasons));

        let mut a = assessment(vec![Reason {
            title: "   ".into(),
            detail: "d".into(),
            evidence_refs: vec!["ev_a_1".into()],
        }]);
        assert_eq!(
            validate_assessment(&mut a, &ids),
            Err(ValidationError::BlankReasonText)
        );
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        let (_, ids) = ledger_with(&["ev_a_1"]);
        let mut a = assessment(vec![Reason {
            title: "t".into(),
            detail: "d".into(),
            evidence_refs: vec!["ev_a_1".into()],
        }]);
        a.overall_score = 101;
        assert_eq!(
            validate_assessment(&mut a, &ids),
            Err(ValidationError::ScoreOutOfRange)
        );
    }

    #[test]
    fn compact_truncates_strings_and_caps_depth() {
        let long = "x".repeat(500);
        let value = serde_json::json!({
            "a": long,
            "nested": { "deeper": { "deepest": [1, 2, 3] } },
            "list": (0..20).collect::<Vec<u32>>(),
        });
        let compact = compact_value(&value, 2);

        let a = compact["a"].as_str().unwrap();
        assert!(a.chars().count() <= COMPACT_MAX_STRING + 1);
        assert!(a.ends_with('…'));

        // depth 2: nested object survives one level, leaf collapses
        assert!(compact["nested"]["deeper"].is_string());
        assert_eq!(compact["list"].as_array().unwrap().len(), COMPACT_MAX_ARRAY_CHILDREN);
    }

    #[test]
    fn fallback_assessment_matches_fixed_shape() {
        let (ledger, ids) = ledger_with(&["ev_a_1", "ev_b_2"]);
        let a = fallback_assessment(&ledger);
        assert_eq!(a.overall_score, 55);
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert_eq!(a.confidence, Confidence::Low);
        assert_eq!(a.category_scores.contract_security, 50);
        assert_eq!(a.category_scores.liquidity, 55);
        assert_eq!(a.category_scores.holder_distribution, 55);
        assert_eq!(a.category_scores.market_activity, 60);
        assert_eq!(a.category_scores.honeypot_exposure, 60);
        assert_eq!(a.reasons.len(), 2);
        for reason in &a.reasons {
            assert_eq!(reason.evidence_refs, ids);
        }
        assert!(a.missing_data[0].contains("could not be generated"));
        // all items ok, so no unavailable note
        assert_eq!(a.missing_data.len(), 1);
    }

    #[test]
    fn fallback_assessment_notes_unavailable_tools() {
        let mut ledger = EvidenceLedger::default();
        ledger.push(EvidenceItem::unavailable(
            ToolName::HoldersGetTopHolders,
            "Top holders",
            None,
            "Bitquery request failed with 429".into(),
        ));
        let a = fallback_assessment(&ledger);
        assert_eq!(a.missing_data.len(), 2);
        assert!(a.missing_data[1].contains("holders_getTopHolders"));
    }

    mod ladder {
        use super::*;
        use anyhow::anyhow;
        use async_trait::async_trait;
        use std::sync::{Arc, Mutex};

        struct ScriptedModel {
            responses: Mutex<Vec<anyhow::Result<String>>>,
        }

        #[async_trait]
        impl ChatModel for ScriptedModel {
            async fn complete(
                &self,
                _model_id: &str,
                _messages: &[ChatMessage],
                _json: bool,
            ) -> anyhow::Result<String> {
                self.responses.lock().unwrap().remove(0)
            }
        }

        fn valid_raw(evidence_ref: &str) -> String {
            serde_json::json!({
                "summary": "fine",
                "overallScore": 22,
                "riskLevel": "low",
                "confidence": "high",
                "categoryScores": {
                    "contractSecurity": 10, "liquidity": 10, "holderDistribution": 10,
                    "marketActivity": 10, "honeypotExposure": 10
                },
                "reasons": [{"title": "t", "detail": "d", "evidenceRefs": [evidence_ref]}],
                "missingData": []
            })
            .to_string()
        }

        #[tokio::test]
        async fn ladder_advances_on_no_output_then_accepts() {
            let (ledger, ids) = super::ledger_with(&["ev_a_1"]);
            let model = ScriptedModel {
                responses: Mutex::new(vec![
                    Err(anyhow!(crate::core::llm::NO_OUTPUT_ERROR)),
                    Ok(valid_raw(&ids[0])),
                ]),
            };
            let assessor = Assessor::new(Arc::new(model), "primary".into(), "fallback".into());
            let (a, model_id) = assessor.assess("0xabc", &ledger).await.unwrap();
            assert_eq!(a.overall_score, 22);
            assert_eq!(model_id, "primary"); // second attempt is primary+compact
        }

        #[tokio::test]
        async fn citation_rejection_advances_the_ladder() {
            let (ledger, ids) = super::ledger_with(&["ev_a_1"]);
            let model = ScriptedModel {
                responses: Mutex::new(vec![
                    Ok(valid_raw("ev_ghost_9")),
                    Ok(valid_raw(&ids[0])),
                ]),
            };
            let assessor = Assessor::new(Arc::new(model), "primary".into(), "fallback".into());
            let (a, _) = assessor.assess("0xabc", &ledger).await.unwrap();
            assert_eq!(a.reasons[0].evidence_refs, ids);
        }

        #[tokio::test]
        async fn all_variants_failing_is_an_error() {
            let (ledger, _) = super::ledger_with(&["ev_a_1"]);
            let no_output = || Err(anyhow!(crate::core::llm::NO_OUTPUT_ERROR));
            let model = ScriptedModel {
                responses: Mutex::new(vec![no_output(), no_output(), no_output(), no_output()]),
            };
            let assessor = Assessor::new(Arc::new(model), "primary".into(), "fallback".into());
            assert!(assessor.assess("0xabc", &ledger).await.is_err());
        }

        #[tokio::test]
        async fn hard_api_errors_abort_the_ladder() {
            let (ledger, _) = super::ledger_with(&["ev_a_1"]);
            let model = ScriptedModel {
                responses: Mutex::new(vec![Err(anyhow!("LLM API error (500): boom"))]),
            };
            let assessor = Assessor::new(Arc::new(model), "primary".into(), "fallback".into());
            let err = assessor.assess("0xabc", &ledger).await.unwrap_err();
            assert!(err.to_string().contains("500"));
        }
    }
}
