use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::evidence::ToolName;
use crate::core::pipeline::plan::PlannedStep;

use super::{is_no_output_error, ChatMessage, ChatModel};

const PLANNER_SYSTEM_PROMPT: &str = "You plan on-chain token investigations. \
You are given a token contract address and the set of investigation tools that are \
available right now. Respond with a JSON object of the form \
{\"steps\": [{\"stepKey\": string, \"tool\": string, \"title\": string, \"reason\": string}]} \
ordering the steps from cheapest signal to most specific. Every tool name MUST come from \
the allowed set; never invent tools. Each reason is one short sentence saying what the \
step should establish. The steps array must not be empty.";

#[derive(Deserialize)]
struct PlannerOutput {
    steps: Vec<PlannerStep>,
}

#[derive(Deserialize)]
struct PlannerStep {
    #[serde(rename = "stepKey", default)]
    step_key: String,
    tool: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    reason: String,
}

pub struct Planner {
    model: Arc<dyn ChatModel>,
    primary_model: String,
    fallback_model: String,
}

impl Planner {
    pub fn new(model: Arc<dyn ChatModel>, primary_model: String, fallback_model: String) -> Self {
        Self {
            model,
            primary_model,
            fallback_model,
        }
    }

    /// Ask the model for an ordered investigation plan over `allowed` tools.
    /// On a no-output error from the primary model the call is retried once
    /// with the fallback model; any remaining failure bubbles up and the
    /// runner substitutes the baseline plan.
    pub async fn propose_plan(
        &self,
        token_address: &str,
        allowed: &[ToolName],
    ) -> Result<Vec<PlannedStep>> {
        let messages = self.build_messages(token_address, allowed);

        let raw = match self
            .model
            .complete(&self.primary_model, &messages, true)
            .await
        {
            Ok(raw) => raw,
            Err(e) if is_no_output_error(&e) && self.primary_model != self.fallback_model => {
                warn!(
                    "planner got no output from {}, retrying with {}",
                    self.primary_model, self.fallback_model
                );
                self.model
                    .complete(&self.fallback_model, &messages, true)
                    .await?
            }
            Err(e) => return Err(e),
        };

        let parsed: PlannerOutput = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("planner output did not match schema: {}", e))?;

        let steps: Vec<PlannedStep> = parsed
            .steps
            .into_iter()
            .filter_map(|s| {
                let tool = ToolName::parse(&s.tool)?;
                if !allowed.contains(&tool) {
                    return None;
                }
                Some(PlannedStep {
                    step_key: if s.step_key.is_empty() {
                        tool.as_str().to_string()
                    } else {
                        s.step_key
                    },
                    tool,
                    title: if s.title.is_empty() {
                        tool.as_str().to_string()
                    } else {
                        s.title
                    },
                    reason: s.reason,
                })
            })
            .collect();

        if steps.is_empty() {
            return Err(anyhow!("planner proposed no usable steps"));
        }

        info!("planner proposed {} steps", steps.len());
        Ok(steps)
    }

    fn build_messages(&self, token_address: &str, allowed: &[ToolName]) -> Vec<ChatMessage> {
        let tool_list = allowed
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        vec![
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Token address: {}\nAllowed tools: [{}]",
                token_address, tool_list
            )),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedModel {
        responses: Mutex<Vec<Result<String>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn models_called(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            model_id: &str,
            _messages: &[ChatMessage],
            _json_output: bool,
        ) -> Result<String> {
            self.calls.lock().unwrap().push(model_id.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(anyhow!(super::super::NO_OUTPUT_ERROR));
            }
            responses.remove(0)
        }
    }

    fn planner(model: Arc<ScriptedModel>) -> Planner {
        Planner::new(model, "primary".into(), "fallback".into())
    }

    #[tokio::test]
    async fn valid_plan_parses_and_keeps_order() {
        let raw = r#"{"steps":[
            {"stepKey":"holders","tool":"holders_getTopHolders","title":"Holders","reason":"concentration"},
            {"stepKey":"sim","tool":"honeypot_getSimulation","title":"Simulate","reason":"sellability"}
        ]}"#;
        let p = planner(ScriptedModel::new(vec![Ok(raw.to_string())]));
        let allowed = ToolName::ALL.to_vec();
        let steps = p.propose_plan("0xabc", &allowed).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tool, ToolName::HoldersGetTopHolders);
        assert_eq!(steps[1].tool, ToolName::HoneypotGetSimulation);
    }

    #[tokio::test]
    async fn unknown_and_disallowed_tools_are_dropped() {
        let raw = r#"{"steps":[
            {"stepKey":"a","tool":"made_up_tool","title":"","reason":""},
            {"stepKey":"b","tool":"holders_getTopHolders","title":"","reason":""},
            {"stepKey":"c","tool":"rpc_getBytecode","title":"","reason":""}
        ]}"#;
        let p = planner(ScriptedModel::new(vec![Ok(raw.to_string())]));
        // holders not allowed in this configuration
        let allowed = vec![ToolName::RpcGetBytecode];
        let steps = p.propose_plan("0xabc", &allowed).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool, ToolName::RpcGetBytecode);
    }

    #[tokio::test]
    async fn no_output_retries_once_on_fallback_model() {
        let raw = r#"{"steps":[{"stepKey":"x","tool":"rpc_getBytecode","title":"t","reason":"r"}]}"#;
        let model = ScriptedModel::new(vec![
            Err(anyhow!(super::super::NO_OUTPUT_ERROR)),
            Ok(raw.to_string()),
        ]);
        let p = planner(model.clone());
        let steps = p.propose_plan("0xabc", &[ToolName::RpcGetBytecode]).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(model.models_called(), vec!["primary", "fallback"]);
    }

    #[tokio::test]
    async fn hard_errors_do_not_retry() {
        let model = ScriptedModel::new(vec![Err(anyhow!("LLM API error (500)"))]);
        let p = planner(model);
        let err = p
            .propose_plan("0xabc", &[ToolName::RpcGetBytecode])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn empty_steps_is_an_error() {
        let p = planner(ScriptedModel::new(vec![Ok(r#"{"steps":[]}"#.to_string())]));
        assert!(p.propose_plan("0xabc", &[ToolName::RpcGetBytecode]).await.is_err());
    }
}
