pub mod assessor;
pub mod planner;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Raised when the model produced nothing usable; the bridge advances its
/// model/payload ladder on exactly this error.
pub const NO_OUTPUT_ERROR: &str = "No output generated";

pub fn is_no_output_error(err: &anyhow::Error) -> bool {
    err.to_string().contains(NO_OUTPUT_ERROR)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The LLM is a structured-output oracle that can fail; validation of what it
/// returns lives with the callers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        json_output: bool,
    ) -> Result<String>;
}

// ── OpenAI-compatible chat completions ──

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// OpenAI-format client. Planner and assessor both run at temperature 0 with
/// JSON output forced; the chat surface uses plain text.
pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(http: Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        json_output: bool,
    ) -> Result<String> {
        let req = CompletionRequest {
            model: model_id,
            messages,
            temperature: 0.0,
            response_format: json_output.then_some(ResponseFormat { kind: "json_object" }),
        };

        let res = self
            .http
            .post(&self.base_url)
            .timeout(std::time::Duration::from_secs(45))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(anyhow!(
                "LLM API error ({}): {}",
                res.status().as_u16(),
                res.text().await.unwrap_or_default()
            ));
        }

        let parsed: CompletionResponse = res.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(anyhow!(NO_OUTPUT_ERROR));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_output_detection_matches_the_sentinel() {
        assert!(is_no_output_error(&anyhow!(NO_OUTPUT_ERROR)));
        assert!(is_no_output_error(&anyhow!("upstream: No output generated (model x)")));
        assert!(!is_no_output_error(&anyhow!("LLM API error (500)")));
    }
}
