use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use crate::core::evidence::ToolName;
use crate::core::llm::ChatMessage;

use super::super::AppState;
use super::error_response;

const MAX_MESSAGES: usize = 8;
const MAX_MESSAGE_CHARS: usize = 800;
const MAX_EVIDENCE_ITEMS: usize = 8;
/// Above this the snapshot is rebuilt without per-item `data`.
const PROMPT_BUDGET_CHARS: usize = 24_000;

const CHAT_SYSTEM_PROMPT: &str = "You answer questions about one completed token scan. \
You are given an evidence snapshot: the scan record, the recent conversation, and selected \
evidence items with ids. Answer ONLY from the snapshot. Cite the evidence ids you used, like \
[ev_dex_1a2b3c4d]. If the snapshot does not contain the answer, say so plainly; never guess \
or use outside knowledge. Keep answers short and concrete.";

#[derive(Deserialize)]
pub struct ChatRequest {
    messages: Vec<IncomingMessage>,
}

#[derive(Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

/// Tools most likely to answer the user's latest question, by keyword.
fn preferred_tools(query: &str) -> Vec<ToolName> {
    let q = query.to_lowercase();
    let mut preferred = Vec::new();
    let mut add = |tools: &[ToolName]| {
        for t in tools {
            if !preferred.contains(t) {
                preferred.push(*t);
            }
        }
    };

    if ["honeypot", "tax", "sell", "buy", "simulat"].iter().any(|k| q.contains(k)) {
        add(&[ToolName::HoneypotGetSimulation, ToolName::DexscreenerGetPairs]);
    }
    if ["holder", "whale", "concentration", "distribution", "supply"]
        .iter()
        .any(|k| q.contains(k))
    {
        add(&[ToolName::HoldersGetTopHolders, ToolName::RpcGetErc20Metadata]);
    }
    if ["liquidity", "lp", "lock", "pool", "pair", "burn"].iter().any(|k| q.contains(k)) {
        add(&[ToolName::LpV2LockStatus, ToolName::DexscreenerGetPairs]);
    }
    if ["owner", "renounc", "mint", "blacklist", "pause", "proxy", "source", "abi", "deploy"]
        .iter()
        .any(|k| q.contains(k))
    {
        add(&[
            ToolName::ContractOwnerStatus,
            ToolName::ContractCapabilityScan,
            ToolName::BasescanGetSourceInfo,
            ToolName::BasescanGetContractCreation,
        ]);
    }
    if ["bytecode", "code", "contract"].iter().any(|k| q.contains(k)) {
        add(&[ToolName::RpcGetBytecode]);
    }
    preferred
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!("{}…", kept)
}

fn select_evidence(
    items: &[serde_json::Value],
    preferred: &[ToolName],
    include_data: bool,
) -> Vec<serde_json::Value> {
    let rank = |item: &serde_json::Value| -> usize {
        let tool = item
            .get("tool")
            .and_then(|t| t.as_str())
            .and_then(ToolName::parse);
        match tool {
            Some(tool) => preferred
                .iter()
                .position(|p| *p == tool)
                .unwrap_or(preferred.len()),
            None => preferred.len() + 1,
        }
    };

    let mut sorted: Vec<&serde_json::Value> = items.iter().collect();
    sorted.sort_by_key(|item| rank(item));

    sorted
        .into_iter()
        .take(MAX_EVIDENCE_ITEMS)
        .map(|item| {
            let mut out = serde_json::Map::new();
            for key in ["id", "tool", "title", "status", "sourceUrl", "error"] {
                if let Some(v) = item.get(key) {
                    out.insert(key.to_string(), v.clone());
                }
            }
            if include_data {
                if let Some(v) = item.get("data") {
                    out.insert("data".to_string(), v.clone());
                }
            }
            serde_json::Value::Object(out)
        })
        .collect()
}

pub async fn chat_about_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ChatRequest>,
) -> Response {
    let Some(chat_model) = state.chat_model.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "AI chat is not configured");
    };

    if payload.messages.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "messages must not be empty");
    }
    for message in &payload.messages {
        if message.role != "user" && message.role != "assistant" {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("unsupported message role '{}'", message.role),
            );
        }
        if message.content.trim().is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "message content must not be empty");
        }
    }

    let scan = match state.db.get_scan(&id).await {
        Ok(Some(scan)) => scan,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "scan not found"),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let latest_query = payload
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();
    let preferred = preferred_tools(&latest_query);

    let items: Vec<serde_json::Value> = scan
        .evidence
        .as_ref()
        .and_then(|e| e.get("items"))
        .and_then(|i| i.as_array())
        .cloned()
        .unwrap_or_default();

    let conversation: Vec<serde_json::Value> = payload
        .messages
        .iter()
        .rev()
        .take(MAX_MESSAGES)
        .rev()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": truncate_chars(&m.content, MAX_MESSAGE_CHARS),
            })
        })
        .collect();

    let build_snapshot = |include_data: bool| {
        serde_json::json!({
            "scan": {
                "id": scan.id,
                "tokenAddress": scan.token_address,
                "status": scan.status,
                "narrative": scan.narrative,
                "assessment": scan.assessment,
            },
            "conversation": conversation,
            "evidence": select_evidence(&items, &preferred, include_data),
        })
    };

    // Second pass drops the heavy data fields when the snapshot overruns
    // the prompt budget.
    let mut snapshot = build_snapshot(true).to_string();
    if snapshot.chars().count() > PROMPT_BUDGET_CHARS {
        snapshot = build_snapshot(false).to_string();
    }

    let messages = vec![
        ChatMessage::system(CHAT_SYSTEM_PROMPT),
        ChatMessage::user(format!("Evidence snapshot:\n{}\n\nAnswer the latest user message.", snapshot)),
    ];

    match chat_model
        .complete(&state.config.llm_model_id, &messages, false)
        .await
    {
        Ok(message) => Json(serde_json::json!({ "message": message })).into_response(),
        Err(e) => {
            warn!("chat completion failed for scan {}: {}", id, e);
            error_response(StatusCode::BAD_GATEWAY, format!("chat model failed: {}", e))
        }
    }
}
