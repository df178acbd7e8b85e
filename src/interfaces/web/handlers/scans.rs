use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::core::is_valid_address;
use crate::core::providers::NETWORK;
use crate::core::tools::bytecode_size_bytes;

use super::super::AppState;
use super::error_response;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScanRequest {
    token_address: String,
}

/// Create a scan, or return a fresh cached one for the same token.
pub async fn create_scan(
    State(state): State<AppState>,
    Json(payload): Json<CreateScanRequest>,
) -> Response {
    let address = payload.token_address.trim().to_lowercase();
    if !is_valid_address(&address) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a valid token address", payload.token_address),
        );
    }

    // Preflight: refuse to queue work for addresses with no bytecode.
    match state.rpc.get_code(&address).await {
        Ok(code) if bytecode_size_bytes(&code) == 0 => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Address does not contain contract bytecode on Base",
            );
        }
        Ok(_) => {}
        Err(e) => {
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Chain RPC preflight failed: {}", e),
            );
        }
    }

    // Serve a recent complete scan instead of re-running the pipeline.
    match state.db.latest_complete_scan(NETWORK, &address).await {
        Ok(Some(cached)) if cached.age_seconds() <= state.config.scan_cache_ttl_seconds => {
            info!("serving cached scan {} for {}", cached.id, address);
            return (
                StatusCode::OK,
                Json(serde_json::json!({
                    "scanId": cached.id,
                    "status": "complete",
                    "cached": true,
                })),
            )
                .into_response();
        }
        Ok(_) => {}
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let scan = match state.db.insert_scan(NETWORK, &address).await {
        Ok(scan) => scan,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    if let Err(e) = state.db.enqueue_job(&scan.id).await {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    state.worker.trigger();

    info!("scan {} queued for {}", scan.id, address);
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "scanId": scan.id,
            "status": "queued",
            "cached": false,
        })),
    )
        .into_response()
}

/// Full scan record: status, evidence, assessment, narrative, error.
pub async fn get_scan(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.db.get_scan(&id).await {
        Ok(Some(scan)) => Json(scan).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "scan not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Re-enqueue a run for a non-terminal scan. Idempotent by the one-live-job
/// invariant.
pub async fn run_scan(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let scan = match state.db.get_scan(&id).await {
        Ok(Some(scan)) => scan,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "scan not found"),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    if scan.status.is_terminal() {
        return (
            StatusCode::OK,
            Json(serde_json::json!({
                "scanId": scan.id,
                "status": scan.status,
                "skipped": true,
            })),
        )
            .into_response();
    }

    let outcome = match state.db.enqueue_job(&scan.id).await {
        Ok(outcome) => outcome,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    state.worker.trigger();

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "scanId": scan.id,
            "status": scan.status,
            "enqueued": outcome.enqueued,
            "jobId": outcome.job_id,
            "jobStatus": outcome.status,
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    after: i64,
}

/// Poll-style event listing; `nextAfter` is the cursor for the next call.
pub async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let scan = match state.db.get_scan(&id).await {
        Ok(Some(scan)) => scan,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "scan not found"),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let events = match state.db.list_events_after(&id, query.after).await {
        Ok(events) => events,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let next_after = events.last().map(|e| e.id).unwrap_or(query.after);

    Json(serde_json::json!({
        "scanId": scan.id,
        "status": scan.status,
        "events": events,
        "nextAfter": next_after,
    }))
    .into_response()
}
