use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::core::is_valid_address;
use crate::core::providers::NETWORK;
use crate::core::tools::BytecodeData;

use super::super::AppState;
use super::error_response;

#[derive(Deserialize)]
pub struct PreflightQuery {
    address: Option<String>,
}

/// Cheap bytecode existence check, used by the UI before creating a scan.
pub async fn preflight_contract_code(
    State(state): State<AppState>,
    Query(query): Query<PreflightQuery>,
) -> Response {
    let Some(address) = query.address else {
        return error_response(StatusCode::BAD_REQUEST, "address query parameter is required");
    };
    if !is_valid_address(&address) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a valid token address", address),
        );
    }
    let address = address.to_lowercase();

    match state.rpc.get_code(&address).await {
        Ok(code) => {
            let size = crate::core::tools::bytecode_size_bytes(&code);
            let data = BytecodeData {
                address: address.clone(),
                has_code: size > 0,
                bytecode_size_bytes: size,
            };
            Json(serde_json::json!({
                "chain": NETWORK,
                "address": data.address,
                "hasCode": data.has_code,
                "bytecodeSizeBytes": data.bytecode_size_bytes,
            }))
            .into_response()
        }
        Err(e) => error_response(
            StatusCode::BAD_GATEWAY,
            format!("Chain RPC preflight failed: {}", e),
        ),
    }
}
