use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    middleware,
    middleware::Next,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers::{chat, preflight, scans, stream};
use super::AppState;

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { axum::Json(serde_json::json!({ "status": "ok" })) }))
        .route(
            "/api/preflight/contract-code",
            get(preflight::preflight_contract_code),
        )
        .route("/api/scans", post(scans::create_scan))
        .route("/api/scans/{id}", get(scans::get_scan))
        .route("/api/scans/{id}/run", post(scans::run_scan))
        .route("/api/scans/{id}/events", get(scans::list_events))
        .route("/api/scans/{id}/stream", get(stream::stream_events))
        .route("/api/scans/{id}/chat", post(chat::chat_about_scan))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.config.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}
