mod handlers;
mod router;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::core::llm::ChatModel;
use crate::core::providers::ChainRpcClient;
use crate::core::store::Db;
use crate::core::worker::ScanWorker;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub rpc: ChainRpcClient,
    pub worker: ScanWorker,
    pub chat_model: Option<Arc<dyn ChatModel>>,
}

/// Bind and serve the scan API until the process exits.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.api_host, state.config.api_port);
    let app = router::build_api_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Scan API running at http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
