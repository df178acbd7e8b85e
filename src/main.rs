mod config;
mod core;
mod interfaces;
mod logging;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::{Config, FALLBACK_LLM_MODEL};
use crate::core::llm::assessor::Assessor;
use crate::core::llm::planner::Planner;
use crate::core::llm::{ChatModel, LlmClient};
use crate::core::pipeline::runner::PipelineRunner;
use crate::core::providers::{
    build_http_client, ChainRpcClient, DexClient, ExplorerClient, HoldersClient, HoneypotClient,
};
use crate::core::store::Db;
use crate::core::tools::{ProviderSet, ToolRegistry};
use crate::core::worker::ScanWorker;
use crate::interfaces::web::{serve, AppState};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        tracing::error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Arc::new(Config::from_env()?);
    let db = Db::open(&config.database_path)?;
    let http = build_http_client();

    let rpc = ChainRpcClient::new(http.clone(), config.chain_rpc_url.clone());
    let providers = ProviderSet {
        rpc: rpc.clone(),
        explorer: config
            .explorer_api_key
            .clone()
            .map(|key| ExplorerClient::new(http.clone(), key)),
        dex: DexClient::new(http.clone(), config.dex_api_base_url.clone()),
        honeypot: HoneypotClient::new(http.clone(), config.honeypot_api_key.clone()),
        holders: config.holders_enabled().then(|| {
            HoldersClient::new(
                http.clone(),
                config.holders_api_url.clone(),
                config.holders_api_token.clone().unwrap_or_default(),
            )
        }),
    };
    let registry = Arc::new(ToolRegistry::new(providers, &config));

    let chat_model: Option<Arc<dyn ChatModel>> = config.llm_api_key.clone().map(|key| {
        Arc::new(LlmClient::new(http.clone(), config.llm_base_url.clone(), key))
            as Arc<dyn ChatModel>
    });

    let (planner, assessor) = match &chat_model {
        Some(model) => (
            Some(Planner::new(
                model.clone(),
                config.llm_model_id.clone(),
                FALLBACK_LLM_MODEL.to_string(),
            )),
            Some(Assessor::new(
                model.clone(),
                config.llm_model_id.clone(),
                FALLBACK_LLM_MODEL.to_string(),
            )),
        ),
        None => (None, None),
    };

    let runner = Arc::new(PipelineRunner::new(
        db.clone(),
        registry,
        planner,
        assessor,
        config.explorer_enabled(),
        config.holders_enabled(),
    ));
    let worker = ScanWorker::new(db.clone(), runner);

    // Pick up any jobs left pending by a previous process.
    worker.trigger();

    info!(
        "tokensleuth {} starting (chain rpc: {})",
        env!("CARGO_PKG_VERSION"),
        config.chain_rpc_url
    );

    serve(AppState {
        db,
        config,
        rpc,
        worker,
        chat_model,
    })
    .await
}
