mod derived;
mod explorer;
mod holders;
mod market;
mod rpc;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Config;
use crate::core::evidence::{EvidenceItem, EvidenceLedger, ToolName};
use crate::core::providers::{
    ChainRpcClient, DexClient, ExplorerClient, HoldersClient, HoneypotClient, ProviderError,
};

pub use derived::{CapabilityScanTool, LpLockTool, OwnerStatusTool};
pub use explorer::{ContractCreationTool, SourceInfoTool};
pub use holders::{HoldersData, TopHoldersTool};
pub use market::{DexPairsData, DexPairsTool, HoneypotTool};
pub use rpc::{bytecode_size_bytes, BytecodeData, BytecodeTool, Erc20Metadata, Erc20MetadataTool};

/// One investigation step. Executors read prior evidence by tool to avoid
/// refetching and must never let an error escape: failures become
/// `unavailable` items with the error string preserved.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn tool(&self) -> ToolName;
    fn title(&self) -> &'static str;

    async fn run(
        &self,
        token_address: &str,
        prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError>;

    async fn execute(&self, token_address: &str, prior: &EvidenceLedger) -> EvidenceItem {
        match self.run(token_address, prior).await {
            Ok(item) => item,
            Err(e) => {
                warn!("{} degraded: {}", self.tool(), e);
                EvidenceItem::unavailable(self.tool(), self.title(), None, e.to_string())
            }
        }
    }
}

/// External clients the executors draw on. Optional entries mirror the
/// conditional-feature configuration.
#[derive(Clone)]
pub struct ProviderSet {
    pub rpc: ChainRpcClient,
    pub explorer: Option<ExplorerClient>,
    pub dex: DexClient,
    pub honeypot: HoneypotClient,
    pub holders: Option<HoldersClient>,
}

/// Owns the closed tool table, built once at process start.
pub struct ToolRegistry {
    executors: HashMap<ToolName, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new(providers: ProviderSet, config: &Config) -> Self {
        let mut executors: HashMap<ToolName, Arc<dyn ToolExecutor>> = HashMap::new();

        let mut register = |exec: Arc<dyn ToolExecutor>| {
            executors.insert(exec.tool(), exec);
        };

        register(Arc::new(BytecodeTool::new(providers.rpc.clone())));
        register(Arc::new(Erc20MetadataTool::new(providers.rpc.clone())));
        register(Arc::new(DexPairsTool::new(providers.dex.clone())));
        register(Arc::new(HoneypotTool::new(providers.honeypot.clone())));
        register(Arc::new(LpLockTool::new(providers.rpc.clone())));

        if let Some(explorer) = providers.explorer.clone() {
            register(Arc::new(SourceInfoTool::new(explorer.clone())));
            register(Arc::new(ContractCreationTool::new(explorer)));
            register(Arc::new(OwnerStatusTool::new(providers.rpc.clone())));
            register(Arc::new(CapabilityScanTool::new()));
        }

        if let Some(holders) = providers.holders.clone() {
            register(Arc::new(TopHoldersTool::new(
                holders,
                config.holders_mode,
                config.holders_probe_cap,
                config.holders_min_rows,
            )));
        }

        Self { executors }
    }

    #[cfg(test)]
    pub fn from_executors(executors: Vec<Arc<dyn ToolExecutor>>) -> Self {
        Self {
            executors: executors.into_iter().map(|e| (e.tool(), e)).collect(),
        }
    }

    pub fn available_tools(&self) -> Vec<ToolName> {
        let mut tools: Vec<ToolName> = self.executors.keys().copied().collect();
        tools.sort_by_key(|t| t.as_str());
        tools
    }

    /// Run one tool; a tool missing from the table (provider not configured)
    /// degrades the same way a failed fetch does.
    pub async fn execute(
        &self,
        tool: ToolName,
        token_address: &str,
        prior: &EvidenceLedger,
    ) -> EvidenceItem {
        match self.executors.get(&tool) {
            Some(exec) => exec.execute(token_address, prior).await,
            None => EvidenceItem::unavailable(
                tool,
                tool.as_str(),
                None,
                "Tool is not available with the current provider configuration".into(),
            ),
        }
    }
}
