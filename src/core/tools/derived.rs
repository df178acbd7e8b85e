//! Tools that derive analysis from prior evidence plus targeted chain reads.

use async_trait::async_trait;
use serde_json::json;

use crate::core::analyzers::capabilities::scan_capabilities;
use crate::core::analyzers::lp_lock::analyze_lp_lock;
use crate::core::analyzers::owner::analyze_owner;
use crate::core::evidence::{EvidenceItem, EvidenceLedger, ToolName};
use crate::core::providers::explorer::{ContractCreation, SourceInfo};
use crate::core::providers::{ChainRpcClient, ProviderError};

use super::market::DexPairsData;
use super::ToolExecutor;

pub struct LpLockTool {
    rpc: ChainRpcClient,
}

impl LpLockTool {
    pub fn new(rpc: ChainRpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ToolExecutor for LpLockTool {
    fn tool(&self) -> ToolName {
        ToolName::LpV2LockStatus
    }

    fn title(&self) -> &'static str {
        "LP lock status"
    }

    async fn run(
        &self,
        _token_address: &str,
        prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let pair_address = prior
            .data_for::<DexPairsData>(ToolName::DexscreenerGetPairs)
            .and_then(|d| d.best_pair)
            .map(|p| p.pair_address);

        let Some(pair_address) = pair_address.filter(|p| !p.is_empty()) else {
            return Ok(EvidenceItem::unavailable(
                self.tool(),
                self.title(),
                None,
                "No trading pair available to probe for LP lock status".into(),
            ));
        };

        let deployer = prior
            .data_for::<ContractCreation>(ToolName::BasescanGetContractCreation)
            .map(|c| c.deployer_address);

        let analysis = analyze_lp_lock(&self.rpc, &pair_address, deployer.as_deref()).await?;
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(self.rpc.source_url()),
            serde_json::to_value(&analysis).unwrap_or_else(|_| json!({})),
        ))
    }
}

pub struct OwnerStatusTool {
    rpc: ChainRpcClient,
}

impl OwnerStatusTool {
    pub fn new(rpc: ChainRpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ToolExecutor for OwnerStatusTool {
    fn tool(&self) -> ToolName {
        ToolName::ContractOwnerStatus
    }

    fn title(&self) -> &'static str {
        "Owner status"
    }

    async fn run(
        &self,
        token_address: &str,
        prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let abi = prior
            .data_for::<SourceInfo>(ToolName::BasescanGetSourceInfo)
            .and_then(|s| s.abi);

        let status = analyze_owner(&self.rpc, token_address, abi.as_deref()).await?;
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(self.rpc.source_url()),
            serde_json::to_value(&status).unwrap_or_else(|_| json!({})),
        ))
    }
}

pub struct CapabilityScanTool;

impl CapabilityScanTool {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolExecutor for CapabilityScanTool {
    fn tool(&self) -> ToolName {
        ToolName::ContractCapabilityScan
    }

    fn title(&self) -> &'static str {
        "Contract capabilities"
    }

    async fn run(
        &self,
        _token_address: &str,
        prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let source = prior.data_for::<SourceInfo>(ToolName::BasescanGetSourceInfo);
        let (abi, is_proxy) = match &source {
            Some(s) => (s.abi.clone(), s.is_proxy),
            None => (None, false),
        };

        let scan = scan_capabilities(abi.as_deref(), is_proxy);
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            None,
            serde_json::to_value(&scan).unwrap_or_else(|_| json!({})),
        ))
    }
}
