use async_trait::async_trait;
use serde_json::json;

use crate::core::evidence::{EvidenceItem, EvidenceLedger, ToolName};
use crate::core::providers::{ExplorerClient, ProviderError};

use super::ToolExecutor;

pub struct SourceInfoTool {
    explorer: ExplorerClient,
}

impl SourceInfoTool {
    pub fn new(explorer: ExplorerClient) -> Self {
        Self { explorer }
    }
}

#[async_trait]
impl ToolExecutor for SourceInfoTool {
    fn tool(&self) -> ToolName {
        ToolName::BasescanGetSourceInfo
    }

    fn title(&self) -> &'static str {
        "Verified source & ABI"
    }

    async fn run(
        &self,
        token_address: &str,
        _prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let source_url = self
            .explorer
            .source_url("contract", "getsourcecode", token_address);
        let info = self.explorer.get_source_info(token_address).await?;
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(source_url),
            serde_json::to_value(&info).unwrap_or_else(|_| json!({})),
        ))
    }
}

pub struct ContractCreationTool {
    explorer: ExplorerClient,
}

impl ContractCreationTool {
    pub fn new(explorer: ExplorerClient) -> Self {
        Self { explorer }
    }
}

#[async_trait]
impl ToolExecutor for ContractCreationTool {
    fn tool(&self) -> ToolName {
        ToolName::BasescanGetContractCreation
    }

    fn title(&self) -> &'static str {
        "Contract creation"
    }

    async fn run(
        &self,
        token_address: &str,
        _prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let source_url = self
            .explorer
            .source_url("contract", "getcontractcreation", token_address);
        let creation = self.explorer.get_contract_creation(token_address).await?;
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(source_url),
            serde_json::to_value(&creation).unwrap_or_else(|_| json!({})),
        ))
    }
}
