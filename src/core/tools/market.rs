use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::evidence::{EvidenceItem, EvidenceLedger, ToolName};
use crate::core::providers::dex::{best_pair, PairRecord};
use crate::core::providers::{DexClient, HoneypotClient, ProviderError};

use super::ToolExecutor;

/// `dexscreener_getPairs` data shape. `bestPair` is the deepest pool and the
/// anchor for the LP lock probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPairsData {
    pub pair_count: usize,
    pub best_pair: Option<PairRecord>,
    pub pairs: Vec<PairRecord>,
}

pub struct DexPairsTool {
    dex: DexClient,
}

impl DexPairsTool {
    pub fn new(dex: DexClient) -> Self {
        Self { dex }
    }
}

#[async_trait]
impl ToolExecutor for DexPairsTool {
    fn tool(&self) -> ToolName {
        ToolName::DexscreenerGetPairs
    }

    fn title(&self) -> &'static str {
        "DEX trading pairs"
    }

    async fn run(
        &self,
        token_address: &str,
        _prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let source_url = self.dex.source_url(token_address);
        let pairs = self.dex.get_pairs(token_address).await?;
        let data = DexPairsData {
            pair_count: pairs.len(),
            best_pair: best_pair(&pairs).cloned(),
            pairs,
        };
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(source_url),
            serde_json::to_value(&data).unwrap_or_else(|_| json!({})),
        ))
    }
}

pub struct HoneypotTool {
    honeypot: HoneypotClient,
}

impl HoneypotTool {
    pub fn new(honeypot: HoneypotClient) -> Self {
        Self { honeypot }
    }
}

#[async_trait]
impl ToolExecutor for HoneypotTool {
    fn tool(&self) -> ToolName {
        ToolName::HoneypotGetSimulation
    }

    fn title(&self) -> &'static str {
        "Honeypot simulation"
    }

    async fn run(
        &self,
        token_address: &str,
        _prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let source_url = self.honeypot.source_url(token_address);
        let simulation = self.honeypot.get_simulation(token_address).await?;
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(source_url),
            serde_json::to_value(&simulation).unwrap_or_else(|_| json!({})),
        ))
    }
}
