use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::config::HoldersMode;
use crate::core::analyzers::holder_math::{compute_breakdown, HolderEntry};
use crate::core::evidence::{EvidenceItem, EvidenceLedger, ToolName};
use crate::core::providers::holders::FetchMethod;
use crate::core::providers::{HoldersClient, ProviderError};

use super::rpc::Erc20Metadata;
use super::ToolExecutor;

const TOP_HOLDERS_LIMIT: usize = 10;
const FALLBACK_LIMIT: usize = 5;

/// `holders_getTopHolders` data shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldersData {
    pub method: FetchMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_date: Option<String>,
    pub holders: Vec<HolderEntry>,
    pub top5_pct: Option<f64>,
    pub top10_pct: Option<f64>,
}

pub struct TopHoldersTool {
    client: HoldersClient,
    mode: HoldersMode,
    probe_cap: usize,
    min_rows: usize,
}

impl TopHoldersTool {
    pub fn new(client: HoldersClient, mode: HoldersMode, probe_cap: usize, min_rows: usize) -> Self {
        Self {
            client,
            mode,
            probe_cap,
            min_rows,
        }
    }
}

#[async_trait]
impl ToolExecutor for TopHoldersTool {
    fn tool(&self) -> ToolName {
        ToolName::HoldersGetTopHolders
    }

    fn title(&self) -> &'static str {
        "Top holders"
    }

    async fn run(
        &self,
        token_address: &str,
        prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let metadata = prior.data_for::<Erc20Metadata>(ToolName::RpcGetErc20Metadata);
        let total_supply = metadata.as_ref().and_then(|m| m.total_supply.clone());
        let decimals = metadata.as_ref().and_then(|m| m.decimals);

        // The snapshot needs enough rows to mean anything; a thinner result
        // just reflects indexing lag, so walk further back.
        let min_rows = self.min_rows.min(TOP_HOLDERS_LIMIT);
        let today = Utc::now().date_naive();

        for days_back in self.mode.probe_days().iter().take(self.probe_cap) {
            let date = (today - Duration::days(*days_back)).format("%Y-%m-%d").to_string();
            let rows = match self
                .client
                .token_holders_on(token_address, &date, TOP_HOLDERS_LIMIT)
                .await
            {
                Ok(rows) => rows,
                // Rate limits and quota exhaustion propagate; the fallback
                // query must not run.
                Err(e) if e.is_quota() => return Err(e),
                // Other probe failures just end the ladder early.
                Err(_) => break,
            };

            if rows.len() >= min_rows {
                info!(
                    "holders snapshot for {} found at {} ({} rows)",
                    token_address,
                    date,
                    rows.len()
                );
                let breakdown = compute_breakdown(
                    &rows,
                    total_supply.as_deref(),
                    decimals,
                    FetchMethod::TokenHolders,
                );
                let data = HoldersData {
                    method: FetchMethod::TokenHolders,
                    snapshot_date: Some(date),
                    top5_pct: breakdown.top5_pct,
                    top10_pct: breakdown.top10_pct,
                    holders: breakdown.holders,
                };
                return Ok(EvidenceItem::ok(
                    self.tool(),
                    self.title(),
                    Some(self.client.source_url()),
                    serde_json::to_value(&data).unwrap_or_else(|_| json!({})),
                ));
            }
        }

        // No archive date had enough rows; fall back to the USD-weighted
        // ranking. Absolute supply shares are not meaningful here.
        let rows = self
            .client
            .balance_updates_top(token_address, FALLBACK_LIMIT)
            .await?;
        if rows.is_empty() {
            return Err(ProviderError::Upstream(
                "No holder data available from either query".into(),
            ));
        }

        let breakdown = compute_breakdown(&rows, None, None, FetchMethod::BalanceUpdates);
        let data = HoldersData {
            method: FetchMethod::BalanceUpdates,
            snapshot_date: None,
            top5_pct: breakdown.top5_pct,
            top10_pct: breakdown.top10_pct,
            holders: breakdown.holders,
        };
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(self.client.source_url()),
            serde_json::to_value(&data).unwrap_or_else(|_| json!({})),
        ))
    }
}
