use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The closed set of investigation tools. Serialized names are part of the
/// wire format and the persisted ledger; do not rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "rpc_getBytecode")]
    RpcGetBytecode,
    #[serde(rename = "rpc_getErc20Metadata")]
    RpcGetErc20Metadata,
    #[serde(rename = "basescan_getSourceInfo")]
    BasescanGetSourceInfo,
    #[serde(rename = "basescan_getContractCreation")]
    BasescanGetContractCreation,
    #[serde(rename = "dexscreener_getPairs")]
    DexscreenerGetPairs,
    #[serde(rename = "honeypot_getSimulation")]
    HoneypotGetSimulation,
    #[serde(rename = "lp_v2_lockStatus")]
    LpV2LockStatus,
    #[serde(rename = "contract_ownerStatus")]
    ContractOwnerStatus,
    #[serde(rename = "contract_capabilityScan")]
    ContractCapabilityScan,
    #[serde(rename = "holders_getTopHolders")]
    HoldersGetTopHolders,
}

impl ToolName {
    pub const ALL: [ToolName; 10] = [
        ToolName::RpcGetBytecode,
        ToolName::RpcGetErc20Metadata,
        ToolName::BasescanGetSourceInfo,
        ToolName::BasescanGetContractCreation,
        ToolName::DexscreenerGetPairs,
        ToolName::HoneypotGetSimulation,
        ToolName::LpV2LockStatus,
        ToolName::ContractOwnerStatus,
        ToolName::ContractCapabilityScan,
        ToolName::HoldersGetTopHolders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::RpcGetBytecode => "rpc_getBytecode",
            ToolName::RpcGetErc20Metadata => "rpc_getErc20Metadata",
            ToolName::BasescanGetSourceInfo => "basescan_getSourceInfo",
            ToolName::BasescanGetContractCreation => "basescan_getContractCreation",
            ToolName::DexscreenerGetPairs => "dexscreener_getPairs",
            ToolName::HoneypotGetSimulation => "honeypot_getSimulation",
            ToolName::LpV2LockStatus => "lp_v2_lockStatus",
            ToolName::ContractOwnerStatus => "contract_ownerStatus",
            ToolName::ContractCapabilityScan => "contract_capabilityScan",
            ToolName::HoldersGetTopHolders => "holders_getTopHolders",
        }
    }

    pub fn parse(raw: &str) -> Option<ToolName> {
        ToolName::ALL.iter().copied().find(|t| t.as_str() == raw)
    }

    /// Short domain prefix used in evidence ids (`ev_<prefix>_<8-hex>`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ToolName::RpcGetBytecode => "code",
            ToolName::RpcGetErc20Metadata => "meta",
            ToolName::BasescanGetSourceInfo => "src",
            ToolName::BasescanGetContractCreation => "create",
            ToolName::DexscreenerGetPairs => "dex",
            ToolName::HoneypotGetSimulation => "hp",
            ToolName::LpV2LockStatus => "lp",
            ToolName::ContractOwnerStatus => "owner",
            ToolName::ContractCapabilityScan => "caps",
            ToolName::HoldersGetTopHolders => "holders",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStatus {
    Ok,
    Unavailable,
}

/// A single tool invocation's result. `data` is the tool-specific payload,
/// serialized from the tool's typed result at the persistence edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub id: String,
    pub tool: ToolName,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub fetched_at: String,
    pub status: EvidenceStatus,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvidenceItem {
    pub fn ok(tool: ToolName, title: &str, source_url: Option<String>, data: serde_json::Value) -> Self {
        Self {
            id: generate_evidence_id(tool),
            tool,
            title: title.to_string(),
            source_url,
            fetched_at: Utc::now().to_rfc3339(),
            status: EvidenceStatus::Ok,
            data,
            error: None,
        }
    }

    pub fn unavailable(tool: ToolName, title: &str, source_url: Option<String>, error: String) -> Self {
        Self {
            id: generate_evidence_id(tool),
            tool,
            title: title.to_string(),
            source_url,
            fetched_at: Utc::now().to_rfc3339(),
            status: EvidenceStatus::Unavailable,
            data: serde_json::json!({}),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == EvidenceStatus::Ok
    }
}

/// `ev_<domainPrefix>_<8-hex>` with cryptographic randomness.
pub fn generate_evidence_id(tool: ToolName) -> String {
    let suffix: u32 = rand::random();
    format!("ev_{}_{:08x}", tool.id_prefix(), suffix)
}

/// The ordered evidence collected during one scan run. Owned by the runner,
/// persisted as the scan's final ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceLedger {
    pub items: Vec<EvidenceItem>,
}

impl EvidenceLedger {
    pub fn push(&mut self, item: EvidenceItem) {
        self.items.push(item);
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    pub fn find(&self, tool: ToolName) -> Option<&EvidenceItem> {
        self.items.iter().find(|i| i.tool == tool)
    }

    /// Typed accessor for a prior tool's `data`. Returns `None` when the tool
    /// has not run, ran unavailable, or its data does not decode as `T`.
    pub fn data_for<T: DeserializeOwned>(&self, tool: ToolName) -> Option<T> {
        let item = self.find(tool)?;
        if !item.is_ok() {
            return None;
        }
        serde_json::from_value(item.data.clone()).ok()
    }

    pub fn unavailable_tools(&self) -> Vec<ToolName> {
        self.items
            .iter()
            .filter(|i| !i.is_ok())
            .map(|i| i.tool)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_round_trip_through_serde() {
        for tool in ToolName::ALL {
            let json = serde_json::to_string(&tool).unwrap();
            assert_eq!(json, format!("\"{}\"", tool.as_str()));
            let back: ToolName = serde_json::from_str(&json).unwrap();
            assert_eq!(back, tool);
        }
    }

    #[test]
    fn parse_rejects_unknown_tool() {
        assert_eq!(ToolName::parse("rpc_getBytecode"), Some(ToolName::RpcGetBytecode));
        assert_eq!(ToolName::parse("rm_rf_slash"), None);
    }

    #[test]
    fn evidence_id_has_prefix_and_hex_suffix() {
        let id = generate_evidence_id(ToolName::DexscreenerGetPairs);
        assert!(id.starts_with("ev_dex_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ledger_typed_accessor_skips_unavailable_items() {
        #[derive(Deserialize)]
        struct Code {
            #[serde(rename = "hasCode")]
            has_code: bool,
        }

        let mut ledger = EvidenceLedger::default();
        ledger.push(EvidenceItem::unavailable(
            ToolName::RpcGetBytecode,
            "Bytecode",
            None,
            "timeout".into(),
        ));
        assert!(ledger.data_for::<Code>(ToolName::RpcGetBytecode).is_none());

        let mut ledger = EvidenceLedger::default();
        ledger.push(EvidenceItem::ok(
            ToolName::RpcGetBytecode,
            "Bytecode",
            None,
            serde_json::json!({"hasCode": true}),
        ));
        let code = ledger.data_for::<Code>(ToolName::RpcGetBytecode).unwrap();
        assert!(code.has_code);
    }

    #[test]
    fn unavailable_tools_lists_only_degraded_items() {
        let mut ledger = EvidenceLedger::default();
        ledger.push(EvidenceItem::ok(
            ToolName::DexscreenerGetPairs,
            "Pairs",
            None,
            serde_json::json!({}),
        ));
        ledger.push(EvidenceItem::unavailable(
            ToolName::HoldersGetTopHolders,
            "Holders",
            None,
            "Bitquery request failed with 429".into(),
        ));
        assert_eq!(ledger.unavailable_tools(), vec![ToolName::HoldersGetTopHolders]);
    }
}
