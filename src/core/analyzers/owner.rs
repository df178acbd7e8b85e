//! Owner-slot probe: does the contract expose `owner()`, and if so, has
//! ownership been renounced to the zero/dead sentinel?

use serde::{Deserialize, Serialize};

use crate::core::abi;
use crate::core::analyzers::capabilities::function_names;
use crate::core::providers::{ChainRpcClient, ProviderError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerStatus {
    pub has_owner_function: bool,
    pub owner_address: Option<String>,
    pub renounced: Option<bool>,
}

pub async fn analyze_owner(
    rpc: &ChainRpcClient,
    token_address: &str,
    abi_json: Option<&str>,
) -> Result<OwnerStatus, ProviderError> {
    let has_owner_function = abi_json
        .map(|raw| function_names(raw).iter().any(|n| n == "owner"))
        .unwrap_or(false);

    if !has_owner_function {
        return Ok(OwnerStatus {
            has_owner_function: false,
            owner_address: None,
            renounced: None,
        });
    }

    let raw = rpc
        .eth_call(token_address, &abi::encode_call(abi::SELECTOR_OWNER))
        .await?;
    let owner = abi::decode_address(&raw)
        .ok_or_else(|| ProviderError::Decode("owner() returned a malformed word".into()))?;
    let renounced = abi::is_renounce_sentinel(&owner);

    Ok(OwnerStatus {
        has_owner_function: true,
        owner_address: Some(owner),
        renounced: Some(renounced),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_detection_requires_exact_function_name() {
        let abi = r#"[{"type":"function","name":"owner"}]"#;
        assert!(function_names(abi).iter().any(|n| n == "owner"));
        let abi = r#"[{"type":"function","name":"ownerOf"}]"#;
        assert!(!function_names(abi).iter().any(|n| n == "owner"));
    }
}
