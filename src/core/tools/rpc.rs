use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::abi;
use crate::core::evidence::{EvidenceItem, EvidenceLedger, ToolName};
use crate::core::providers::{ChainRpcClient, ProviderError};

use super::ToolExecutor;

/// `rpc_getBytecode` data shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytecodeData {
    pub address: String,
    pub has_code: bool,
    pub bytecode_size_bytes: usize,
}

pub struct BytecodeTool {
    rpc: ChainRpcClient,
}

impl BytecodeTool {
    pub fn new(rpc: ChainRpcClient) -> Self {
        Self { rpc }
    }
}

/// Byte length of a `0x`-prefixed hex blob; `"0x"` is zero bytes.
pub fn bytecode_size_bytes(hex: &str) -> usize {
    abi::strip_hex_prefix(hex).len() / 2
}

#[async_trait]
impl ToolExecutor for BytecodeTool {
    fn tool(&self) -> ToolName {
        ToolName::RpcGetBytecode
    }

    fn title(&self) -> &'static str {
        "Contract bytecode"
    }

    async fn run(
        &self,
        token_address: &str,
        _prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        let code = self.rpc.get_code(token_address).await?;
        let size = bytecode_size_bytes(&code);
        let data = BytecodeData {
            address: token_address.to_lowercase(),
            has_code: size > 0,
            bytecode_size_bytes: size,
        };
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(self.rpc.source_url()),
            serde_json::to_value(&data).unwrap_or_else(|_| json!({})),
        ))
    }
}

/// `rpc_getErc20Metadata` data shape. `totalSupply` is a decimal string in
/// base units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Erc20Metadata {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u32>,
    pub total_supply: Option<String>,
}

pub struct Erc20MetadataTool {
    rpc: ChainRpcClient,
}

impl Erc20MetadataTool {
    pub fn new(rpc: ChainRpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ToolExecutor for Erc20MetadataTool {
    fn tool(&self) -> ToolName {
        ToolName::RpcGetErc20Metadata
    }

    fn title(&self) -> &'static str {
        "ERC-20 metadata"
    }

    async fn run(
        &self,
        token_address: &str,
        _prior: &EvidenceLedger,
    ) -> Result<EvidenceItem, ProviderError> {
        // Independent view calls; fan out and merge.
        let name_call = self.rpc.eth_call(token_address, abi::SELECTOR_NAME);
        let symbol_call = self.rpc.eth_call(token_address, abi::SELECTOR_SYMBOL);
        let decimals_call = self.rpc.eth_call(token_address, abi::SELECTOR_DECIMALS);
        let supply_call = self.rpc.eth_call(token_address, abi::SELECTOR_TOTAL_SUPPLY);

        let (name_raw, symbol_raw, decimals_raw, supply_raw) =
            tokio::join!(name_call, symbol_call, decimals_call, supply_call);

        // Individual call failures null the field; the item stays ok as long
        // as at least one read landed.
        let name = name_raw.ok().and_then(|r| abi::decode_string(&r));
        let symbol = symbol_raw.ok().and_then(|r| abi::decode_string(&r));
        let decimals = decimals_raw
            .ok()
            .and_then(|r| abi::decode_uint(&r))
            .and_then(|u| u32::try_from(u).ok())
            .filter(|d| *d <= 255);
        let total_supply = supply_raw
            .ok()
            .and_then(|r| abi::decode_uint(&r))
            .map(|u| u.to_string());

        if name.is_none() && symbol.is_none() && decimals.is_none() && total_supply.is_none() {
            return Err(ProviderError::Upstream(
                "All ERC-20 metadata calls failed; address may not be a token".into(),
            ));
        }

        let data = Erc20Metadata {
            address: token_address.to_lowercase(),
            name,
            symbol,
            decimals,
            total_supply,
        };
        Ok(EvidenceItem::ok(
            self.tool(),
            self.title(),
            Some(self.rpc.source_url()),
            serde_json::to_value(&data).unwrap_or_else(|_| json!({})),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bytecode_is_zero_bytes() {
        assert_eq!(bytecode_size_bytes("0x"), 0);
        assert_eq!(bytecode_size_bytes("0x60806040"), 4);
    }
}
