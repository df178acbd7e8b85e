use reqwest::Client;
use serde::Deserialize;

use super::{ProviderError, CHAIN_ID, DEFAULT_TIMEOUT};

const EXPLORER_API_BASE: &str = "https://api.etherscan.io/v2/api";

/// Block-explorer v2 client, pinned to Base. Two reads: verified source
/// (name, compiler, ABI, proxy target) and the contract-creation row.
#[derive(Clone)]
pub struct ExplorerClient {
    http: Client,
    api_key: String,
}

/// Verified-source response, already normalized for the evidence ledger.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub is_verified: bool,
    pub contract_name: Option<String>,
    pub compiler_version: Option<String>,
    /// Raw ABI JSON when the source is verified.
    pub abi: Option<String>,
    pub is_proxy: bool,
    pub implementation_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCreation {
    pub deployer_address: String,
    pub creation_tx_hash: String,
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    result: serde_json::Value,
}

#[derive(Deserialize)]
struct SourceRow {
    #[serde(rename = "SourceCode", default)]
    source_code: String,
    #[serde(rename = "ContractName", default)]
    contract_name: String,
    #[serde(rename = "CompilerVersion", default)]
    compiler_version: String,
    #[serde(rename = "ABI", default)]
    abi: String,
    #[serde(rename = "Proxy", default)]
    proxy: String,
    #[serde(rename = "Implementation", default)]
    implementation: String,
}

#[derive(Deserialize)]
struct CreationRow {
    #[serde(rename = "contractCreator")]
    contract_creator: String,
    #[serde(rename = "txHash")]
    tx_hash: String,
}

impl ExplorerClient {
    pub fn new(http: Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    /// URL shown in citations. The API key is appended only to the request,
    /// never to the link.
    pub fn source_url(&self, module: &str, action: &str, address: &str) -> String {
        format!(
            "{}?chainid={}&module={}&action={}&address={}",
            EXPLORER_API_BASE, CHAIN_ID, module, action, address
        )
    }

    async fn fetch(&self, url_without_key: &str) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}&apikey={}", url_without_key, self.api_key);
        let res = self.http.get(&url).timeout(DEFAULT_TIMEOUT).send().await?;

        if !res.status().is_success() {
            return Err(ProviderError::Status {
                provider: "explorer",
                status: res.status().as_u16(),
            });
        }

        let envelope: Envelope = res
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        // A "0" status with a string result is the explorer's soft error
        // (invalid key, not found, rate limited); carry the upstream message.
        if envelope.status == "0" {
            if let serde_json::Value::String(msg) = &envelope.result {
                return Err(ProviderError::Upstream(msg.clone()));
            }
        }

        Ok(envelope.result)
    }

    pub async fn get_source_info(&self, address: &str) -> Result<SourceInfo, ProviderError> {
        let url = self.source_url("contract", "getsourcecode", address);
        let result = self.fetch(&url).await?;

        let rows: Vec<SourceRow> =
            serde_json::from_value(result).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("empty getsourcecode result".into()))?;

        let is_verified = !row.source_code.trim().is_empty();
        let abi_usable = row.abi.trim_start().starts_with('[');

        Ok(SourceInfo {
            is_verified,
            contract_name: non_empty(row.contract_name),
            compiler_version: non_empty(row.compiler_version),
            abi: if abi_usable { Some(row.abi) } else { None },
            is_proxy: row.proxy == "1",
            implementation_address: non_empty(row.implementation).map(|a| a.to_lowercase()),
        })
    }

    pub async fn get_contract_creation(
        &self,
        address: &str,
    ) -> Result<ContractCreation, ProviderError> {
        let url = self.source_url("contract", "getcontractcreation", address);
        let result = self.fetch(&url).await?;

        let rows: Vec<CreationRow> =
            serde_json::from_value(result).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("empty getcontractcreation result".into()))?;

        Ok(ContractCreation {
            deployer_address: row.contract_creator.to_lowercase(),
            creation_tx_hash: row.tx_hash.to_lowercase(),
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
