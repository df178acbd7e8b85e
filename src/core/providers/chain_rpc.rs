use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ProviderError, DEFAULT_TIMEOUT};

/// JSON-RPC 2.0 client for the chain node. Only `eth_getCode` and `eth_call`
/// are used; results are `0x`-prefixed hex strings.
#[derive(Clone)]
pub struct ChainRpcClient {
    http: Client,
    url: String,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl ChainRpcClient {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }

    pub fn source_url(&self) -> String {
        self.url.clone()
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<String, ProviderError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let res = self
            .http
            .post(&self.url)
            .timeout(DEFAULT_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(ProviderError::Status {
                provider: "chain-rpc",
                status: res.status().as_u16(),
            });
        }

        let envelope: RpcEnvelope = res
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(ProviderError::Upstream(format!(
                "Chain RPC error ({}): {}",
                err.code, err.message
            )));
        }

        match envelope.result {
            Some(serde_json::Value::String(hex)) => Ok(hex),
            Some(other) => Err(ProviderError::Decode(format!(
                "expected hex string result, got {}",
                other
            ))),
            None => Err(ProviderError::Decode("missing result".into())),
        }
    }

    /// Deployed bytecode at `address`; `"0x"` means no contract.
    pub async fn get_code(&self, address: &str) -> Result<String, ProviderError> {
        self.call("eth_getCode", json!([address, "latest"])).await
    }

    /// Read-only call of `data` against `to` at the latest block.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String, ProviderError> {
        self.call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await
    }
}
