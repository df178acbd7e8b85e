use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ProviderError, CHAIN_ID, HONEYPOT_TIMEOUT};

const HONEYPOT_API_BASE: &str = "https://api.honeypot.is/v2/IsHoneypot";

/// Honeypot simulation client: simulates buy/sell/transfer against a fork
/// and reports taxes, gas and the honeypot verdict.
#[derive(Clone)]
pub struct HoneypotClient {
    http: Client,
    api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HoneypotSimulation {
    pub simulation_success: bool,
    pub is_honeypot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub honeypot_reason: Option<String>,
    pub buy_tax: f64,
    pub sell_tax: f64,
    pub transfer_tax: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_gas: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_gas: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_name: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    #[serde(default)]
    simulation_success: bool,
    #[serde(default)]
    honeypot_result: Option<RawVerdict>,
    #[serde(default)]
    simulation_result: Option<RawSimulation>,
    #[serde(default)]
    pair: Option<RawPair>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    #[serde(default)]
    is_honeypot: bool,
    #[serde(default)]
    honeypot_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawSimulation {
    #[serde(default)]
    buy_tax: f64,
    #[serde(default)]
    sell_tax: f64,
    #[serde(default)]
    transfer_tax: f64,
    #[serde(default)]
    buy_gas: Option<String>,
    #[serde(default)]
    sell_gas: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawPair {
    #[serde(default)]
    pair: Option<RawPairInner>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawPairInner {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl HoneypotClient {
    pub fn new(http: Client, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    pub fn source_url(&self, address: &str) -> String {
        format!("{}?address={}&chainID={}", HONEYPOT_API_BASE, address, CHAIN_ID)
    }

    pub async fn get_simulation(&self, address: &str) -> Result<HoneypotSimulation, ProviderError> {
        let url = self.source_url(address);
        let mut req = self.http.get(&url).timeout(HONEYPOT_TIMEOUT);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-KEY", key);
        }

        let res = req.send().await?;
        if res.status().as_u16() == 429 {
            return Err(ProviderError::RateLimited(
                "Honeypot simulation request failed with 429".into(),
            ));
        }
        if !res.status().is_success() {
            return Err(ProviderError::Status {
                provider: "honeypot",
                status: res.status().as_u16(),
            });
        }

        let raw: RawResponse = res
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let verdict = raw.honeypot_result.unwrap_or_default();
        let sim = raw.simulation_result.unwrap_or_default();
        let pair = raw.pair.and_then(|p| p.pair).unwrap_or_default();

        Ok(HoneypotSimulation {
            simulation_success: raw.simulation_success,
            is_honeypot: verdict.is_honeypot,
            honeypot_reason: verdict.honeypot_reason,
            buy_tax: sim.buy_tax,
            sell_tax: sim.sell_tax,
            transfer_tax: sim.transfer_tax,
            buy_gas: sim.buy_gas.and_then(|g| g.parse().ok()),
            sell_gas: sim.sell_gas.and_then(|g| g.parse().ok()),
            pair_address: pair.address.map(|a| a.to_lowercase()),
            pair_name: pair.name,
        })
    }
}
