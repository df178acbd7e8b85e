use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ProviderError, DEFAULT_TIMEOUT, NETWORK};

/// DEX aggregator client. One read: the token's trading pairs with
/// liquidity, price and 24h activity.
#[derive(Clone)]
pub struct DexClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PairToken {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PairLiquidity {
    #[serde(default)]
    pub usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PairPriceChange {
    #[serde(default)]
    pub h24: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PairVolume {
    #[serde(default)]
    pub h24: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PairTxnWindow {
    #[serde(default)]
    pub buys: u64,
    #[serde(default)]
    pub sells: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PairTxns {
    #[serde(default)]
    pub h24: PairTxnWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PairRecord {
    #[serde(default)]
    pub dex_id: String,
    #[serde(default)]
    pub pair_address: String,
    #[serde(default)]
    pub base_token: PairToken,
    #[serde(default)]
    pub quote_token: PairToken,
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub price_change: PairPriceChange,
    #[serde(default)]
    pub liquidity: PairLiquidity,
    #[serde(default)]
    pub volume: PairVolume,
    #[serde(default)]
    pub txns: PairTxns,
    #[serde(default)]
    pub pair_created_at: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl DexClient {
    pub fn new(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    pub fn source_url(&self, address: &str) -> String {
        format!(
            "{}/token-pairs/v1/{}/{}",
            self.base_url.trim_end_matches('/'),
            NETWORK,
            address
        )
    }

    pub async fn get_pairs(&self, address: &str) -> Result<Vec<PairRecord>, ProviderError> {
        let url = self.source_url(address);
        let res = self.http.get(&url).timeout(DEFAULT_TIMEOUT).send().await?;

        if res.status().as_u16() == 429 {
            return Err(ProviderError::RateLimited(
                "DEX aggregator request failed with 429".into(),
            ));
        }
        if !res.status().is_success() {
            return Err(ProviderError::Status {
                provider: "dex",
                status: res.status().as_u16(),
            });
        }

        let mut pairs: Vec<PairRecord> = res
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        for pair in &mut pairs {
            pair.pair_address = pair.pair_address.to_lowercase();
            pair.base_token.address = pair.base_token.address.to_lowercase();
            pair.quote_token.address = pair.quote_token.address.to_lowercase();
        }

        Ok(pairs)
    }
}

/// The deepest pool carries the signal; everything else is context.
pub fn best_pair(pairs: &[PairRecord]) -> Option<&PairRecord> {
    pairs
        .iter()
        .max_by(|a, b| a.liquidity.usd.total_cmp(&b.liquidity.usd))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(addr: &str, usd: f64) -> PairRecord {
        PairRecord {
            pair_address: addr.to_string(),
            liquidity: PairLiquidity { usd },
            ..Default::default()
        }
    }

    #[test]
    fn best_pair_picks_deepest_liquidity() {
        let pairs = vec![pair("0xaa", 1_000.0), pair("0xbb", 120_000.0), pair("0xcc", 45.0)];
        assert_eq!(best_pair(&pairs).unwrap().pair_address, "0xbb");
    }

    #[test]
    fn best_pair_of_empty_is_none() {
        assert!(best_pair(&[]).is_none());
    }
}
