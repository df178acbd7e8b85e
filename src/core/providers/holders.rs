use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ProviderError, DEFAULT_TIMEOUT};

/// Indexed-holder GraphQL client (Bitquery-style time-indexed dataset).
/// Primary query: `TokenHolders` snapshot for a past date, balance-desc.
/// Fallback query: `BalanceUpdates` ranked by USD-weighted sum.
#[derive(Clone)]
pub struct HoldersClient {
    http: Client,
    url: String,
    token: String,
}

/// One holder row as returned upstream. `amount` is a decimal string: integer
/// token-units from `TokenHolders`, possibly pre-divided decimals from the
/// `BalanceUpdates` fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHolder {
    pub address: String,
    pub amount: String,
}

/// Which query produced the rows; supply percentages are only absolute for
/// `token_holders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    TokenHolders,
    BalanceUpdates,
}

const TOKEN_HOLDERS_QUERY: &str = r#"
query ($date: String!, $token: String!, $limit: Int!) {
  EVM(dataset: archive, network: base) {
    TokenHolders(
      date: $date
      tokenSmartContract: $token
      limit: { count: $limit }
      orderBy: { descending: Balance_Amount }
      where: {
        Balance: { Amount: { gt: "0" } }
        BalanceUpdate: { FirstDate: { le: $date } }
      }
    ) {
      Holder { Address }
      Balance { Amount }
    }
  }
}
"#;

const BALANCE_UPDATES_QUERY: &str = r#"
query ($token: String!, $limit: Int!) {
  EVM(dataset: combined, network: base) {
    BalanceUpdates(
      limit: { count: $limit }
      orderBy: { descendingByField: "usd" }
      where: { Currency: { SmartContract: { is: $token } } }
    ) {
      BalanceUpdate { Address }
      usd: sum(of: BalanceUpdate_AmountInUSD)
      amount: sum(of: BalanceUpdate_Amount)
    }
  }
}
"#;

impl HoldersClient {
    pub fn new(http: Client, url: String, token: String) -> Self {
        Self { http, url, token }
    }

    pub fn source_url(&self) -> String {
        self.url.clone()
    }

    async fn post(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let res = self
            .http
            .post(&self.url)
            .timeout(DEFAULT_TIMEOUT)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = res.status().as_u16();
        if status == 402 || status == 429 {
            return Err(ProviderError::RateLimited(format!(
                "Bitquery request failed with {}",
                status
            )));
        }
        if !res.status().is_success() {
            return Err(ProviderError::Status {
                provider: "holders",
                status,
            });
        }

        let body: serde_json::Value = res
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; ");
            let lowered = message.to_lowercase();
            if lowered.contains("quota") || lowered.contains("payment") || lowered.contains("points")
            {
                return Err(ProviderError::RateLimited(format!(
                    "Bitquery quota exhausted: {}",
                    message
                )));
            }
            return Err(ProviderError::Upstream(message));
        }

        Ok(body)
    }

    /// Holder snapshot for one past date. Caller walks the date ladder.
    pub async fn token_holders_on(
        &self,
        token: &str,
        date: &str,
        limit: usize,
    ) -> Result<Vec<RawHolder>, ProviderError> {
        let body = self
            .post(
                TOKEN_HOLDERS_QUERY,
                json!({ "date": date, "token": token, "limit": limit }),
            )
            .await?;

        let rows = body
            .pointer("/data/EVM/TokenHolders")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(rows
            .iter()
            .filter_map(|row| {
                let address = row.pointer("/Holder/Address")?.as_str()?.to_lowercase();
                let amount = row.pointer("/Balance/Amount")?.as_str()?.to_string();
                Some(RawHolder { address, amount })
            })
            .collect())
    }

    /// USD-weighted fallback when no archive snapshot has enough rows.
    pub async fn balance_updates_top(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<RawHolder>, ProviderError> {
        let body = self
            .post(BALANCE_UPDATES_QUERY, json!({ "token": token, "limit": limit }))
            .await?;

        let rows = body
            .pointer("/data/EVM/BalanceUpdates")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(rows
            .iter()
            .filter_map(|row| {
                let address = row
                    .pointer("/BalanceUpdate/Address")?
                    .as_str()?
                    .to_lowercase();
                let amount = match row.get("amount") {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Number(n)) => n.to_string(),
                    _ => return None,
                };
                Some(RawHolder { address, amount })
            })
            .collect())
    }
}
