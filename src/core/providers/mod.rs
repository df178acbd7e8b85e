pub mod chain_rpc;
pub mod dex;
pub mod explorer;
pub mod holders;
pub mod honeypot;

use std::time::Duration;

use thiserror::Error;

pub use chain_rpc::ChainRpcClient;
pub use dex::DexClient;
pub use explorer::ExplorerClient;
pub use holders::HoldersClient;
pub use honeypot::HoneypotClient;

/// Default per-call timeout for RPC, explorer, DEX and holders providers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// The honeypot simulation runs a full buy/sell simulation upstream.
pub const HONEYPOT_TIMEOUT: Duration = Duration::from_secs(12);

/// The explorer and honeypot APIs pin Base.
pub const CHAIN_ID: u64 = 8453;
pub const NETWORK: &str = "base";

/// What went wrong talking to an external provider. Tool executors fold any
/// of these into an `unavailable` evidence item; the scan continues.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} from {provider}")]
    Status { provider: &'static str, status: u16 },
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Rate limits and quota exhaustion suppress fallback queries; everything
    /// else may be retried through a different path.
    pub fn is_quota(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

/// One HTTP client per process; providers clone the cheap handle.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("tokensleuth/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_detection_only_matches_rate_limits() {
        assert!(ProviderError::RateLimited("Bitquery request failed with 429".into()).is_quota());
        assert!(!ProviderError::Upstream("NOTOK".into()).is_quota());
        assert!(!ProviderError::Decode("bad hex".into()).is_quota());
    }
}
