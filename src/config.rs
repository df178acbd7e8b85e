use anyhow::{Context, Result};
use tracing::info;

/// How aggressively the holders tool probes the time-indexed dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldersMode {
    Fast,
    Full,
    Off,
}

impl HoldersMode {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "full" => HoldersMode::Full,
            "off" => HoldersMode::Off,
            _ => HoldersMode::Fast,
        }
    }

    /// Past days to probe, oldest-stop-first. Fast mode gives up quickly;
    /// full mode walks a month back.
    pub fn probe_days(&self) -> &'static [i64] {
        match self {
            HoldersMode::Fast => &[1, 2, 7],
            HoldersMode::Full => &[1, 2, 3, 7, 14, 30],
            HoldersMode::Off => &[],
        }
    }
}

/// Process configuration, read from the environment once at boot.
/// Secrets stay in here and are never logged.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub chain_rpc_url: String,

    pub llm_api_key: Option<String>,
    pub llm_model_id: String,
    pub llm_base_url: String,
    pub explorer_api_key: Option<String>,
    pub holders_api_token: Option<String>,
    pub holders_api_url: String,
    pub honeypot_api_key: Option<String>,

    pub scan_cache_ttl_seconds: i64,
    pub holders_mode: HoldersMode,
    pub holders_probe_cap: usize,
    pub holders_min_rows: usize,
    pub dex_api_base_url: String,

    pub api_host: String,
    pub api_port: u16,
}

pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b";
pub const FALLBACK_LLM_MODEL: &str = "llama-3.1-8b-instant";

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_path =
            env_opt("DATABASE_PATH").context("DATABASE_PATH is required (path to the SQLite database)")?;
        let chain_rpc_url = env_opt("CHAIN_RPC_URL").context("CHAIN_RPC_URL is required")?;

        let config = Self {
            database_path,
            chain_rpc_url,
            llm_api_key: env_opt("LLM_API_KEY"),
            llm_model_id: env_opt("LLM_MODEL_ID").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_base_url: env_opt("LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.groq.com/openai/v1/chat/completions".to_string()),
            explorer_api_key: env_opt("EXPLORER_API_KEY"),
            holders_api_token: env_opt("HOLDERS_API_TOKEN"),
            holders_api_url: env_opt("HOLDERS_API_URL")
                .unwrap_or_else(|| "https://streaming.bitquery.io/eap".to_string()),
            honeypot_api_key: env_opt("HONEYPOT_API_KEY"),
            scan_cache_ttl_seconds: env_opt("SCAN_CACHE_TTL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
            holders_mode: env_opt("HOLDERS_MODE")
                .map(|v| HoldersMode::parse(&v))
                .unwrap_or(HoldersMode::Fast),
            holders_probe_cap: env_opt("HOLDERS_PROBE_CAP")
                .and_then(|v| v.parse().ok())
                .unwrap_or(6),
            holders_min_rows: env_opt("HOLDERS_MIN_ROWS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            dex_api_base_url: env_opt("DEX_API_BASE_URL")
                .unwrap_or_else(|| "https://api.dexscreener.com".to_string()),
            api_host: env_opt("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            api_port: env_opt("API_PORT").and_then(|v| v.parse().ok()).unwrap_or(8787),
        };

        config.log_feature_availability();
        Ok(config)
    }

    fn log_feature_availability(&self) {
        if self.llm_api_key.is_none() {
            info!("LLM_API_KEY not set: planner and assessor run in deterministic fallback mode");
        }
        if self.explorer_api_key.is_none() {
            info!("EXPLORER_API_KEY not set: source/creation/owner/capability steps disabled");
        }
        if self.holders_api_token.is_none() || self.holders_mode == HoldersMode::Off {
            info!("Holders provider disabled (no token or HOLDERS_MODE=off)");
        }
    }

    pub fn llm_enabled(&self) -> bool {
        self.llm_api_key.is_some()
    }

    pub fn explorer_enabled(&self) -> bool {
        self.explorer_api_key.is_some()
    }

    pub fn holders_enabled(&self) -> bool {
        self.holders_api_token.is_some() && self.holders_mode != HoldersMode::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holders_mode_parses_known_values() {
        assert_eq!(HoldersMode::parse("fast"), HoldersMode::Fast);
        assert_eq!(HoldersMode::parse("FULL"), HoldersMode::Full);
        assert_eq!(HoldersMode::parse("off"), HoldersMode::Off);
        assert_eq!(HoldersMode::parse("garbage"), HoldersMode::Fast);
    }

    #[test]
    fn fast_mode_probes_three_days() {
        assert_eq!(HoldersMode::Fast.probe_days(), &[1, 2, 7]);
        assert_eq!(HoldersMode::Full.probe_days(), &[1, 2, 3, 7, 14, 30]);
        assert!(HoldersMode::Off.probe_days().is_empty());
    }
}
