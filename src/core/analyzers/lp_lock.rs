//! LP lock inference for V2-style pairs. The pair contract is itself an
//! ERC-20 whose supply is the LP token; burned supply cannot be withdrawn.

use alloy_primitives::U512;
use serde::{Deserialize, Serialize};

use super::{ratio_to_percent_scaled, scaled_percent_to_f64};
use crate::core::abi;
use crate::core::providers::{ChainRpcClient, ProviderError};

/// getReserves() returns three words; anything shorter is not a V2 pair.
/// 2 + 3 * 64 hex chars including the `0x` prefix.
const MIN_RESERVES_HEX_LEN: usize = 194;

const LOCKED_BURN_THRESHOLD_SCALED: u128 = 95_0000;
const UNLOCKED_DEPLOYER_THRESHOLD_SCALED: u128 = 20_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    Locked,
    Unlocked,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LpLockAnalysis {
    pub pair_address: String,
    pub is_v2_pair: bool,
    pub burned_pct: Option<f64>,
    pub deployer_pct: Option<f64>,
    pub status: LockStatus,
    pub confidence: LockConfidence,
    pub reason: String,
}

fn unknown(pair_address: &str, is_v2: bool, reason: String) -> LpLockAnalysis {
    LpLockAnalysis {
        pair_address: pair_address.to_lowercase(),
        is_v2_pair: is_v2,
        burned_pct: None,
        deployer_pct: None,
        status: LockStatus::Unknown,
        confidence: LockConfidence::Low,
        reason,
    }
}

pub async fn analyze_lp_lock(
    rpc: &ChainRpcClient,
    pair_address: &str,
    deployer_address: Option<&str>,
) -> Result<LpLockAnalysis, ProviderError> {
    let pair = pair_address.to_lowercase();

    let reserves = rpc
        .eth_call(&pair, &abi::encode_call(abi::SELECTOR_GET_RESERVES))
        .await?;
    if reserves.len() < MIN_RESERVES_HEX_LEN {
        return Ok(unknown(
            &pair,
            false,
            "Pair does not expose V2-style reserves; lock status cannot be inferred".into(),
        ));
    }

    let total_supply_data = abi::encode_call(abi::SELECTOR_TOTAL_SUPPLY);
    let zero_balance_data = abi::encode_call_address(abi::SELECTOR_BALANCE_OF, abi::ZERO_ADDRESS);
    let dead_balance_data = abi::encode_call_address(abi::SELECTOR_BALANCE_OF, abi::DEAD_ADDRESS);
    let total_call = rpc.eth_call(&pair, &total_supply_data);
    let zero_call = rpc.eth_call(&pair, &zero_balance_data);
    let dead_call = rpc.eth_call(&pair, &dead_balance_data);
    let (total_raw, zero_raw, dead_raw) = tokio::join!(total_call, zero_call, dead_call);

    let total = abi::decode_uint(&total_raw?)
        .ok_or_else(|| ProviderError::Decode("bad totalSupply word".into()))?;
    let zero_bal = abi::decode_uint(&zero_raw?)
        .ok_or_else(|| ProviderError::Decode("bad balanceOf word".into()))?;
    let dead_bal = abi::decode_uint(&dead_raw?)
        .ok_or_else(|| ProviderError::Decode("bad balanceOf word".into()))?;

    if total.is_zero() {
        return Ok(unknown(&pair, true, "Pair LP supply is zero".into()));
    }

    let burned = U512::from(zero_bal) + U512::from(dead_bal);
    let burned_scaled =
        ratio_to_percent_scaled(burned, U512::from(total)).unwrap_or(0);

    let deployer_scaled = match deployer_address {
        Some(deployer) => {
            let raw = rpc
                .eth_call(
                    &pair,
                    &abi::encode_call_address(abi::SELECTOR_BALANCE_OF, deployer),
                )
                .await?;
            let bal = abi::decode_uint(&raw)
                .ok_or_else(|| ProviderError::Decode("bad balanceOf word".into()))?;
            Some(ratio_to_percent_scaled(U512::from(bal), U512::from(total)).unwrap_or(0))
        }
        None => None,
    };

    let burned_pct = scaled_percent_to_f64(burned_scaled);
    let deployer_pct = deployer_scaled.map(scaled_percent_to_f64);

    let (status, confidence, reason) = if burned_scaled >= LOCKED_BURN_THRESHOLD_SCALED {
        (
            LockStatus::Locked,
            LockConfidence::High,
            format!("{:.2}% of LP tokens are burned", burned_pct),
        )
    } else if deployer_scaled.is_some_and(|d| d >= UNLOCKED_DEPLOYER_THRESHOLD_SCALED) {
        (
            LockStatus::Unlocked,
            LockConfidence::Medium,
            format!(
                "Deployer still holds {:.2}% of LP tokens",
                deployer_pct.unwrap_or(0.0)
            ),
        )
    } else {
        (
            LockStatus::Unknown,
            LockConfidence::Low,
            format!(
                "{:.2}% of LP burned and no dominant deployer position; lock status unclear",
                burned_pct
            ),
        )
    };

    Ok(LpLockAnalysis {
        pair_address: pair,
        is_v2_pair: true,
        burned_pct: Some(burned_pct),
        deployer_pct,
        status,
        confidence,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds_match_contract() {
        assert!(95_0000 >= LOCKED_BURN_THRESHOLD_SCALED);
        assert!(94_9999 < LOCKED_BURN_THRESHOLD_SCALED);
        assert!(20_0000 >= UNLOCKED_DEPLOYER_THRESHOLD_SCALED);
        assert!(19_9999 < UNLOCKED_DEPLOYER_THRESHOLD_SCALED);
    }

    #[test]
    fn reserves_length_gate_requires_three_words() {
        // 0x + 192 hex chars = exactly three return words
        let ok = format!("0x{}", "0".repeat(192));
        assert!(ok.len() >= MIN_RESERVES_HEX_LEN);
        let short = format!("0x{}", "0".repeat(64));
        assert!(short.len() < MIN_RESERVES_HEX_LEN);
    }
}
