//! Supply-percentage math over holder rows. All arithmetic is big-integer
//! with explicit decimal scale; floats only appear at the JSON edge.

use alloy_primitives::{U256, U512};
use serde::{Deserialize, Serialize};

use super::{ratio_to_percent_scaled, scaled_percent_to_f64};
use crate::core::providers::holders::{FetchMethod, RawHolder};

/// Hard cap on the common decimal scale to keep scaled integers bounded.
const MAX_MATH_SCALE: u32 = 36;
/// Display amounts never carry more than 18 fractional digits.
const MAX_DISPLAY_DECIMALS: u32 = 18;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderEntry {
    pub address: String,
    /// Human-unit amount, normalized for display.
    pub amount: String,
    /// Absolute share of total supply; `null` when supply or decimals are
    /// unknown or the rows came from the fallback query.
    pub pct_of_supply: Option<f64>,
    /// Share among the returned top-N. Always defined; relative, not
    /// absolute.
    pub relative_share_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderBreakdown {
    pub holders: Vec<HolderEntry>,
    pub top5_pct: Option<f64>,
    pub top10_pct: Option<f64>,
    pub method: FetchMethod,
}

/// A decimal string parsed to `digits / 10^scale`. Fractional digits beyond
/// the math cap are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScaledAmount {
    digits: U256,
    scale: u32,
}

fn parse_decimal(raw: &str) -> Option<ScaledAmount> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('-') {
        return None;
    }

    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, f),
        None => (raw, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let frac_kept = &frac_part[..frac_part.len().min(MAX_MATH_SCALE as usize)];
    let combined = format!("{}{}", int_part, frac_kept);
    let digits = U256::from_str_radix(combined.trim_start_matches('0'), 10)
        .ok()
        .or_else(|| if combined.chars().all(|c| c == '0') { Some(U256::ZERO) } else { None })?;

    Some(ScaledAmount {
        digits,
        scale: frac_kept.len() as u32,
    })
}

fn pow10(exp: u32) -> U512 {
    U512::from(10u64).pow(U512::from(exp))
}

/// Absolute supply share for one amount. Integer strings are base units;
/// decimal strings are pre-divided human units needing `10^decimals` scaling.
fn pct_of_supply_scaled(amount: ScaledAmount, supply: U256, decimals: u32) -> Option<u128> {
    let decimals = decimals.min(MAX_MATH_SCALE);
    let (num, den) = if amount.scale == 0 {
        (U512::from(amount.digits), U512::from(supply))
    } else {
        (
            U512::from(amount.digits).checked_mul(pow10(decimals))?,
            U512::from(supply).checked_mul(pow10(amount.scale))?,
        )
    };
    ratio_to_percent_scaled(num, den)
}

/// Human-unit display string with at most 18 fractional digits.
fn format_amount(amount: ScaledAmount, decimals: Option<u32>) -> String {
    // Integer base-unit amounts shift into human units when decimals are
    // known; pre-divided amounts are already human units.
    let (digits, scale) = if amount.scale == 0 {
        match decimals {
            Some(d) if d > 0 => (amount.digits, d.min(MAX_MATH_SCALE)),
            _ => return amount.digits.to_string(),
        }
    } else {
        (amount.digits, amount.scale)
    };

    let raw = digits.to_string();
    let scale = scale as usize;
    let (int_part, frac_part) = if raw.len() > scale {
        let split = raw.len() - scale;
        (raw[..split].to_string(), raw[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", raw, width = scale))
    };

    let frac_trimmed: String = frac_part
        .chars()
        .take(MAX_DISPLAY_DECIMALS as usize)
        .collect();
    let frac_trimmed = frac_trimmed.trim_end_matches('0');
    if frac_trimmed.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac_trimmed)
    }
}

/// Build the breakdown for the returned top-N rows.
///
/// `total_supply` is the token's supply as a decimal string in base units.
/// `pctOfSupply` is only computed for `token_holders` rows with a parseable
/// supply and known decimals; `relativeSharePct` is always computed.
pub fn compute_breakdown(
    rows: &[RawHolder],
    total_supply: Option<&str>,
    decimals: Option<u32>,
    method: FetchMethod,
) -> HolderBreakdown {
    let mut parsed: Vec<(String, Option<ScaledAmount>)> = rows
        .iter()
        .map(|r| (r.address.to_lowercase(), parse_decimal(&r.amount)))
        .collect();

    // Rank by amount on a common scale so relative shares are comparable.
    let common_scale = parsed
        .iter()
        .filter_map(|(_, a)| a.map(|a| a.scale))
        .max()
        .unwrap_or(0);
    let rescaled = |a: ScaledAmount| -> U512 {
        U512::from(a.digits) * pow10(common_scale - a.scale)
    };
    parsed.sort_by(|(_, a), (_, b)| {
        let av = a.map(rescaled).unwrap_or(U512::ZERO);
        let bv = b.map(rescaled).unwrap_or(U512::ZERO);
        bv.cmp(&av)
    });

    let total_scaled: U512 = parsed
        .iter()
        .filter_map(|(_, a)| a.map(rescaled))
        .fold(U512::ZERO, |acc, v| acc.saturating_add(v));

    let supply = total_supply.and_then(|s| {
        let parsed = parse_decimal(s)?;
        // Supply is base units; a fractional supply string does not parse.
        if parsed.scale == 0 { Some(parsed.digits) } else { None }
    });
    let absolute_ok = method == FetchMethod::TokenHolders && supply.is_some() && decimals.is_some();

    let mut holders = Vec::with_capacity(parsed.len());
    let mut pct_scaled_per_holder: Vec<Option<u128>> = Vec::with_capacity(parsed.len());

    for (address, amount) in &parsed {
        let (pct_of_supply, relative, display) = match amount {
            Some(a) => {
                let pct = if absolute_ok {
                    pct_of_supply_scaled(*a, supply.unwrap_or(U256::ZERO), decimals.unwrap_or(0))
                } else {
                    None
                };
                let rel = ratio_to_percent_scaled(rescaled(*a), total_scaled).unwrap_or(0);
                (pct, rel, format_amount(*a, decimals))
            }
            None => (None, 0, "0".to_string()),
        };
        pct_scaled_per_holder.push(pct_of_supply);
        holders.push(HolderEntry {
            address: address.clone(),
            amount: display,
            pct_of_supply: pct_of_supply.map(scaled_percent_to_f64),
            relative_share_pct: scaled_percent_to_f64(relative),
        });
    }

    let top_n_pct = |n: usize| -> Option<f64> {
        let slice = &pct_scaled_per_holder[..pct_scaled_per_holder.len().min(n)];
        if slice.is_empty() || slice.iter().any(|p| p.is_none()) {
            return None;
        }
        let sum: u128 = slice.iter().map(|p| p.unwrap_or(0)).sum();
        Some(scaled_percent_to_f64(sum))
    };

    HolderBreakdown {
        top5_pct: top_n_pct(5),
        top10_pct: top_n_pct(10),
        method,
        holders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(address: &str, amount: &str) -> RawHolder {
        RawHolder {
            address: address.to_string(),
            amount: amount.to_string(),
        }
    }

    #[test]
    fn integer_amounts_are_base_units_against_supply() {
        let rows = vec![holder("0xaa", "500"), holder("0xbb", "300"), holder("0xcc", "200")];
        let out = compute_breakdown(&rows, Some("1000"), Some(18), FetchMethod::TokenHolders);

        assert_eq!(out.holders[0].pct_of_supply, Some(50.0));
        assert_eq!(out.holders[1].pct_of_supply, Some(30.0));
        assert_eq!(out.holders[2].pct_of_supply, Some(20.0));
        assert_eq!(out.top5_pct, Some(100.0));
        assert_eq!(out.top10_pct, Some(100.0));
    }

    #[test]
    fn decimal_amounts_are_prescaled_human_units() {
        // supply 1000 * 10^6 base units, holder owns 250.5 human units
        let rows = vec![holder("0xaa", "250.5")];
        let out = compute_breakdown(&rows, Some("1000000000"), Some(6), FetchMethod::TokenHolders);
        assert_eq!(out.holders[0].pct_of_supply, Some(25.05));
    }

    #[test]
    fn fallback_method_never_reports_absolute_share() {
        let rows = vec![holder("0xaa", "500"), holder("0xbb", "500")];
        let out = compute_breakdown(&rows, Some("1000"), Some(18), FetchMethod::BalanceUpdates);
        assert!(out.holders.iter().all(|h| h.pct_of_supply.is_none()));
        assert_eq!(out.top5_pct, None);
        assert_eq!(out.top10_pct, None);
        // relative shares stay defined
        assert_eq!(out.holders[0].relative_share_pct, 50.0);
    }

    #[test]
    fn missing_decimals_nulls_absolute_share() {
        let rows = vec![holder("0xaa", "500")];
        let out = compute_breakdown(&rows, Some("1000"), None, FetchMethod::TokenHolders);
        assert!(out.holders[0].pct_of_supply.is_none());
        assert_eq!(out.top5_pct, None);
    }

    #[test]
    fn unparseable_supply_nulls_absolute_share() {
        let rows = vec![holder("0xaa", "500")];
        let out = compute_breakdown(&rows, Some("not-a-number"), Some(18), FetchMethod::TokenHolders);
        assert!(out.holders[0].pct_of_supply.is_none());
    }

    #[test]
    fn ten_to_the_36_scale_amounts_do_not_overflow() {
        let supply = format!("1{}", "0".repeat(36)); // 10^36 base units
        let half = format!("5{}", "0".repeat(35));
        let rows = vec![holder("0xaa", &half)];
        let out = compute_breakdown(&rows, Some(&supply), Some(18), FetchMethod::TokenHolders);
        assert_eq!(out.holders[0].pct_of_supply, Some(50.0));
    }

    #[test]
    fn relative_share_is_among_returned_rows_only() {
        let rows = vec![holder("0xaa", "75"), holder("0xbb", "25")];
        // Supply far larger than the rows' sum
        let out = compute_breakdown(&rows, Some("100000"), Some(18), FetchMethod::TokenHolders);
        assert_eq!(out.holders[0].relative_share_pct, 75.0);
        assert_eq!(out.holders[1].relative_share_pct, 25.0);
        assert_eq!(out.holders[0].pct_of_supply, Some(0.075));
    }

    #[test]
    fn rows_are_ranked_descending_by_amount() {
        let rows = vec![holder("0xsmall", "1"), holder("0xbig", "999")];
        let out = compute_breakdown(&rows, None, None, FetchMethod::TokenHolders);
        assert_eq!(out.holders[0].address, "0xbig");
        assert_eq!(out.holders[1].address, "0xsmall");
    }

    #[test]
    fn display_amount_caps_fractional_digits_at_18() {
        let amount = format!("1.{}", "1".repeat(30));
        let rows = vec![holder("0xaa", &amount)];
        let out = compute_breakdown(&rows, None, None, FetchMethod::BalanceUpdates);
        let display = &out.holders[0].amount;
        let frac = display.split_once('.').map(|(_, f)| f.len()).unwrap_or(0);
        assert!(frac <= 18, "display fraction too long: {}", display);
    }

    #[test]
    fn base_unit_display_shifts_by_decimals() {
        let rows = vec![holder("0xaa", "1500000")];
        let out = compute_breakdown(&rows, Some("3000000"), Some(6), FetchMethod::TokenHolders);
        assert_eq!(out.holders[0].amount, "1.5");
        assert_eq!(out.holders[0].pct_of_supply, Some(50.0));
    }

    #[test]
    fn top10_sums_at_most_ten_rows() {
        let rows: Vec<RawHolder> = (0..12)
            .map(|i| holder(&format!("0x{:02x}", i), "10"))
            .collect();
        let out = compute_breakdown(&rows, Some("1000"), Some(18), FetchMethod::TokenHolders);
        assert_eq!(out.top5_pct, Some(5.0));
        assert_eq!(out.top10_pct, Some(10.0));
    }
}
