//! Minimal ABI plumbing for the handful of view calls the scanner makes.
//! Calldata is a 4-byte selector plus 32-byte-padded arguments; returns are
//! 32-byte words decoded by hand.

use alloy_primitives::U256;

pub const SELECTOR_NAME: &str = "0x06fdde03";
pub const SELECTOR_SYMBOL: &str = "0x95d89b41";
pub const SELECTOR_DECIMALS: &str = "0x313ce567";
pub const SELECTOR_TOTAL_SUPPLY: &str = "0x18160ddd";
pub const SELECTOR_BALANCE_OF: &str = "0x70a08231";
pub const SELECTOR_GET_RESERVES: &str = "0x0902f1ac";
pub const SELECTOR_OWNER: &str = "0x8da5cb5b";

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
pub const DEAD_ADDRESS: &str = "0x000000000000000000000000000000000000dead";

/// Strip a `0x`/`0X` prefix if present.
pub fn strip_hex_prefix(raw: &str) -> &str {
    raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")).unwrap_or(raw)
}

/// Calldata for a nullary call: just the selector.
pub fn encode_call(selector: &str) -> String {
    selector.to_string()
}

/// Calldata for a single-address-argument call (`balanceOf(address)` shape).
pub fn encode_call_address(selector: &str, address: &str) -> String {
    format!("{}{:0>64}", selector, strip_hex_prefix(address).to_lowercase())
}

/// Decode a 32-byte return word as U256. Empty returns decode as zero.
pub fn decode_uint(raw: &str) -> Option<U256> {
    let hex = strip_hex_prefix(raw);
    if hex.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(hex, 16).ok()
}

/// Decode the last 20 bytes of a 32-byte return word as a lowercase address.
pub fn decode_address(raw: &str) -> Option<String> {
    let hex = strip_hex_prefix(raw);
    if hex.len() < 40 {
        return None;
    }
    let tail = &hex[hex.len() - 40..];
    if !tail.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", tail.to_lowercase()))
}

/// Decode a solidity `string` return: offset word, length word, utf-8 bytes.
/// Some older tokens return `bytes32` instead; fall back to trimming NULs.
pub fn decode_string(raw: &str) -> Option<String> {
    let hex = strip_hex_prefix(raw);
    if hex.is_empty() {
        return None;
    }

    let bytes = decode_hex_bytes(hex)?;

    if bytes.len() >= 64 {
        let offset = word_as_usize(&bytes[0..32])?;
        if offset + 32 <= bytes.len() {
            if let Some(len) = word_as_usize(&bytes[offset..offset + 32]) {
                if offset + 32 + len <= bytes.len() {
                    let s = String::from_utf8_lossy(&bytes[offset + 32..offset + 32 + len]);
                    return Some(s.trim_matches('\0').to_string());
                }
            }
        }
    }

    // bytes32 fallback
    if bytes.len() == 32 {
        let s = String::from_utf8_lossy(&bytes);
        let trimmed = s.trim_matches('\0').trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    None
}

fn decode_hex_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

fn word_as_usize(word: &[u8]) -> Option<usize> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut v: usize = 0;
    for b in &word[24..] {
        v = v.checked_mul(256)?.checked_add(*b as usize)?;
    }
    Some(v)
}

/// An address is "renounced" when owner() returns the zero or dead sentinel.
pub fn is_renounce_sentinel(address: &str) -> bool {
    let a = address.to_lowercase();
    a == ZERO_ADDRESS || a == DEAD_ADDRESS
}
