//! ABI-driven capability inference: what the contract *could* do to holders.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityScan {
    pub abi_available: bool,
    pub mint_possible: bool,
    pub can_blacklist: bool,
    pub can_pause: bool,
    pub can_set_fees: bool,
    pub has_trading_toggle: bool,
    pub upgradeable_proxy: bool,
    /// Function names that triggered a flag, for the citation trail.
    pub flagged_functions: Vec<String>,
}

#[derive(Deserialize)]
struct AbiEntry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    name: String,
}

/// Lowercased function names from a raw ABI JSON array.
pub fn function_names(abi_json: &str) -> Vec<String> {
    let entries: Vec<AbiEntry> = match serde_json::from_str(abi_json) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    entries
        .into_iter()
        .filter(|e| e.kind == "function" && !e.name.is_empty())
        .map(|e| e.name.to_lowercase())
        .collect()
}

const MINT_MARKERS: &[&str] = &["mint"];
const BLACKLIST_MARKERS: &[&str] = &["blacklist", "blocklist"];
const PAUSE_MARKERS: &[&str] = &["pause", "unpause"];
const FEE_MARKERS: &[&str] = &["setfee", "tax", "settax", "setbuy", "setsell"];
const TRADING_MARKERS: &[&str] = &["trading", "enabletrading", "disabletrading"];

fn matches_any(name: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| name.contains(m))
}

pub fn scan_capabilities(abi_json: Option<&str>, upgradeable_proxy: bool) -> CapabilityScan {
    let Some(abi_json) = abi_json else {
        return CapabilityScan {
            upgradeable_proxy,
            ..Default::default()
        };
    };

    let names = function_names(abi_json);
    let mut scan = CapabilityScan {
        abi_available: true,
        upgradeable_proxy,
        ..Default::default()
    };

    for name in &names {
        let mut flagged = false;
        if matches_any(name, MINT_MARKERS) {
            scan.mint_possible = true;
            flagged = true;
        }
        if matches_any(name, BLACKLIST_MARKERS) {
            scan.can_blacklist = true;
            flagged = true;
        }
        if matches_any(name, PAUSE_MARKERS) {
            scan.can_pause = true;
            flagged = true;
        }
        if matches_any(name, FEE_MARKERS) {
            scan.can_set_fees = true;
            flagged = true;
        }
        if matches_any(name, TRADING_MARKERS) {
            scan.has_trading_toggle = true;
            flagged = true;
        }
        if flagged {
            scan.flagged_functions.push(name.clone());
        }
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abi(names: &[&str]) -> String {
        let entries: Vec<serde_json::Value> = names
            .iter()
            .map(|n| serde_json::json!({"type": "function", "name": n}))
            .collect();
        serde_json::to_string(&entries).unwrap()
    }

    #[test]
    fn mint_is_a_substring_match() {
        let scan = scan_capabilities(Some(&abi(&["mintTo", "transfer"])), false);
        assert!(scan.mint_possible);
        assert!(!scan.can_blacklist);
        assert_eq!(scan.flagged_functions, vec!["mintto"]);
    }

    #[test]
    fn blacklist_and_blocklist_both_flag() {
        assert!(scan_capabilities(Some(&abi(&["addToBlacklist"])), false).can_blacklist);
        assert!(scan_capabilities(Some(&abi(&["setBlocklist"])), false).can_blacklist);
    }

    #[test]
    fn pause_fee_and_trading_markers_flag() {
        let scan = scan_capabilities(
            Some(&abi(&["unpause", "setTaxRate", "enableTrading"])),
            false,
        );
        assert!(scan.can_pause);
        assert!(scan.can_set_fees);
        assert!(scan.has_trading_toggle);
    }

    #[test]
    fn proxy_flag_passes_through_without_abi() {
        let scan = scan_capabilities(None, true);
        assert!(scan.upgradeable_proxy);
        assert!(!scan.abi_available);
        assert!(!scan.mint_possible);
    }

    #[test]
    fn non_function_entries_are_ignored() {
        let raw = r#"[{"type":"event","name":"Minted"},{"type":"function","name":"transfer"}]"#;
        let scan = scan_capabilities(Some(raw), false);
        assert!(!scan.mint_possible);
    }

    #[test]
    fn malformed_abi_yields_no_flags() {
        let scan = scan_capabilities(Some("not-json"), false);
        assert!(scan.abi_available);
        assert!(!scan.mint_possible);
        assert!(scan.flagged_functions.is_empty());
    }
}
