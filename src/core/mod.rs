pub mod abi;
pub mod analyzers;
pub mod evidence;
pub mod llm;
pub mod pipeline;
pub mod providers;
pub mod store;
pub mod tools;
pub mod worker;

use std::sync::OnceLock;

use regex::Regex;

/// Token addresses on the wire: `0x` + 40 hex chars, case-insensitive.
pub fn is_valid_address(raw: &str) -> bool {
    static ADDRESS_RE: OnceLock<Regex> = OnceLock::new();
    ADDRESS_RE
        .get_or_init(|| Regex::new("^0x[0-9a-fA-F]{40}$").expect("static regex"))
        .is_match(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation_requires_exactly_forty_hex_chars() {
        assert!(is_valid_address("0xf43eb8de897fbc7f2502483b2bef7bb9ea179229"));
        assert!(is_valid_address("0xF43EB8DE897FBC7F2502483B2BEF7BB9EA179229"));
        assert!(!is_valid_address("f43eb8de897fbc7f2502483b2bef7bb9ea179229"));
        assert!(!is_valid_address("0xf43eb8de897fbc7f2502483b2bef7bb9ea17922"));
        assert!(!is_valid_address("0xf43eb8de897fbc7f2502483b2bef7bb9ea1792299"));
        assert!(!is_valid_address("0xg43eb8de897fbc7f2502483b2bef7bb9ea179229"));
        assert!(!is_valid_address(""));
    }
}
