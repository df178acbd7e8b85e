pub mod capabilities;
pub mod holder_math;
pub mod lp_lock;
pub mod owner;

use alloy_primitives::U512;

/// Percent precision: four fractional digits, fixed point.
pub const PCT_SCALE: u32 = 4;

/// `(num * 100 * 10^4) / den` on big integers. Returns the percentage as a
/// scaled integer (`12_3456` = 12.3456%). `None` when `den` is zero.
pub fn ratio_to_percent_scaled(num: U512, den: U512) -> Option<u128> {
    if den.is_zero() {
        return None;
    }
    let scaled = num
        .checked_mul(U512::from(100u64 * 10u64.pow(PCT_SCALE)))?
        .checked_div(den)?;
    u128::try_from(scaled).ok()
}

/// Scaled percent to an f64 for the JSON edge. The division by 10^4 is the
/// only float step; comparisons happen on the scaled integers.
pub fn scaled_percent_to_f64(scaled: u128) -> f64 {
    scaled as f64 / 10f64.powi(PCT_SCALE as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn ratio_math_keeps_four_fractional_digits() {
        let num = U512::from(97u64);
        let den = U512::from(100u64);
        assert_eq!(ratio_to_percent_scaled(num, den), Some(97_0000));

        let num = U512::from(1u64);
        let den = U512::from(3u64);
        assert_eq!(ratio_to_percent_scaled(num, den), Some(33_3333));
    }

    #[test]
    fn ratio_of_zero_denominator_is_none() {
        assert_eq!(ratio_to_percent_scaled(U512::from(1u64), U512::ZERO), None);
    }

    #[test]
    fn huge_supplies_do_not_overflow() {
        // 10^36-scale amounts, the boundary case from the data model
        let base = U512::from(U256::from(10u64).pow(U256::from(36u64)));
        let num = base * U512::from(37u64);
        let den = base * U512::from(100u64);
        assert_eq!(ratio_to_percent_scaled(num, den), Some(37_0000));
    }

    #[test]
    fn scaled_percent_converts_to_float_for_json() {
        assert_eq!(scaled_percent_to_f64(97_0000), 97.0);
        assert_eq!(scaled_percent_to_f64(12_3456), 12.3456);
    }
}
