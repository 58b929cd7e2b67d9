//! Decimal token amounts <-> base units
//!
//! Thin layer over `alloy_primitives::utils` that rejects negative amounts
//! and renders the short form wallets display (`"1.5"`, `"2.0"`).

use alloy_primitives::utils::{format_units as alloy_format, parse_units as alloy_parse, ParseUnits};
use alloy_primitives::U256;

/// Parse a user-entered decimal amount into base units.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, String> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err("amount is empty".into());
    }
    match alloy_parse(trimmed, decimals).map_err(|e| format!("{trimmed}: {e}"))? {
        ParseUnits::U256(value) if !value.is_zero() => Ok(value),
        ParseUnits::U256(_) => Err(format!("{trimmed}: amount must be positive")),
        ParseUnits::I256(_) => Err(format!("{trimmed}: amount must be positive")),
    }
}

/// Format base units as a decimal string with trailing zeros trimmed but at
/// least one fractional digit.
pub fn format_units(value: U256, decimals: u8) -> String {
    let full = match alloy_format(value, decimals) {
        Ok(full) => full,
        Err(_) => return value.to_string(),
    };
    match full.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                format!("{whole}.0")
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => format!("{full}.0"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_a_wallet() {
        let one = U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(format_units(one, 18), "1.0");
        assert_eq!(format_units(one / U256::from(2u64), 18), "0.5");
        assert_eq!(format_units(U256::ZERO, 18), "0.0");
        assert_eq!(format_units(U256::from(1_234_500u64), 6), "1.2345");
    }

    #[test]
    fn parses_positive_decimals_only() {
        assert_eq!(parse_units("1.5", 18).unwrap(), U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(parse_units(" 2 ", 6).unwrap(), U256::from(2_000_000u64));
        assert!(parse_units("0", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("abc", 18).is_err());
        assert!(parse_units("", 18).is_err());
    }
}
