//! Fixed-point conversions for values read from the pool and price feeds.
//!
//! Two precisions are in play and must not be mixed up:
//! - USD-quoted oracle answers carry 8 decimals.
//! - Native-unit (ETH) amounts, ratios and health factors carry 18 decimals.
//!
//! The lending pool reports its liquidation threshold in basis points and the
//! anchored view reports USD prices with 6 decimals.

use alloy::primitives::U256;

use crate::pair::PricePair;

/// Decimals of USD-quoted oracle answers.
pub const USD_PRICE_DECIMALS: u8 = 8;

/// Decimals of native-unit fixed-point values (WAD).
pub const WAD_DECIMALS: u8 = 18;

/// Decimals of basis-point values (10000 = 100%).
pub const BPS_DECIMALS: u8 = 4;

/// Decimals of anchored-view USD prices.
pub const ANCHORED_VIEW_DECIMALS: u8 = 6;

/// Quote unit that selects the 8-decimal oracle convention.
pub const USD: &str = "USD";

/// Convert a raw oracle answer to a decimal price.
///
/// USD-quoted pairs use 8 decimals, anything else is read as an 18-decimal
/// native-unit value.
pub fn to_decimal_price(raw: U256, pair: &PricePair) -> f64 {
    if pair.is_quoted_in(USD) {
        fixed_to_f64(raw, USD_PRICE_DECIMALS)
    } else {
        fixed_to_f64(raw, WAD_DECIMALS)
    }
}

/// Convert an 18-decimal value to f64.
///
/// `U256::MAX` is what the pool reports as the health factor of an account
/// without debt; it maps to `f64::INFINITY`.
pub fn wad_to_f64(raw: U256) -> f64 {
    if raw == U256::MAX {
        return f64::INFINITY;
    }
    fixed_to_f64(raw, WAD_DECIMALS)
}

/// Convert a basis-point value to a ratio (8250 -> 0.825).
pub fn bps_to_ratio(raw: U256) -> f64 {
    fixed_to_f64(raw, BPS_DECIMALS)
}

/// Convert a fixed-point integer with `decimals` fractional digits to f64.
///
/// Integer and fractional parts are converted separately so values that are
/// exactly representable (1.5, 2500.0) come out exact.
pub fn fixed_to_f64(raw: U256, decimals: u8) -> f64 {
    debug_assert!(decimals <= 38, "fractional part must fit in u128");
    let scale = U256::from(10u64).pow(U256::from(decimals));
    let whole = raw / scale;
    let frac = raw % scale;
    u256_to_f64(whole) + frac.to::<u128>() as f64 / 10f64.powi(decimals as i32)
}

/// Lossy U256 to f64 conversion over all four limbs.
#[inline]
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}
