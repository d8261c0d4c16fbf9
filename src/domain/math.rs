//! Fixed-point helpers for WAD (1e18) price math.
//!
//! All price and ratio arithmetic runs on `U256` to avoid floating-point
//! drift; overflow surfaces as a validation error, never a panic.

use crate::error::{RecoupError, Result};
use alloy::primitives::U256;

/// One whole unit in 1e18 fixed point.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Basis-point denominator (100% = 10_000 bps).
pub const BPS_DENOMINATOR: u32 = 10_000;

const BPS_U256: U256 = U256::from_limbs([10_000, 0, 0, 0]);

/// `value * numerator / denominator` with checked multiply and explicit
/// zero-denominator rejection.
pub fn mul_div(value: U256, numerator: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(RecoupError::Validation("division by zero".into()));
    }
    let product = value.checked_mul(numerator).ok_or_else(|| {
        RecoupError::Validation(format!("mul overflow: {} * {}", value, numerator))
    })?;
    Ok(product / denominator)
}

/// Fraction of `amount` expressed in basis points.
pub fn bps_of(amount: U256, bps: u32) -> Result<U256> {
    mul_div(amount, U256::from(bps), BPS_U256)
}

/// Relative gap between a venue price and a reference price, in basis points.
///
/// Saturates at `u64::MAX`; a gap that wide is already far past any
/// actionable threshold.
pub fn divergence_bps(venue_price: U256, reference_price: U256) -> Result<u64> {
    if reference_price.is_zero() {
        return Err(RecoupError::Validation("reference price is zero".into()));
    }
    let gap = if venue_price >= reference_price {
        venue_price - reference_price
    } else {
        reference_price - venue_price
    };
    let bps = mul_div(gap, BPS_U256, reference_price)?;
    Ok(u64::try_from(bps).unwrap_or(u64::MAX))
}

/// Render a WAD amount as a decimal string with four fractional digits.
pub fn format_wad(value: U256) -> String {
    let int = value / WAD;
    let frac = (value % WAD) / U256::from(100_000_000_000_000u64);
    format!("{}.{:04}", int, u64::try_from(frac).unwrap_or(0))
}

/// Parse a decimal string ("2000", "0.5", "2060.25") into a WAD amount.
pub fn parse_wad(s: &str) -> Result<U256> {
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(RecoupError::Validation(format!("invalid decimal: {:?}", s)));
    }
    let int: U256 = if int_part.is_empty() {
        U256::ZERO
    } else {
        int_part
            .parse()
            .map_err(|_| RecoupError::Validation(format!("invalid decimal: {:?}", s)))?
    };
    if frac_part.len() > 18 || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(RecoupError::Validation(format!("invalid decimal: {:?}", s)));
    }
    let mut frac = U256::ZERO;
    if !frac_part.is_empty() {
        let padded = format!("{:0<18}", frac_part);
        frac = padded
            .parse()
            .map_err(|_| RecoupError::Validation(format!("invalid decimal: {:?}", s)))?;
    }
    int.checked_mul(WAD)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| RecoupError::Validation(format!("decimal out of range: {:?}", s)))
}
