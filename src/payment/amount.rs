//! Decimal token amounts to base units.

use crate::error::PaymentError;

/// Base-unit decimals for ETH (wei).
pub const ETHER_DECIMALS: u32 = 18;

/// Parse a decimal ether amount ("0.01") into wei.
pub fn parse_ether(amount: &str) -> Result<u128, PaymentError> {
    parse_units(amount, ETHER_DECIMALS)
}

/// Parse a non-negative decimal string into an integer of `decimals` base units.
pub fn parse_units(amount: &str, decimals: u32) -> Result<u128, PaymentError> {
    let invalid = |why: &str| PaymentError::InvalidAmount(format!("'{amount}': {why}"));

    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }
    if trimmed.starts_with('-') {
        return Err(invalid("negative"));
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a decimal number"));
    }
    if frac.len() > decimals as usize {
        return Err(invalid("too many decimal places"));
    }

    let scale = 10u128
        .checked_pow(decimals)
        .ok_or_else(|| invalid("unsupported precision"))?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| invalid("too large"))?
    };
    let frac_units = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = decimals as usize);
        padded.parse::<u128>().map_err(|_| invalid("too large"))?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(|| invalid("too large"))
}

/// Render a fee the way visitors see it ("0.01").
pub fn format_fee(fee: f64) -> String {
    fee.to_string()
}
