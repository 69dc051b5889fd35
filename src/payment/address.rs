//! Receiving-address validation and EIP-55 checksumming.

use crate::error::PaymentError;
use sha3::{Digest, Keccak256};

/// Whether `addr` is a `0x`-prefixed 20-byte hex address (any case).
pub fn is_valid(addr: &str) -> bool {
    addr.starts_with("0x") && addr.len() == 42 && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate an address and return its checksummed form.
///
/// Mixed-case input must already carry a correct checksum.
pub fn normalize(addr: &str) -> Result<String, PaymentError> {
    let addr = addr.trim();
    if !is_valid(addr) {
        return Err(PaymentError::InvalidAddress(addr.to_string()));
    }

    let body = &addr[2..];
    let checksummed = checksum_address(addr);
    let mixed_case =
        body.chars().any(|c| c.is_ascii_uppercase()) && body.chars().any(|c| c.is_ascii_lowercase());
    if mixed_case && checksummed != addr {
        return Err(PaymentError::InvalidAddress(format!("{addr} (bad checksum)")));
    }
    Ok(checksummed)
}

/// EIP-55 checksum an Ethereum address.
pub fn checksum_address(address: &str) -> String {
    let addr = address.strip_prefix("0x").unwrap_or(address).to_lowercase();
    let hash = Keccak256::digest(addr.as_bytes());
    let hash_hex = hex::encode(hash);

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");

    for (i, c) in addr.chars().enumerate() {
        if c.is_ascii_alphabetic() {
            let nibble = u8::from_str_radix(&hash_hex[i..i + 1], 16).unwrap_or(0);
            if nibble >= 8 {
                checksummed.push(c.to_ascii_uppercase());
            } else {
                checksummed.push(c);
            }
        } else {
            checksummed.push(c);
        }
    }

    checksummed
}
