//! Hex address and hash normalization.
//!
//! Every address and hash that crosses the store boundary is lowercase
//! 0x-prefixed hex, so equality checks and lookups never depend on the
//! caller's casing.

use alloy::primitives::{Address, B256};

use crate::error::IndexerError;

/// Validate a 20-byte hex address and normalize it to lowercase.
pub fn normalize_address(input: &str) -> Result<String, IndexerError> {
    let hex = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| IndexerError::Validation(format!("address '{input}' missing 0x prefix")))?;

    if hex.len() != 40 {
        return Err(IndexerError::Validation(format!(
            "address '{input}' must be 20 bytes of hex"
        )));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IndexerError::Validation(format!(
            "address '{input}' contains non-hex characters"
        )));
    }

    Ok(format!("0x{}", hex.to_ascii_lowercase()))
}

/// Lowercase hex rendering of an on-wire address.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", alloy::hex::encode(address))
}

/// Lowercase hex rendering of a 32-byte hash.
pub fn format_hash(hash: &B256) -> String {
    format!("0x{}", alloy::hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_mixed_case() {
        let addr = normalize_address("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        assert_eq!(addr, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        // Already-lowercase input is unchanged
        assert_eq!(normalize_address(&addr).unwrap(), addr);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize_address("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_err());
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address("0xZZb86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_err());
        assert!(normalize_address("").is_err());
    }

    #[test]
    fn test_format_address_is_lowercase() {
        let addr = Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        let formatted = format_address(&addr);
        assert_eq!(formatted, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        assert_eq!(formatted.len(), 42);
    }
}
