//! Parsing helpers for user supplied values.
//!
//! Configuration files and CLI arguments carry addresses, quantities and
//! calldata as strings. These helpers turn them into typed values with error
//! messages that name the offending input.

use alloy_primitives::{Address, Bytes, U256};
use thiserror::Error;

/// Errors produced while parsing user supplied values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("Invalid address '{0}'")]
	Address(String),
	#[error("Invalid quantity '{0}'")]
	Quantity(String),
	#[error("Invalid hex data '{0}'")]
	Hex(String),
}

/// Parses a 0x-prefixed (or bare) 20-byte hex address.
pub fn parse_address(value: &str) -> Result<Address, ParseError> {
	let trimmed = value.trim();
	let hex_part = trimmed
		.strip_prefix("0x")
		.or_else(|| trimmed.strip_prefix("0X"))
		.unwrap_or(trimmed);
	if hex_part.len() != 40 {
		return Err(ParseError::Address(value.to_string()));
	}
	let bytes = hex::decode(hex_part).map_err(|_| ParseError::Address(value.to_string()))?;
	Ok(Address::from_slice(&bytes))
}

/// Parses a decimal or 0x-prefixed hexadecimal 256-bit quantity.
pub fn parse_quantity(value: &str) -> Result<U256, ParseError> {
	let trimmed = value.trim();
	let parsed = match trimmed
		.strip_prefix("0x")
		.or_else(|| trimmed.strip_prefix("0X"))
	{
		Some(hex_part) => U256::from_str_radix(hex_part, 16),
		None => U256::from_str_radix(trimmed, 10),
	};
	parsed.map_err(|_| ParseError::Quantity(value.to_string()))
}

/// Parses hex calldata. An empty string or bare "0x" yields empty bytes.
pub fn parse_hex_bytes(value: &str) -> Result<Bytes, ParseError> {
	let trimmed = value.trim();
	let hex_part = trimmed
		.strip_prefix("0x")
		.or_else(|| trimmed.strip_prefix("0X"))
		.unwrap_or(trimmed);
	hex::decode(hex_part)
		.map(Bytes::from)
		.map_err(|_| ParseError::Hex(value.to_string()))
}

/// Canonical storage id for an address: lowercase hex with 0x prefix.
pub fn address_key(address: &Address) -> String {
	format!("0x{}", hex::encode(address.as_slice()))
}

/// Utility function to truncate a hex string for display purposes.
///
/// Shows only the first 10 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 10 {
		id.to_string()
	} else {
		format!("{}..", &id[..10])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_address() {
		let expected = Address::from_slice(&[
			0x5F, 0xbD, 0xB2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3F,
			0x64, 0x2f, 0x64, 0x18, 0x0a, 0xa3,
		]);
		assert_eq!(
			parse_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap(),
			expected
		);
		assert_eq!(
			parse_address("5fbdb2315678afecb367f032d93f642f64180aa3").unwrap(),
			expected
		);
		assert!(parse_address("0x1234").is_err());
		assert!(parse_address("0xzzbdb2315678afecb367f032d93f642f64180aa3").is_err());
	}

	#[test]
	fn test_parse_quantity() {
		assert_eq!(parse_quantity("0").unwrap(), U256::ZERO);
		assert_eq!(
			parse_quantity("1000000000000000000").unwrap(),
			U256::from(1_000_000_000_000_000_000u128)
		);
		assert_eq!(parse_quantity("0xff").unwrap(), U256::from(255));
		assert!(parse_quantity("-1").is_err());
		assert!(parse_quantity("ten").is_err());
	}

	#[test]
	fn test_parse_hex_bytes() {
		assert!(parse_hex_bytes("0x").unwrap().is_empty());
		assert!(parse_hex_bytes("").unwrap().is_empty());
		assert_eq!(
			parse_hex_bytes("0xdeadbeef").unwrap(),
			Bytes::from(vec![0xde, 0xad, 0xbe, 0xef])
		);
		assert!(parse_hex_bytes("0xabc").is_err());
	}

	#[test]
	fn test_address_key_is_lowercase() {
		let address = parse_address("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap();
		assert_eq!(
			address_key(&address),
			"0x5fbdb2315678afecb367f032d93f642f64180aa3"
		);
	}

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("0x12345678"), "0x12345678");
		assert_eq!(truncate_id("0x1234567890abcdef"), "0x12345678..");
	}
}
