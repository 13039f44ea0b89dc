//! Utility functions for hashing and parsing forwarder values.
//!
//! This module provides the EIP-712 hashing used to authenticate forward
//! requests and helpers for parsing addresses, quantities and hex strings
//! supplied through configuration files and the command line.

pub mod eip712;
pub mod parsing;

pub use eip712::{
	compute_domain_hash, compute_final_digest, compute_request_hash, hash_forward_request,
	Eip712AbiEncoder, DOMAIN_TYPE, FORWARD_REQUEST_TYPE,
};
pub use parsing::{
	address_key, parse_address, parse_hex_bytes, parse_quantity, truncate_id, ParseError,
};
