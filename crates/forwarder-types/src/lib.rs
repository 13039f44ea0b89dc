//! Common types for the signature-authenticated forwarder.
//!
//! This crate defines the data types shared by every forwarder component:
//! requests and domains, the EIP-712 hashing that binds them together,
//! events, API bodies and configuration validation primitives.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Events published on the engine's event bus.
pub mod events;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Forward requests, domains and execution results.
pub mod request;
/// Secret string type for private keys.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Hashing and parsing utilities.
pub mod utils;
/// Configuration validation types.
pub mod validation;

pub use api::*;
pub use events::*;
pub use registry::ImplementationRegistry;
pub use request::*;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{
	address_key, hash_forward_request, parse_address, parse_hex_bytes, parse_quantity, truncate_id,
};
pub use validation::*;

pub use alloy_primitives::{Address, Bytes, B256, U256};
