//! Account management for the forwarder.
//!
//! The forwarding engine itself only verifies signatures. Accounts are the
//! other side of that exchange: they hold a key and produce the signatures
//! that authorise requests, co-sign submissions as a relayer, or prove the
//! owner's identity when administering operators from the command line.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use forwarder_types::{
	hash_forward_request, ConfigSchema, Domain, ForwardRequest, ImplementationRegistry,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Trait defining the interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the address associated with this account.
	fn address(&self) -> Address;

	/// Signs a 32-byte digest, returning a 65-byte `r || s || v` signature.
	async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that manages account operations.
pub struct AccountService {
	/// The underlying account implementation.
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	/// Creates a new AccountService with the specified implementation.
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub fn address(&self) -> Address {
		self.implementation.address()
	}

	/// Signs a raw digest.
	pub async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError> {
		self.implementation.sign_hash(hash).await
	}

	/// Signs the EIP-712 digest of `request` under `domain`.
	///
	/// Used by the authorising party to sign its own request and by a relayer
	/// to co-sign a request it submits.
	pub async fn sign_request(
		&self,
		domain: &Domain,
		request: &ForwardRequest,
	) -> Result<Bytes, AccountError> {
		self.sign_hash(&hash_forward_request(domain, request)).await
	}
}
