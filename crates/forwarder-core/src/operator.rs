//! Owner-administered set of relaying operators.
//!
//! Only registered operators may submit requests to the engine. The owner is
//! fixed at construction and administers membership without needing to be a
//! member itself.

use alloy_primitives::Address;
use forwarder_storage::StorageService;
use forwarder_types::{address_key, parse_address, StorageKey};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Meta entry listing the identities already seeded from configuration.
const SEEDED_MARKER: &str = "operators_seeded";

/// Errors that can occur while querying or administering operators.
#[derive(Debug, Error)]
pub enum OperatorError {
	#[error("Unauthorized: {caller} is not the owner")]
	Unauthorized { caller: Address },
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Operator membership kept in the storage service.
pub struct OperatorRegistry {
	owner: Address,
	storage: Arc<StorageService>,
	lock: Mutex<()>,
}

impl OperatorRegistry {
	pub fn new(owner: Address, storage: Arc<StorageService>) -> Self {
		Self {
			owner,
			storage,
			lock: Mutex::new(()),
		}
	}

	pub fn owner(&self) -> Address {
		self.owner
	}

	/// Whether `identity` may submit requests.
	pub async fn is_authorized(&self, identity: &Address) -> Result<bool, OperatorError> {
		self.storage
			.exists(StorageKey::Operators, &address_key(identity))
			.await
			.map_err(|e| OperatorError::Storage(e.to_string()))
	}

	/// Admits `identity`. Returns whether membership changed.
	pub async fn add_operator(
		&self,
		caller: &Address,
		identity: &Address,
	) -> Result<bool, OperatorError> {
		self.ensure_owner(caller)?;
		let _guard = self.lock.lock().await;

		if self.is_authorized(identity).await? {
			return Ok(false);
		}
		self.storage
			.store(StorageKey::Operators, &address_key(identity), identity)
			.await
			.map_err(|e| OperatorError::Storage(e.to_string()))?;

		tracing::debug!(operator = %identity, "Operator added");
		Ok(true)
	}

	/// Revokes `identity`. Returns whether membership changed.
	pub async fn remove_operator(
		&self,
		caller: &Address,
		identity: &Address,
	) -> Result<bool, OperatorError> {
		self.ensure_owner(caller)?;
		let _guard = self.lock.lock().await;

		if !self.is_authorized(identity).await? {
			return Ok(false);
		}
		self.storage
			.remove(StorageKey::Operators, &address_key(identity))
			.await
			.map_err(|e| OperatorError::Storage(e.to_string()))?;

		tracing::debug!(operator = %identity, "Operator removed");
		Ok(true)
	}

	/// Admits each configured operator the first time it appears.
	///
	/// Identities seeded once are remembered, so a later removal by the
	/// owner survives restarts with the same configuration. Returns how many
	/// operators were admitted.
	pub async fn seed(&self, configured: &[Address]) -> Result<usize, OperatorError> {
		let mut seeded: Vec<Address> = self
			.storage
			.retrieve_optional(StorageKey::Meta, SEEDED_MARKER)
			.await
			.map_err(|e| OperatorError::Storage(e.to_string()))?
			.unwrap_or_default();

		let fresh: Vec<Address> = configured
			.iter()
			.filter(|identity| !seeded.contains(identity))
			.copied()
			.collect();
		if fresh.is_empty() {
			return Ok(0);
		}

		let mut admitted = 0;
		for identity in &fresh {
			if self.add_operator(&self.owner, identity).await? {
				admitted += 1;
			}
		}
		seeded.extend(fresh);
		self.storage
			.store(StorageKey::Meta, SEEDED_MARKER, &seeded)
			.await
			.map_err(|e| OperatorError::Storage(e.to_string()))?;

		tracing::debug!(admitted, "Configured operators seeded");
		Ok(admitted)
	}

	/// All current operators, sorted.
	pub async fn operators(&self) -> Result<Vec<Address>, OperatorError> {
		let ids = self
			.storage
			.list(StorageKey::Operators)
			.await
			.map_err(|e| OperatorError::Storage(e.to_string()))?;
		ids.iter()
			.map(|id| parse_address(id).map_err(|e| OperatorError::Storage(e.to_string())))
			.collect()
	}

	fn ensure_owner(&self, caller: &Address) -> Result<(), OperatorError> {
		if *caller != self.owner {
			return Err(OperatorError::Unauthorized { caller: *caller });
		}
		Ok(())
	}
}
