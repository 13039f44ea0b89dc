//! Per-identity replay protection.
//!
//! Every identity has a counter that starts at zero. A request is accepted
//! only if it carries exactly the current value, which is then incremented
//! by one. Accepted nonces for an identity are therefore 0, 1, 2, ... with
//! no gaps and no reuse.

use alloy_primitives::{Address, U256};
use forwarder_storage::StorageService;
use forwarder_types::{address_key, StorageKey};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors that can occur while reading or consuming nonces.
#[derive(Debug, Error)]
pub enum NonceError {
	#[error("Nonce mismatch: expected {expected}, provided {provided}")]
	NonceMismatch { expected: U256, provided: U256 },
	#[error("Nonce space exhausted for {0}")]
	Exhausted(Address),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Sequential nonce counters kept in the storage service.
pub struct NonceRegistry {
	storage: Arc<StorageService>,
	/// Serializes consumers within this process.
	lock: Mutex<()>,
}

impl NonceRegistry {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			lock: Mutex::new(()),
		}
	}

	/// Next nonce `identity` must use. Unseen identities start at zero.
	pub async fn current_nonce(&self, identity: &Address) -> Result<U256, NonceError> {
		let stored: Option<U256> = self
			.storage
			.retrieve_optional(StorageKey::Nonces, &address_key(identity))
			.await
			.map_err(|e| NonceError::Storage(e.to_string()))?;
		Ok(stored.unwrap_or_default())
	}

	/// Consumes `provided` if it is the current nonce of `identity`.
	///
	/// Returns the new current nonce. On mismatch the counter is unchanged.
	/// The increment is a compare-and-swap against the value read, so a
	/// consumer in another process sharing the storage cannot take the same
	/// value.
	pub async fn consume_if_matches(
		&self,
		identity: &Address,
		provided: U256,
	) -> Result<U256, NonceError> {
		let _guard = self.lock.lock().await;
		let id = address_key(identity);

		let stored: Option<U256> = self
			.storage
			.retrieve_optional(StorageKey::Nonces, &id)
			.await
			.map_err(|e| NonceError::Storage(e.to_string()))?;
		let expected = stored.unwrap_or_default();
		if expected != provided {
			return Err(NonceError::NonceMismatch { expected, provided });
		}

		let next = expected
			.checked_add(U256::from(1))
			.ok_or(NonceError::Exhausted(*identity))?;
		let swapped = self
			.storage
			.compare_and_swap(StorageKey::Nonces, &id, stored.as_ref(), &next)
			.await
			.map_err(|e| NonceError::Storage(e.to_string()))?;
		if !swapped {
			// Consumed elsewhere between our read and write
			let expected = self.current_nonce(identity).await?;
			return Err(NonceError::NonceMismatch { expected, provided });
		}

		tracing::debug!(identity = %identity, nonce = %next, "Nonce consumed");
		Ok(next)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use forwarder_storage::implementations::memory::MemoryStorage;

	fn registry() -> NonceRegistry {
		NonceRegistry::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[tokio::test]
	async fn test_unseen_identity_starts_at_zero() {
		let nonces = registry();
		assert_eq!(
			nonces.current_nonce(&Address::repeat_byte(1)).await.unwrap(),
			U256::ZERO
		);
	}

	#[tokio::test]
	async fn test_accepts_only_sequential_values() {
		let nonces = registry();
		let identity = Address::repeat_byte(1);

		for expected in 0..3u64 {
			let next = nonces
				.consume_if_matches(&identity, U256::from(expected))
				.await
				.unwrap();
			assert_eq!(next, U256::from(expected + 1));
		}

		// Replay of an old value and a skip ahead both fail.
		for provided in [1u64, 4] {
			let err = nonces
				.consume_if_matches(&identity, U256::from(provided))
				.await
				.unwrap_err();
			assert!(matches!(
				err,
				NonceError::NonceMismatch { expected, .. } if expected == U256::from(3)
			));
		}
		assert_eq!(nonces.current_nonce(&identity).await.unwrap(), U256::from(3));
	}

	#[tokio::test]
	async fn test_identities_are_independent() {
		let nonces = registry();
		let a = Address::repeat_byte(1);
		let b = Address::repeat_byte(2);

		nonces.consume_if_matches(&a, U256::ZERO).await.unwrap();
		assert_eq!(nonces.current_nonce(&b).await.unwrap(), U256::ZERO);
		assert!(nonces.consume_if_matches(&b, U256::ZERO).await.is_ok());
	}

	#[tokio::test]
	async fn test_concurrent_consumers_of_same_value() {
		let nonces = Arc::new(registry());
		let identity = Address::repeat_byte(7);

		let mut handles = Vec::new();
		for _ in 0..8 {
			let nonces = nonces.clone();
			handles.push(tokio::spawn(async move {
				nonces.consume_if_matches(&identity, U256::ZERO).await
			}));
		}

		let mut accepted = 0;
		for handle in handles {
			if handle.await.unwrap().is_ok() {
				accepted += 1;
			}
		}
		assert_eq!(accepted, 1);
		assert_eq!(nonces.current_nonce(&identity).await.unwrap(), U256::from(1));
	}

	#[tokio::test]
	async fn test_registries_sharing_file_storage() {
		use forwarder_storage::implementations::file::FileStorage;

		let temp_dir = tempfile::TempDir::new().unwrap();
		let open = || {
			NonceRegistry::new(Arc::new(StorageService::new(Box::new(
				FileStorage::open(temp_dir.path()).unwrap(),
			))))
		};
		let first = open();
		let second = open();
		let identity = Address::repeat_byte(9);

		assert_eq!(
			first.consume_if_matches(&identity, U256::ZERO).await.unwrap(),
			U256::from(1)
		);
		let err = second
			.consume_if_matches(&identity, U256::ZERO)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			NonceError::NonceMismatch { expected, .. } if expected == U256::from(1)
		));
		assert_eq!(
			second.consume_if_matches(&identity, U256::from(1)).await.unwrap(),
			U256::from(2)
		);
		assert_eq!(first.current_nonce(&identity).await.unwrap(), U256::from(2));
	}
}
