//! Storage-related types for the forwarder.

use std::str::FromStr;

/// Storage namespaces for the forwarder's persistent registries.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Per-identity nonce counters
	Nonces,
	/// Operator membership records
	Operators,
	/// One-off markers about the state of the other namespaces
	Meta,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Nonces => "nonces",
			StorageKey::Operators => "operators",
			StorageKey::Meta => "meta",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Nonces, Self::Operators, Self::Meta].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"nonces" => Ok(Self::Nonces),
			"operators" => Ok(Self::Operators),
			"meta" => Ok(Self::Meta),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
