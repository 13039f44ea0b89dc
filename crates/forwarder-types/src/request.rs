//! Request and domain types for signature-authenticated forwarding.
//!
//! A `ForwardRequest` describes a call that `from` authorises someone else to
//! relay on its behalf. The `Domain` pins signatures to one forwarder
//! deployment so they cannot be replayed against another instance or network.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A call authorised by `from`, valid only as the `nonce`-th action of `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
	/// Identity that authorises the call and signs the request.
	pub from: Address,
	/// Target of the forwarded call.
	pub to: Address,
	/// Native value attached to the forwarded call.
	pub value: U256,
	/// Opaque calldata passed to `to`.
	#[serde(default)]
	pub data: Bytes,
	/// Sequence number of this action for `from`.
	pub nonce: U256,
}

impl ForwardRequest {
	/// Builds the call the execution substrate performs for this request.
	///
	/// `sender` is the identity the call originates from, normally the
	/// verifying contract of the forwarder's domain.
	pub fn to_call(&self, sender: Address) -> ForwardCall {
		ForwardCall {
			sender,
			from: self.from,
			to: self.to,
			value: self.value,
			data: self.data.clone(),
		}
	}
}

/// EIP-712 domain binding signatures to a single forwarder instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
	pub verifying_contract: Address,
}

impl Domain {
	/// Default domain name used by the forwarder.
	pub const DEFAULT_NAME: &'static str = "Forwarder";
	/// Default domain version used by the forwarder.
	pub const DEFAULT_VERSION: &'static str = "0.1";

	pub fn new(
		name: impl Into<String>,
		version: impl Into<String>,
		chain_id: u64,
		verifying_contract: Address,
	) -> Self {
		Self {
			name: name.into(),
			version: version.into(),
			chain_id,
			verifying_contract,
		}
	}
}

/// The raw call handed to an execution substrate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardCall {
	/// Identity the call is sent from.
	pub sender: Address,
	/// Identity that authorised the call.
	pub from: Address,
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
}

/// Result of performing a forwarded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
	/// Whether the callee accepted the call.
	pub success: bool,
	/// Bytes returned by the callee, or the revert payload on failure.
	pub return_data: Bytes,
}

impl CallResult {
	pub fn success(return_data: impl Into<Bytes>) -> Self {
		Self {
			success: true,
			return_data: return_data.into(),
		}
	}

	pub fn failure(return_data: impl Into<Bytes>) -> Self {
		Self {
			success: false,
			return_data: return_data.into(),
		}
	}
}

/// Outcome reported to the submitter of a validated and attempted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
	/// EIP-712 digest the request was verified against.
	pub digest: B256,
	/// Whether the forwarded call itself succeeded.
	pub success: bool,
	/// Data returned by the forwarded call.
	pub return_data: Bytes,
	/// Nonce of `from` after this request was consumed.
	pub new_nonce: U256,
}
