//! Event types published by the forwarding engine.
//!
//! Events flow through the engine's event bus so that audit and indexing
//! consumers can follow every validated request and every change to the
//! operator set without polling the registries.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all forwarder events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwarderEvent {
	/// A request passed validation and its call was attempted.
	Forwarded(ForwardedEvent),
	/// A request was rejected before any state changed.
	Rejected {
		from: Address,
		nonce: U256,
		reason: String,
	},
	/// The owner admitted a new operator.
	OperatorAdded { operator: Address },
	/// The owner revoked an operator.
	OperatorRemoved { operator: Address },
}

/// Audit record of a validated and attempted forward.
///
/// The record states that the request was accepted and its nonce consumed,
/// not that the inner call succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedEvent {
	pub from: Address,
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
	/// Nonce of `from` after the request was consumed.
	pub nonce: U256,
	/// Whether the forwarded call succeeded.
	pub success: bool,
}
