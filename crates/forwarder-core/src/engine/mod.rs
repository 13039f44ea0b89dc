//! Forwarding engine that validates and executes signed requests.
//!
//! A request is forwarded only once the submitter is a registered operator,
//! the signature recovers to `request.from` under this engine's domain and the
//! request carries the next nonce of `from`. Any failure in those checks
//! leaves every counter untouched. Once the nonce is consumed the call is
//! attempted and a `Forwarded` event is published whatever the callee does.

pub mod event_bus;

use crate::nonce::{NonceError, NonceRegistry};
use crate::operator::{OperatorError, OperatorRegistry};
use crate::verifier::{SignatureError, SignatureVerifier};
use alloy_primitives::{Address, Bytes, B256, U256};
use event_bus::EventBus;
use forwarder_execution::ExecutionService;
use forwarder_types::utils::compute_domain_hash;
use forwarder_types::{
	hash_forward_request, Domain, ExecutionOutcome, ForwardRequest, ForwardedEvent,
	ForwarderEvent,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum ForwardError {
	/// The submitter is not an operator, or a non-owner tried to administer.
	#[error("Forwarder: sender unauthorized")]
	Unauthorized,
	#[error("Forwarder: invalid signature")]
	InvalidSignature(#[source] SignatureError),
	#[error("Forwarder: nonce mismatch (expected {expected}, provided {provided})")]
	NonceMismatch { expected: U256, provided: U256 },
	/// The forwarded call failed and the engine treats that as fatal.
	///
	/// The nonce has been consumed; `new_nonce` is its current value.
	#[error("Forwarder: execution reverted")]
	ExecutionReverted { return_data: Bytes, new_nonce: U256 },
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<NonceError> for ForwardError {
	fn from(err: NonceError) -> Self {
		match err {
			NonceError::NonceMismatch { expected, provided } => {
				ForwardError::NonceMismatch { expected, provided }
			},
			other => ForwardError::Storage(other.to_string()),
		}
	}
}

impl From<OperatorError> for ForwardError {
	fn from(err: OperatorError) -> Self {
		match err {
			OperatorError::Unauthorized { .. } => ForwardError::Unauthorized,
			OperatorError::Storage(message) => ForwardError::Storage(message),
		}
	}
}

/// Signature-authenticated request forwarder.
pub struct ForwardingEngine {
	domain: Domain,
	domain_separator: B256,
	revert_on_failure: bool,
	verifier: Arc<dyn SignatureVerifier>,
	nonces: Arc<NonceRegistry>,
	operators: Arc<OperatorRegistry>,
	execution: Arc<ExecutionService>,
	event_bus: EventBus,
	/// Held for the whole of `forward` and operator administration, so no
	/// two state-changing operations interleave.
	lock: Mutex<()>,
}

impl ForwardingEngine {
	pub fn new(
		domain: Domain,
		revert_on_failure: bool,
		verifier: Arc<dyn SignatureVerifier>,
		nonces: Arc<NonceRegistry>,
		operators: Arc<OperatorRegistry>,
		execution: Arc<ExecutionService>,
		event_bus: EventBus,
	) -> Self {
		let domain_separator = compute_domain_hash(&domain);
		Self {
			domain,
			domain_separator,
			revert_on_failure,
			verifier,
			nonces,
			operators,
			execution,
			event_bus,
			lock: Mutex::new(()),
		}
	}

	/// Validates `request` and, if it passes, executes it on behalf of `from`.
	pub async fn forward(
		&self,
		submitter: &Address,
		request: &ForwardRequest,
		signature: &[u8],
	) -> Result<ExecutionOutcome, ForwardError> {
		let _guard = self.lock.lock().await;

		let (digest, new_nonce) = match self.validate(submitter, request, signature).await {
			Ok(validated) => validated,
			Err(e) => {
				tracing::warn!(
					submitter = %submitter,
					from = %request.from,
					nonce = %request.nonce,
					error = %e,
					"Rejected forward request"
				);
				self.event_bus
					.publish(ForwarderEvent::Rejected {
						from: request.from,
						nonce: request.nonce,
						reason: e.to_string(),
					})
					.ok();
				return Err(e);
			},
		};

		let call = request.to_call(self.domain.verifying_contract);
		let result = self.execution.execute(&call).await;

		tracing::info!(
			submitter = %submitter,
			from = %request.from,
			to = %request.to,
			nonce = %request.nonce,
			success = result.success,
			"Forwarded"
		);
		self.event_bus
			.publish(ForwarderEvent::Forwarded(ForwardedEvent {
				from: request.from,
				to: request.to,
				value: request.value,
				data: request.data.clone(),
				nonce: new_nonce,
				success: result.success,
			}))
			.ok();

		if !result.success && self.revert_on_failure {
			return Err(ForwardError::ExecutionReverted {
				return_data: result.return_data,
				new_nonce,
			});
		}

		Ok(ExecutionOutcome {
			digest,
			success: result.success,
			return_data: result.return_data,
			new_nonce,
		})
	}

	/// Runs every check and consumes the nonce last, so a failure at any
	/// step leaves state unchanged.
	async fn validate(
		&self,
		submitter: &Address,
		request: &ForwardRequest,
		signature: &[u8],
	) -> Result<(B256, U256), ForwardError> {
		if !self.operators.is_authorized(submitter).await? {
			return Err(ForwardError::Unauthorized);
		}

		let digest = self.digest(request);
		self.verifier
			.verify(&digest, signature, &request.from)
			.map_err(ForwardError::InvalidSignature)?;

		let new_nonce = self
			.nonces
			.consume_if_matches(&request.from, request.nonce)
			.await?;
		Ok((digest, new_nonce))
	}

	/// Next nonce `identity` must sign.
	pub async fn get_nonce(&self, identity: &Address) -> Result<U256, ForwardError> {
		Ok(self.nonces.current_nonce(identity).await?)
	}

	pub async fn is_operator(&self, identity: &Address) -> Result<bool, ForwardError> {
		Ok(self.operators.is_authorized(identity).await?)
	}

	pub async fn operators(&self) -> Result<Vec<Address>, ForwardError> {
		Ok(self.operators.operators().await?)
	}

	/// Admits `identity` as an operator. Only the owner may call this.
	pub async fn add_operator(
		&self,
		caller: &Address,
		identity: &Address,
	) -> Result<(), ForwardError> {
		let _guard = self.lock.lock().await;
		if self.operators.add_operator(caller, identity).await? {
			tracing::info!(operator = %identity, "Operator added");
			self.event_bus
				.publish(ForwarderEvent::OperatorAdded {
					operator: *identity,
				})
				.ok();
		}
		Ok(())
	}

	/// Revokes `identity`. Only the owner may call this.
	pub async fn remove_operator(
		&self,
		caller: &Address,
		identity: &Address,
	) -> Result<(), ForwardError> {
		let _guard = self.lock.lock().await;
		if self.operators.remove_operator(caller, identity).await? {
			tracing::info!(operator = %identity, "Operator removed");
			self.event_bus
				.publish(ForwarderEvent::OperatorRemoved {
					operator: *identity,
				})
				.ok();
		}
		Ok(())
	}

	pub fn owner(&self) -> Address {
		self.operators.owner()
	}

	pub fn domain(&self) -> &Domain {
		&self.domain
	}

	pub fn domain_separator(&self) -> B256 {
		self.domain_separator
	}

	/// EIP-712 digest `request.from` must sign for this engine.
	pub fn digest(&self, request: &ForwardRequest) -> B256 {
		hash_forward_request(&self.domain, request)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ForwarderEvent> {
		self.event_bus.subscribe()
	}
}
