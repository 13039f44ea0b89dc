//! Execution substrate for forwarded calls.
//!
//! The forwarding engine never needs to know the shape of the call it
//! relays: it hands a `ForwardCall` to an execution implementation and gets
//! back whether the callee accepted it and what it returned. This module
//! defines that capability and the service wrapping it.

use async_trait::async_trait;
use forwarder_types::{CallResult, ConfigSchema, ForwardCall, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod memory;
}

/// Errors that can occur while performing a forwarded call.
///
/// These describe failures of the substrate itself. A callee that rejects a
/// call is not an error; it yields an unsuccessful `CallResult`.
#[derive(Debug, Error)]
pub enum ExecutionError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when the implementation is misconfigured.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for execution implementations.
#[async_trait]
pub trait ExecutionInterface: Send + Sync {
	/// Returns the configuration schema for this execution implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Performs `call` and reports the callee's verdict and return data.
	async fn execute(&self, call: &ForwardCall) -> Result<CallResult, ExecutionError>;
}

/// Type alias for execution factory functions.
pub type ExecutionFactory =
	fn(&toml::Value) -> Result<Box<dyn ExecutionInterface>, ExecutionError>;

/// Registry trait for execution implementations.
pub trait ExecutionRegistry: ImplementationRegistry<Factory = ExecutionFactory> {}

/// Get all registered execution implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ExecutionFactory)> {
	use implementations::{evm, memory};

	vec![
		(evm::alloy::Registry::NAME, evm::alloy::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Service that performs forwarded calls through one implementation.
pub struct ExecutionService {
	implementation: Box<dyn ExecutionInterface>,
}

impl ExecutionService {
	/// Creates a new ExecutionService with the specified implementation.
	pub fn new(implementation: Box<dyn ExecutionInterface>) -> Self {
		Self { implementation }
	}

	/// Performs the call, folding substrate errors into a failed result.
	///
	/// Once a request's nonce has been consumed its call counts as attempted
	/// whatever happens, so callers see one uniform result type.
	pub async fn execute(&self, call: &ForwardCall) -> CallResult {
		match self.implementation.execute(call).await {
			Ok(result) => result,
			Err(e) => {
				tracing::warn!(to = %call.to, error = %e, "Execution substrate failed");
				CallResult::failure(e.to_string().into_bytes())
			},
		}
	}
}
