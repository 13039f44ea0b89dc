//! In-memory execution ledger.
//!
//! Keeps native balances per address and moves `value` from the call's
//! sender to its target. Targets can be marked as rejecting so that callers
//! can observe the behaviour of a reverting callee. Intended for development
//! and tests.

use crate::{ExecutionError, ExecutionInterface};
use async_trait::async_trait;
use forwarder_types::utils::parse_quantity;
use forwarder_types::{
	parse_address, Address, CallResult, ConfigSchema, Field, FieldType, ForwardCall, Schema,
	ValidationError, U256,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Ledger {
	balances: HashMap<Address, U256>,
	rejecting: HashSet<Address>,
	calls: Vec<ForwardCall>,
}

/// In-memory execution implementation.
///
/// Clones share the same ledger, so a handle kept by the caller observes
/// every call made through the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryExecution {
	ledger: Arc<RwLock<Ledger>>,
}

impl MemoryExecution {
	/// Creates an empty ledger.
	pub fn new() -> Self {
		Self::default()
	}

	/// Credits `amount` to `address` before the ledger is shared.
	pub fn with_balance(self, address: Address, amount: U256) -> Self {
		if let Ok(mut ledger) = self.ledger.try_write() {
			*ledger.balances.entry(address).or_default() += amount;
		}
		self
	}

	/// Marks `target` as a callee that rejects every call.
	pub fn with_rejecting(self, target: Address) -> Self {
		if let Ok(mut ledger) = self.ledger.try_write() {
			ledger.rejecting.insert(target);
		}
		self
	}

	pub async fn reject_calls_to(&self, target: Address) {
		self.ledger.write().await.rejecting.insert(target);
	}

	pub async fn balance_of(&self, address: &Address) -> U256 {
		self.ledger
			.read()
			.await
			.balances
			.get(address)
			.copied()
			.unwrap_or_default()
	}

	/// Every call attempted so far, in order.
	pub async fn calls(&self) -> Vec<ForwardCall> {
		self.ledger.read().await.calls.clone()
	}
}

#[async_trait]
impl ExecutionInterface for MemoryExecution {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryExecutionSchema)
	}

	async fn execute(&self, call: &ForwardCall) -> Result<CallResult, ExecutionError> {
		let mut ledger = self.ledger.write().await;
		ledger.calls.push(call.clone());

		if ledger.rejecting.contains(&call.to) {
			tracing::debug!(to = %call.to, "Target rejected call");
			return Ok(CallResult::failure(b"call rejected by target".to_vec()));
		}

		if !call.value.is_zero() {
			let available = ledger.balances.get(&call.sender).copied().unwrap_or_default();
			if available < call.value {
				return Ok(CallResult::failure(b"insufficient balance".to_vec()));
			}
			ledger.balances.insert(call.sender, available - call.value);
			*ledger.balances.entry(call.to).or_default() += call.value;
		}

		Ok(CallResult::success(call.data.clone()))
	}
}

/// Configuration schema for MemoryExecution.
pub struct MemoryExecutionSchema;

impl ConfigSchema for MemoryExecutionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("balances", FieldType::AddressMap).with_validator(|value| {
					let table = value.as_table().ok_or("balances must be a table")?;
					for (address, amount) in table {
						let amount = amount.as_str().unwrap_or_default();
						parse_quantity(amount)
							.map_err(|e| format!("balance of {}: {}", address, e))?;
					}
					Ok(())
				}),
				Field::new("rejecting", FieldType::Array(Box::new(FieldType::Address))),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a memory execution ledger from configuration.
///
/// Configuration parameters:
/// - `balances`: table of address to initial balance (decimal or 0x hex)
/// - `rejecting`: addresses whose calls always fail
pub fn create_execution(
	config: &toml::Value,
) -> Result<Box<dyn ExecutionInterface>, ExecutionError> {
	MemoryExecutionSchema
		.validate(config)
		.map_err(|e| ExecutionError::Configuration(format!("Invalid configuration: {}", e)))?;

	let mut execution = MemoryExecution::new();

	if let Some(balances) = config.get("balances").and_then(|v| v.as_table()) {
		for (address, amount) in balances {
			let address =
				parse_address(address).map_err(|e| ExecutionError::Configuration(e.to_string()))?;
			let amount = parse_quantity(amount.as_str().unwrap_or_default())
				.map_err(|e| ExecutionError::Configuration(e.to_string()))?;
			execution = execution.with_balance(address, amount);
		}
	}

	if let Some(rejecting) = config.get("rejecting").and_then(|v| v.as_array()) {
		for target in rejecting.iter().filter_map(|v| v.as_str()) {
			let target =
				parse_address(target).map_err(|e| ExecutionError::Configuration(e.to_string()))?;
			execution = execution.with_rejecting(target);
		}
	}

	Ok(Box::new(execution))
}

/// Registry for the memory execution implementation.
pub struct Registry;

impl forwarder_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::ExecutionFactory;

	fn factory() -> Self::Factory {
		create_execution
	}
}

impl crate::ExecutionRegistry for Registry {}
