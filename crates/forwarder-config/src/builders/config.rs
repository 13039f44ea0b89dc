//! Configuration builder for creating test and development configurations.
//!
//! Produces a `Config` backed by in-memory storage and execution, with the
//! well-known development account as owner unless told otherwise.

use crate::{
	ApiConfig, Config, DomainConfig, ExecutionConfig, ForwarderConfig, StorageConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	forwarder_id: String,
	owner: String,
	operators: Vec<String>,
	revert_on_failure: bool,
	chain_id: u64,
	verifying_contract: String,
	execution: toml::Value,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			forwarder_id: "test-forwarder".to_string(),
			owner: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
			operators: Vec::new(),
			revert_on_failure: false,
			chain_id: 31337,
			verifying_contract: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
			execution: toml::Value::Table(toml::map::Map::new()),
			api: None,
		}
	}

	pub fn forwarder_id(mut self, id: impl Into<String>) -> Self {
		self.forwarder_id = id.into();
		self
	}

	pub fn owner(mut self, owner: impl Into<String>) -> Self {
		self.owner = owner.into();
		self
	}

	/// Adds an operator seeded at startup.
	pub fn operator(mut self, operator: impl Into<String>) -> Self {
		self.operators.push(operator.into());
		self
	}

	pub fn revert_on_failure(mut self, revert: bool) -> Self {
		self.revert_on_failure = revert;
		self
	}

	pub fn chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = chain_id;
		self
	}

	pub fn verifying_contract(mut self, address: impl Into<String>) -> Self {
		self.verifying_contract = address.into();
		self
	}

	/// Sets the table passed to the memory execution implementation.
	pub fn memory_execution(mut self, config: toml::Value) -> Self {
		self.execution = config;
		self
	}

	/// Sets the API configuration.
	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let empty = || toml::Value::Table(toml::map::Map::new());
		Config {
			forwarder: ForwarderConfig {
				id: self.forwarder_id,
				owner: self.owner,
				revert_on_failure: self.revert_on_failure,
				operators: self.operators,
			},
			domain: DomainConfig {
				name: forwarder_types::Domain::DEFAULT_NAME.to_string(),
				version: forwarder_types::Domain::DEFAULT_VERSION.to_string(),
				chain_id: self.chain_id,
				verifying_contract: self.verifying_contract,
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), empty())]),
			},
			execution: ExecutionConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), self.execution)]),
			},
			api: self.api,
		}
	}
}
