//! Dynamic factory registry for forwarder implementations.
//!
//! Every implementation crate advertises its factories through
//! `get_all_implementations`. The registry collects them once so that the
//! configuration alone decides which backends are instantiated.

use forwarder_account::{AccountError, AccountFactory, AccountInterface, AccountService};
use forwarder_config::Config;
use forwarder_core::{ForwarderBuilder, ForwarderFactories, ForwardingEngine};
use forwarder_execution::ExecutionFactory;
use forwarder_storage::StorageFactory;
use forwarder_types::SecretString;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Name of the account implementation used for keys passed on the command line.
const LOCAL_ACCOUNT: &str = "local";

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub execution: HashMap<String, ExecutionFactory>,
	pub account: HashMap<String, AccountFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			execution: HashMap::new(),
			account: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_execution(&mut self, name: impl Into<String>, factory: ExecutionFactory) {
		self.execution.insert(name.into(), factory);
	}

	pub fn register_account(&mut self, name: impl Into<String>, factory: AccountFactory) {
		self.account.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Get the global factory registry, populating it on first use
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in forwarder_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in forwarder_execution::get_all_implementations() {
			tracing::debug!("Registering execution implementation: {}", name);
			registry.register_execution(name, factory);
		}

		for (name, factory) in forwarder_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.register_account(name, factory);
		}

		registry
	})
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Build the forwarding engine using the registry and config
pub async fn build_forwarder_from_config(
	config: Config,
) -> Result<ForwardingEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let execution_factories = build_factories!(
		registry,
		config.execution.implementations,
		execution,
		"execution"
	);

	let factories = ForwarderFactories {
		storage_factories,
		execution_factories,
	};

	Ok(ForwarderBuilder::new(config).build(factories).await?)
}

/// Loads a local account from a hex private key.
pub fn load_account(private_key: &SecretString) -> Result<AccountService, AccountError> {
	let factory = get_registry().account.get(LOCAL_ACCOUNT).ok_or_else(|| {
		AccountError::InvalidKey(format!("account implementation '{}' missing", LOCAL_ACCOUNT))
	})?;

	let mut table = toml::map::Map::new();
	table.insert(
		"private_key".to_string(),
		toml::Value::String(private_key.expose_secret().to_string()),
	);
	let account: Box<dyn AccountInterface> = factory(&toml::Value::Table(table))?;
	Ok(AccountService::new(account))
}
