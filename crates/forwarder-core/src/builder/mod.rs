//! Builder pattern for constructing forwarding engines.
//!
//! Provides a flexible way to compose a ForwardingEngine from pluggable
//! storage and execution implementations using factory functions.

use crate::engine::{event_bus::EventBus, ForwardingEngine};
use crate::nonce::NonceRegistry;
use crate::operator::OperatorRegistry;
use crate::verifier::{EcdsaVerifier, SignatureVerifier};
use forwarder_config::Config;
use forwarder_execution::{ExecutionError, ExecutionInterface, ExecutionService};
use forwarder_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Container for all factory functions needed to build a ForwardingEngine.
///
/// Each factory takes the implementation's TOML table and returns the
/// corresponding implementation.
pub struct ForwarderFactories<SF, EF> {
	pub storage_factories: HashMap<String, SF>,
	pub execution_factories: HashMap<String, EF>,
}

/// Builder for constructing a ForwardingEngine with pluggable implementations.
pub struct ForwarderBuilder {
	config: Config,
	verifier: Arc<dyn SignatureVerifier>,
}

impl ForwarderBuilder {
	/// Creates a new ForwarderBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			verifier: Arc::new(EcdsaVerifier::new()),
		}
	}

	/// Replaces the default secp256k1 verifier.
	pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
		self.verifier = verifier;
		self
	}

	/// Builds the ForwardingEngine using factories for each component type.
	pub async fn build<SF, EF>(
		self,
		factories: ForwarderFactories<SF, EF>,
	) -> Result<ForwardingEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		EF: Fn(&toml::Value) -> Result<Box<dyn ExecutionInterface>, ExecutionError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Create execution implementations
		let mut execution_impls = HashMap::new();
		for (name, config) in &self.config.execution.implementations {
			if let Some(factory) = factories.execution_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						execution_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.execution.primary == name;
						tracing::info!(component = "execution", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "execution",
							implementation = %name,
							error = %e,
							"Failed to create execution implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create execution implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_execution = &self.config.execution.primary;
		let execution_backend = execution_impls.remove(primary_execution).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary execution '{}' failed to load or has invalid configuration",
				primary_execution
			))
		})?;
		let execution = Arc::new(ExecutionService::new(execution_backend));

		let domain = self
			.config
			.domain()
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		let owner = self
			.config
			.owner()
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		let nonces = Arc::new(NonceRegistry::new(storage.clone()));
		let operators = Arc::new(OperatorRegistry::new(owner, storage));

		// Seed operators listed in configuration, once per identity
		let configured = self
			.config
			.operators()
			.map_err(|e| BuilderError::Config(e.to_string()))?;
		let seeded = operators
			.seed(&configured)
			.await
			.map_err(|e| BuilderError::Storage(e.to_string()))?;

		tracing::info!(
			forwarder_id = %self.config.forwarder.id,
			owner = %owner,
			chain_id = domain.chain_id,
			verifying_contract = %domain.verifying_contract,
			seeded_operators = seeded,
			"Forwarder initialized"
		);

		Ok(ForwardingEngine::new(
			domain,
			self.config.forwarder.revert_on_failure,
			self.verifier,
			nonces,
			operators,
			execution,
			EventBus::new(1000),
		))
	}
}
