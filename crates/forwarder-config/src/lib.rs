//! Configuration module for the forwarder.
//!
//! This module provides structures and utilities for managing forwarder
//! configuration. It supports loading configuration from TOML files and
//! validates that identities, the signing domain and the selected
//! implementations are properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` in the root file to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)
//! - Only `forwarder`, `domain`, `storage`, `execution` and `api` sections are accepted

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders {
	pub mod config;
}

use forwarder_types::{parse_address, Address, Domain};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the forwarder.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity and behaviour of this forwarder instance.
	pub forwarder: ForwarderConfig,
	/// EIP-712 domain signatures are bound to.
	pub domain: DomainConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the execution substrate.
	pub execution: ExecutionConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the forwarder instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwarderConfig {
	/// Unique identifier for this forwarder instance.
	pub id: String,
	/// Address allowed to administer the operator set.
	pub owner: String,
	/// Report a failed forwarded call as an error instead of an
	/// unsuccessful outcome. The nonce is consumed either way.
	#[serde(default)]
	pub revert_on_failure: bool,
	/// Operators admitted at startup in addition to the stored set.
	#[serde(default)]
	pub operators: Vec<String>,
}

/// EIP-712 domain of the forwarder.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainConfig {
	#[serde(default = "default_domain_name")]
	pub name: String,
	#[serde(default = "default_domain_version")]
	pub version: String,
	pub chain_id: u64,
	/// Address of the forwarder deployment signatures are pinned to.
	pub verifying_contract: String,
}

fn default_domain_name() -> String {
	Domain::DEFAULT_NAME.to_string()
}

fn default_domain_version() -> String {
	Domain::DEFAULT_VERSION.to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the execution substrate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of execution implementation names to their configurations.
	/// Each implementation has its own configuration format stored as raw TOML values.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
	/// Allowed headers for CORS.
	pub allowed_headers: Vec<String>,
	/// Allowed methods for CORS.
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

fn parse_config_address(field: &str, value: &str) -> Result<Address, ConfigError> {
	parse_address(value).map_err(|e| ConfigError::Validation(format!("{}: {}", field, e)))
}

impl Config {
	/// Loads configuration from a file with async environment variable resolution.
	///
	/// This method supports modular configuration through include directives:
	/// - `include = ["file1.toml", "file2.toml"]` - Include specific files
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Parsed owner address.
	pub fn owner(&self) -> Result<Address, ConfigError> {
		parse_config_address("forwarder.owner", &self.forwarder.owner)
	}

	/// Parsed operators seeded at startup.
	pub fn operators(&self) -> Result<Vec<Address>, ConfigError> {
		self.forwarder
			.operators
			.iter()
			.map(|operator| parse_config_address("forwarder.operators", operator))
			.collect()
	}

	/// The signing domain described by the `[domain]` section.
	pub fn domain(&self) -> Result<Domain, ConfigError> {
		Ok(Domain::new(
			self.domain.name.clone(),
			self.domain.version.clone(),
			self.domain.chain_id,
			parse_config_address("domain.verifying_contract", &self.domain.verifying_contract)?,
		))
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Ensures the forwarder ID is not empty
	/// - Checks owner, operator and verifying contract addresses parse
	/// - Rejects an empty domain name or version and a zero chain id
	/// - Verifies each primary implementation is among the configured ones
	fn validate(&self) -> Result<(), ConfigError> {
		if self.forwarder.id.is_empty() {
			return Err(ConfigError::Validation("Forwarder ID cannot be empty".into()));
		}
		self.owner()?;
		self.operators()?;

		if self.domain.name.is_empty() {
			return Err(ConfigError::Validation("Domain name cannot be empty".into()));
		}
		if self.domain.version.is_empty() {
			return Err(ConfigError::Validation("Domain version cannot be empty".into()));
		}
		if self.domain.chain_id == 0 {
			return Err(ConfigError::Validation(
				"Domain chain_id must be greater than 0".into(),
			));
		}
		self.domain()?;

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_primary(
			"execution",
			&self.execution.primary,
			&self.execution.implementations,
		)?;

		if let Some(ref api) = self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
