//! Multi-file configuration loading.
//!
//! A root file may list further files under `include`. Every file contributes
//! whole top-level sections. Each section must come from exactly one file,
//! and only the sections the forwarder understands are accepted, so a typo
//! such as `[storgae]` fails loudly instead of falling back to defaults.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Top-level sections a configuration file may define.
const SECTIONS: &[&str] = &["forwarder", "domain", "storage", "execution", "api"];

const INCLUDE_KEY: &str = "include";

/// Assembles a [`Config`] from a root file and the files it includes.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_path: PathBuf,
	/// Canonical paths of files already read.
	visited: HashSet<PathBuf>,
	/// File each section was taken from.
	origins: HashMap<String, PathBuf>,
	merged: toml::Table,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			origins: HashMap::new(),
			merged: toml::Table::new(),
		}
	}

	/// Loads `config_path` and its includes into a validated configuration.
	///
	/// Includes are listed in the root file only. Environment variables are
	/// resolved per file before parsing.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let root = self.resolve_path(config_path)?;
		let mut table = self.read_table(&root).await?;
		let includes = take_includes(&mut table, &root)?;
		self.absorb(&root, table)?;

		for include in includes {
			let path = self.resolve_path(&include)?;
			let table = self.read_table(&path).await?;
			if table.contains_key(INCLUDE_KEY) {
				return Err(ConfigError::Validation(format!(
					"{} cannot include further files; list every include in {}",
					path.display(),
					root.display()
				)));
			}
			self.absorb(&path, table)?;
		}

		let config: Config = toml::Value::Table(std::mem::take(&mut self.merged)).try_into()?;
		config.validate()?;
		Ok(config)
	}

	/// Reads one file, resolving environment variables, into a TOML table.
	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.visited.insert(canonical) {
			return Err(ConfigError::Validation(format!(
				"{} is included more than once",
				path.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		Ok(toml::from_str(&resolve_env_vars(&content)?)?)
	}

	/// Adds the sections of the file at `path` to the merged configuration.
	fn absorb(&mut self, path: &Path, table: toml::Table) -> Result<(), ConfigError> {
		for (section, value) in table {
			if !SECTIONS.contains(&section.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Unknown section [{}] in {}; expected one of: {}",
					section,
					path.display(),
					SECTIONS.join(", ")
				)));
			}
			if !value.is_table() {
				return Err(ConfigError::Validation(format!(
					"[{}] in {} must be a table",
					section,
					path.display()
				)));
			}
			if let Some(first) = self.origins.get(&section) {
				return Err(ConfigError::Validation(format!(
					"Section [{}] is defined in both {} and {}",
					section,
					first.display(),
					path.display()
				)));
			}

			self.origins.insert(section.clone(), path.to_path_buf());
			self.merged.insert(section, value);
		}
		Ok(())
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Removes the `include` directive from the root table and returns its paths.
fn take_includes(table: &mut toml::Table, root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
	let invalid = || {
		ConfigError::Validation(format!(
			"include in {} must be a string or an array of strings",
			root.display()
		))
	};

	match table.remove(INCLUDE_KEY) {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(invalid()),
			})
			.collect(),
		Some(_) => Err(invalid()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const FORWARDER: &str = r#"
[forwarder]
id = "forwarder-test"
owner = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
"#;

	const DOMAIN: &str = r#"
[domain]
chain_id = 31337
verifying_contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
"#;

	const BACKENDS: &str = r#"
[storage]
primary = "memory"
[storage.implementations.memory]

[execution]
primary = "memory"
[execution.implementations.memory]
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		fs::write(&config_path, format!("{}{}{}", FORWARDER, DOMAIN, BACKENDS)).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();

		assert_eq!(config.forwarder.id, "forwarder-test");
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!(
			"include = [\"domain.toml\", \"backends.toml\"]\n{}",
			FORWARDER
		);

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("domain.toml"), DOMAIN).unwrap();
		fs::write(temp_dir.path().join("backends.toml"), BACKENDS).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();

		assert_eq!(config.forwarder.id, "forwarder-test");
		assert_eq!(config.domain.chain_id, 31337);
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!("include = [\"duplicate.toml\"]\n{}", FORWARDER);
		let duplicate_config = r#"
[forwarder]
id = "another-forwarder"
owner = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
"#;

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("duplicate.toml"), duplicate_config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;

		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("Section [forwarder] is defined in both"));
		assert!(error_msg.contains("main.toml"));
		assert!(error_msg.contains("duplicate.toml"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();

		let config = format!("include = [\"self.toml\"]\n{}", FORWARDER);
		fs::write(temp_dir.path().join("self.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("self.toml").await;

		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("included more than once"));
	}

	#[tokio::test]
	async fn test_missing_include_reported() {
		let temp_dir = TempDir::new().unwrap();

		let config = format!("include = [\"absent.toml\"]\n{}", FORWARDER);
		fs::write(temp_dir.path().join("main.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let err = loader.load_config("main.toml").await.unwrap_err();
		assert!(matches!(err, ConfigError::Io(_)));
	}

	#[tokio::test]
	async fn test_unknown_section_in_include_rejected() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!("include = [\"backends.toml\"]\n{}{}", FORWARDER, DOMAIN);
		let misspelt = BACKENDS.replace("[storage]", "[storgae]");
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("backends.toml"), misspelt).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("Unknown section [storgae]"));
		assert!(error_msg.contains("backends.toml"));
	}

	#[tokio::test]
	async fn test_nested_include_rejected() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!("include = [\"domain.toml\"]\n{}{}", FORWARDER, BACKENDS);
		let nested = format!("include = [\"more.toml\"]\n{}", DOMAIN);
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("domain.toml"), nested).unwrap();
		fs::write(temp_dir.path().join("more.toml"), "").unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("cannot include further files"));
	}

	#[tokio::test]
	async fn test_scalar_section_rejected() {
		let temp_dir = TempDir::new().unwrap();

		let config = format!("api = true\n{}{}{}", FORWARDER, DOMAIN, BACKENDS);
		fs::write(temp_dir.path().join("config.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("config.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("[api]"));
		assert!(error_msg.contains("must be a table"));
	}

	#[tokio::test]
	async fn test_include_resolves_env_per_file() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!("include = \"domain.toml\"\n{}{}", FORWARDER, BACKENDS);
		let domain = DOMAIN.replace("31337", "${FORWARDER_LOADER_TEST_CHAIN:-8453}");
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("domain.toml"), domain).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();
		assert_eq!(config.domain.chain_id, 8453);
	}
}
