//! File-based storage backend.
//!
//! Each key is stored as its own file under `<storage_path>/<namespace>/`,
//! prefixed with a small header identifying the format. Writes go to a
//! temporary file that is renamed into place, so a crash never leaves a
//! half-written nonce behind. Every write takes an exclusive lock on the
//! directory's lock file for its own duration only, so a running server and
//! one-shot commands can share the same directory while compare-and-swap
//! still hands out each nonce once.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use forwarder_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use tokio::fs;

const DEFAULT_STORAGE_PATH: &str = "./data/forwarder";
const LOCK_FILE: &str = ".lock";

/// Fixed-size file header.
///
/// Binary layout (16 bytes total):
/// - [0-3]: Magic bytes "FWDS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-9]: Payload length (u32, little-endian)
/// - [10-15]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	payload_len: u32,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"FWDS";
	const VERSION: u16 = 1;
	const SIZE: usize = 16;

	fn for_payload(payload: &[u8]) -> Result<Self, StorageError> {
		let payload_len = u32::try_from(payload.len())
			.map_err(|_| StorageError::Backend("Value too large for file storage".into()))?;
		Ok(Self {
			version: Self::VERSION,
			payload_len,
		})
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..10].copy_from_slice(&self.payload_len.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognised file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}
		let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

		Ok(Self {
			version,
			payload_len,
		})
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStorage {
	/// Opens (creating if needed) a storage directory.
	///
	/// Any number of backends, in this or other processes, may open the same
	/// directory.
	pub fn open(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
		let base_path = base_path.as_ref().to_path_buf();
		std::fs::create_dir_all(&base_path).map_err(|e| {
			StorageError::Backend(format!(
				"Cannot create storage directory {}: {}",
				base_path.display(),
				e
			))
		})?;
		Ok(Self { base_path })
	}

	/// Maps `namespace:id` to `<base>/<namespace>/<id>.bin`.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = key.split_once(':').unwrap_or(("default", key));
		let safe_id = id.replace(['/', '\\', ':'], "_");
		self.base_path
			.join(sanitize(namespace))
			.join(format!("{}.bin", safe_id))
	}

	/// Runs `write` on a blocking thread while holding the directory lock.
	async fn locked<T, F>(&self, write: F) -> Result<T, StorageError>
	where
		T: Send + 'static,
		F: FnOnce() -> Result<T, StorageError> + Send + 'static,
	{
		let lock_path = self.base_path.join(LOCK_FILE);
		tokio::task::spawn_blocking(move || {
			let lock = std::fs::OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(&lock_path)
				.map_err(|e| StorageError::Backend(e.to_string()))?;
			lock.lock_exclusive().map_err(|e| {
				StorageError::Backend(format!("Cannot lock {}: {}", lock_path.display(), e))
			})?;
			// Released when `lock` is dropped
			write()
		})
		.await
		.map_err(|e| StorageError::Backend(format!("Storage task failed: {}", e)))?
	}
}

fn sanitize(segment: &str) -> String {
	segment.replace(['/', '\\', '.'], "_")
}

/// Validates the header of a stored file and returns its payload.
fn decode(path: &Path, data: &[u8]) -> Result<Vec<u8>, StorageError> {
	let header = FileHeader::deserialize(data)?;
	let payload = &data[FileHeader::SIZE..];
	if payload.len() != header.payload_len as usize {
		return Err(StorageError::Backend(format!(
			"Truncated value in {}: expected {} bytes, found {}",
			path.display(),
			header.payload_len,
			payload.len()
		)));
	}
	Ok(payload.to_vec())
}

/// Reads the payload at `path`, `None` if the file does not exist.
fn read_payload(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
	match std::fs::read(path) {
		Ok(data) => decode(path, &data).map(Some),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(StorageError::Backend(e.to_string())),
	}
}

/// Writes `value` to `path` through a temporary file and a rename.
///
/// Callers hold the directory lock, so the temporary name is never shared.
fn write_payload(path: &Path, value: &[u8]) -> Result<(), StorageError> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).map_err(|e| StorageError::Backend(e.to_string()))?;
	}

	let header = FileHeader::for_payload(value)?;
	let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
	file_data.extend_from_slice(&header.serialize());
	file_data.extend_from_slice(value);

	let temp_path = path.with_extension("tmp");
	std::fs::write(&temp_path, file_data).map_err(|e| StorageError::Backend(e.to_string()))?;
	std::fs::rename(&temp_path, path).map_err(|e| StorageError::Backend(e.to_string()))
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		// Renames are atomic, so reads need no lock
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		decode(&path, &data)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		self.locked(move || write_payload(&path, &value)).await?;

		tracing::trace!(key = %key, "Persisted value");
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		self.locked(move || match std::fs::remove_file(&path) {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		})
		.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<Vec<u8>>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		let swapped = self
			.locked(move || {
				if read_payload(&path)? != expected {
					return Ok(false);
				}
				write_payload(&path, &value)?;
				Ok(true)
			})
			.await?;

		tracing::trace!(key = %key, swapped, "Compare and swap");
		Ok(swapped)
	}

	async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let dir = self.base_path.join(sanitize(namespace));
		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut ids = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() == Some(std::ffi::OsStr::new("bin")) {
				if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
					ids.push(stem.to_string());
				}
			} else {
				tracing::debug!("Skipping non-storage file {:?}", path);
			}
		}
		Ok(ids)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(path) if !path.trim().is_empty() => Ok(()),
					_ => Err("storage_path cannot be empty".to_string()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/forwarder")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::open(storage_path)?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl forwarder_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_values_survive_reopen() {
		let temp_dir = TempDir::new().unwrap();
		{
			let storage = FileStorage::open(temp_dir.path()).unwrap();
			storage
				.set_bytes("nonces:0xabc", b"\"0x3\"".to_vec())
				.await
				.unwrap();
		}

		let storage = FileStorage::open(temp_dir.path()).unwrap();
		assert_eq!(
			storage.get_bytes("nonces:0xabc").await.unwrap(),
			b"\"0x3\"".to_vec()
		);
	}

	#[tokio::test]
	async fn test_missing_key_is_not_found() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();

		assert!(matches!(
			storage.get_bytes("nonces:0xabc").await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("nonces:0xabc").await.unwrap());
	}

	#[tokio::test]
	async fn test_delete_is_idempotent() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();

		storage
			.set_bytes("operators:0xaa", b"true".to_vec())
			.await
			.unwrap();
		storage.delete("operators:0xaa").await.unwrap();
		storage.delete("operators:0xaa").await.unwrap();
		assert!(!storage.exists("operators:0xaa").await.unwrap());
	}

	#[tokio::test]
	async fn test_list_ids_per_namespace() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();

		storage
			.set_bytes("operators:0xaa", b"true".to_vec())
			.await
			.unwrap();
		storage
			.set_bytes("operators:0xbb", b"true".to_vec())
			.await
			.unwrap();
		storage
			.set_bytes("nonces:0xcc", b"\"0x1\"".to_vec())
			.await
			.unwrap();

		let mut ids = storage.list_ids("operators").await.unwrap();
		ids.sort();
		assert_eq!(ids, vec!["0xaa", "0xbb"]);
		assert!(storage.list_ids("unknown").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_corrupted_file_is_reported() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();

		let path = storage.get_file_path("nonces:0xabc");
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, b"garbage").unwrap();

		assert!(matches!(
			storage.get_bytes("nonces:0xabc").await,
			Err(StorageError::Backend(_))
		));
	}

	#[tokio::test]
	async fn test_backends_share_directory() {
		let temp_dir = TempDir::new().unwrap();
		let first = FileStorage::open(temp_dir.path()).unwrap();
		let second = FileStorage::open(temp_dir.path()).unwrap();

		first
			.set_bytes("operators:0xaa", b"true".to_vec())
			.await
			.unwrap();
		assert!(second.exists("operators:0xaa").await.unwrap());

		second.delete("operators:0xaa").await.unwrap();
		assert!(!first.exists("operators:0xaa").await.unwrap());
	}

	#[tokio::test]
	async fn test_compare_and_swap_across_backends() {
		let temp_dir = TempDir::new().unwrap();
		let first = FileStorage::open(temp_dir.path()).unwrap();
		let second = FileStorage::open(temp_dir.path()).unwrap();
		let key = "nonces:0xabc";

		assert!(first
			.compare_and_swap(key, None, b"\"0x1\"".to_vec())
			.await
			.unwrap());
		// The second backend read the key as absent before the first wrote it.
		assert!(!second
			.compare_and_swap(key, None, b"\"0x1\"".to_vec())
			.await
			.unwrap());
		assert!(second
			.compare_and_swap(key, Some(b"\"0x1\"".to_vec()), b"\"0x2\"".to_vec())
			.await
			.unwrap());
		assert_eq!(first.get_bytes(key).await.unwrap(), b"\"0x2\"".to_vec());
	}

	#[tokio::test]
	async fn test_concurrent_swaps_of_same_value() {
		let temp_dir = TempDir::new().unwrap();
		let storage = std::sync::Arc::new(FileStorage::open(temp_dir.path()).unwrap());

		let mut handles = Vec::new();
		for i in 0..8u8 {
			let storage = storage.clone();
			handles.push(tokio::spawn(async move {
				storage
					.compare_and_swap("nonces:0xabc", None, vec![i])
					.await
					.unwrap()
			}));
		}

		let mut swapped = 0;
		for handle in handles {
			if handle.await.unwrap() {
				swapped += 1;
			}
		}
		assert_eq!(swapped, 1);
	}

	#[test]
	fn test_header_round_trip() {
		let header = FileHeader::for_payload(b"abc").unwrap();
		let parsed = FileHeader::deserialize(&header.serialize()).unwrap();
		assert_eq!(parsed, header);
	}

	#[test]
	fn test_schema_rejects_empty_path() {
		let config: toml::Value = toml::from_str(r#"storage_path = " ""#).unwrap();
		assert!(FileStorageSchema.validate(&config).is_err());
	}
}
