//! Device-local durable storage.
//!
//! A small key/value store of JSON documents that survives restarts: the
//! working cart, the guest order list, and the tracking code of an order
//! that was just placed. Writes are synchronous so a mutation is on disk
//! before the call that made it returns.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Storage keys.
pub mod keys {
    /// The working cart, as a `CartSnapshot`.
    pub const CART: &str = "oja.cart";

    /// Orders placed on this device without an account.
    pub const GUEST_ORDERS: &str = "oja.guest_orders";

    /// Tracking code of the order placed last, consumed by the confirmation view.
    pub const LAST_ORDER: &str = "oja.last_order";
}

/// Errors from device storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("stored value for {key} is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A JSON key/value store local to one device.
pub trait DeviceStorage: Send + Sync {
    /// Raw stored text for `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed helpers over any [`DeviceStorage`].
pub trait DeviceStorageExt: DeviceStorage {
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.read(key)?
            .map(|text| {
                serde_json::from_str(&text).map_err(|source| StorageError::Json {
                    key: key.to_owned(),
                    source,
                })
            })
            .transpose()
    }

    fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let text = serde_json::to_string(value).map_err(|source| StorageError::Json {
            key: key.to_owned(),
            source,
        })?;
        self.write(key, &text)
    }

    /// Read and remove `key` in one step.
    fn take<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let value = self.load(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }
}

impl<S: DeviceStorage + ?Sized> DeviceStorageExt for S {}

/// One JSON file per key inside a state directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` for storage, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl DeviceStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // Write beside the target and rename so a crash never leaves half a file.
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|source| StorageError::Io {
                key: key.to_owned(),
                source,
            })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }
}

/// Map-backed storage for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl DeviceStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("state")).unwrap();

        assert_eq!(storage.load::<Vec<u32>>(keys::CART).unwrap(), None);
        storage.save(keys::CART, &vec![1u32, 2, 3]).unwrap();
        assert_eq!(storage.load::<Vec<u32>>(keys::CART).unwrap(), Some(vec![1, 2, 3]));

        storage.remove(keys::CART).unwrap();
        storage.remove(keys::CART).unwrap();
        assert_eq!(storage.load::<Vec<u32>>(keys::CART).unwrap(), None);
    }

    #[test]
    fn test_take_consumes_value() {
        let storage = MemoryStorage::new();
        storage.save(keys::LAST_ORDER, "OJA-ABCD2345").unwrap();
        assert_eq!(
            storage.take::<String>(keys::LAST_ORDER).unwrap().as_deref(),
            Some("OJA-ABCD2345")
        );
        assert_eq!(storage.take::<String>(keys::LAST_ORDER).unwrap(), None);
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.write(keys::GUEST_ORDERS, "{not json").unwrap();
        assert!(matches!(
            storage.load::<Vec<String>>(keys::GUEST_ORDERS),
            Err(StorageError::Json { .. })
        ));
    }
}
