use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use keyring::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Storage key written by the current login flow.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key written by older login flows. Still read as a fallback;
/// nothing shows whether it is written anywhere today.
pub const LEGACY_TOKEN_KEY: &str = "token";

/// Lookup order for the current credential.
pub const CREDENTIAL_KEYS: [&str; 2] = [ACCESS_TOKEN_KEY, LEGACY_TOKEN_KEY];

/// Keychain service name
pub const SERVICE_NAME: &str = "trading-journal";

/// Credentials file name in the data directory
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is corrupt: {0}")]
    Corrupt(String),

    #[error("Credential storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistent key-value slot for bearer credentials.
///
/// The API client only reads; login and logout flows write and remove.
pub trait CredentialStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// The first non-empty credential in `CREDENTIAL_KEYS` order, with the key
/// it was found under.
pub fn current_credential_entry(
    store: &dyn CredentialStore,
) -> Result<Option<(&'static str, String)>, StorageError> {
    for key in CREDENTIAL_KEYS {
        match store.read(key)? {
            Some(value) if !value.is_empty() => {
                if key != ACCESS_TOKEN_KEY {
                    debug!(key, "Using credential from legacy storage key");
                }
                return Ok(Some((key, value)));
            }
            _ => {}
        }
    }
    Ok(None)
}

/// The credential to present on a request.
pub fn current_credential(store: &dyn CredentialStore) -> Result<Option<String>, StorageError> {
    Ok(current_credential_entry(store)?.map(|(_, value)| value))
}

/// Key currently holding the credential, if any.
pub fn credential_source(store: &dyn CredentialStore) -> Result<Option<&'static str>, StorageError> {
    Ok(current_credential_entry(store)?.map(|(key, _)| key))
}

/// Remove the credential from every key it may live under.
pub fn clear_credentials(store: &dyn CredentialStore) -> Result<(), StorageError> {
    for key in CREDENTIAL_KEYS {
        store.remove(key)?;
    }
    Ok(())
}

/// OS keychain storage, one entry per key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    value: String,
    stored_at: DateTime<Utc>,
}

/// JSON file storage for machines without a usable keychain.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: RwLock<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: RwLock::new(()),
        }
    }

    /// Store under `<data_dir>/credentials.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(CREDENTIALS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the value under `key` was written.
    pub fn stored_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let _guard = self.lock.read();
        Ok(self.load()?.get(key).map(|c| c.stored_at))
    }

    fn load(&self) -> Result<HashMap<String, StoredCredential>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    fn save(&self, entries: &HashMap<String, StoredCredential>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        // Write aside and rename so a crash never leaves a truncated file
        let temp_path = self.temp_path();
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.read();
        Ok(self.load()?.remove(key).map(|c| c.value))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.write();
        let mut entries = self.load()?;
        entries.insert(
            key.to_string(),
            StoredCredential {
                value: value.to_string(),
                stored_at: Utc::now(),
            },
        );
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.write();
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<S> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}
