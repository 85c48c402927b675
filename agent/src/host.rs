//! Host environment interfaces.
//!
//! The agent runs embedded in an editor that supplies three narrow
//! facilities: secret storage for the bearer credential, a durable
//! key-value store for the offline cache, and user-facing notifications.
//! Each facility is an injected trait so the core logic can be tested
//! with the in-memory implementations in this module.
//!
//! Production implementations back the secret and state stores with files
//! under the configured state directory and route notifications through
//! [`tracing`].

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur in host-provided facilities.
#[derive(Error, Debug)]
pub enum HostError {
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A store key contained path separators or other invalid characters.
    #[error("invalid store key: {0}")]
    InvalidKey(String),
}

/// Secret storage for the bearer credential.
pub trait SecretStore: Send + Sync {
    /// Returns the stored secret, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, HostError>;

    /// Stores a secret, replacing any existing value.
    fn set(&self, key: &str, value: &str) -> Result<(), HostError>;

    /// Deletes a secret. Deleting an absent secret is not an error.
    fn delete(&self, key: &str) -> Result<(), HostError>;
}

/// Durable key-value storage for agent state that must survive restarts.
pub trait StateStore: Send + Sync {
    /// Reads the value for a key, or `None` if absent.
    fn read(&self, key: &str) -> Result<Option<String>, HostError>;

    /// Writes the value for a key, replacing any existing value.
    fn write(&self, key: &str, value: &str) -> Result<(), HostError>;

    /// Removes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), HostError>;
}

/// User-facing notification surface.
pub trait Notifier: Send + Sync {
    /// Shows an informational message.
    fn info(&self, message: &str);

    /// Shows a warning message.
    fn warn(&self, message: &str);
}

/// Rejects keys that could escape the store directory.
fn validate_key(key: &str) -> Result<(), HostError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(HostError::InvalidKey(key.to_string()))
    }
}

/// File-backed secret store.
///
/// Each secret is one file under the store directory. On Unix the file is
/// written with `0600` permissions.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Creates a secret store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Io` if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, HostError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn secret_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, HostError> {
        validate_key(key)?;
        match fs::read_to_string(self.secret_path(key)) {
            Ok(contents) => Ok(Some(contents.trim_end().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HostError> {
        validate_key(key)?;
        let path = self.secret_path(key);
        fs::write(&path, value)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), HostError> {
        validate_key(key)?;
        match fs::remove_file(self.secret_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// File-backed durable state store.
///
/// Each key is one JSON file under the store directory.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Creates a state store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Io` if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, HostError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn state_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Returns the directory backing this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StateStore for FileStateStore {
    fn read(&self, key: &str) -> Result<Option<String>, HostError> {
        validate_key(key)?;
        match fs::read_to_string(self.state_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), HostError> {
        validate_key(key)?;
        fs::write(self.state_path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), HostError> {
        validate_key(key)?;
        match fs::remove_file(self.state_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Notifier that routes messages to the log stream.
///
/// Used when the agent runs headless; an editor integration would replace
/// this with its own message surface.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info(&self, message: &str) {
        info!(target: "codepulse::user", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "codepulse::user", "{message}");
    }
}

/// In-memory secret store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// Creates an empty in-memory secret store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with a credential under `key`.
    #[must_use]
    pub fn with_secret(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .secrets
            .lock()
            .expect("secret store lock poisoned")
            .insert(key.to_string(), value.to_string());
        store
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, HostError> {
        Ok(self
            .secrets
            .lock()
            .expect("secret store lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), HostError> {
        self.secrets
            .lock()
            .expect("secret store lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), HostError> {
        self.secrets
            .lock()
            .expect("secret store lock poisoned")
            .remove(key);
        Ok(())
    }
}

/// In-memory state store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    /// Creates an empty in-memory state store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self, key: &str) -> Result<Option<String>, HostError> {
        Ok(self
            .entries
            .lock()
            .expect("state store lock poisoned")
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), HostError> {
        self.entries
            .lock()
            .expect("state store lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), HostError> {
        self.entries
            .lock()
            .expect("state store lock poisoned")
            .remove(key);
        Ok(())
    }
}

/// In-memory notifier that records shown messages, for tests.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl MemoryNotifier {
    /// Creates an empty recording notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all warning messages shown so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("notifier lock poisoned")
            .iter()
            .filter(|(level, _)| level == "warn")
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Returns all informational messages shown so far.
    #[must_use]
    pub fn infos(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("notifier lock poisoned")
            .iter()
            .filter(|(level, _)| level == "info")
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    fn info(&self, message: &str) {
        self.messages
            .lock()
            .expect("notifier lock poisoned")
            .push(("info".to_string(), message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.messages
            .lock()
            .expect("notifier lock poisoned")
            .push(("warn".to_string(), message.to_string()));
    }
}
