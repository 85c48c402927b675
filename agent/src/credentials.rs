//! Credential storage for the collector bearer token.
//!
//! The agent authenticates every delivery and validation call with a single
//! opaque bearer token. This module wraps the host's [`SecretStore`] and
//! adds the one-time migration of a legacy plaintext token out of the
//! durable state store.

use std::sync::Arc;

use tracing::{debug, info};

use crate::host::{HostError, SecretStore, StateStore};

/// Secret store key holding the bearer token.
pub const CREDENTIAL_KEY: &str = "credential";

/// Durable state key where old agent versions kept the token in plaintext.
const LEGACY_TOKEN_KEY: &str = "jwt_token";

/// Get/set/clear access to the single bearer credential.
///
/// The credential is written by the device authorization flow (or the
/// `login` command) and cleared on validation failure or logout. Everything
/// else reads it.
pub struct CredentialStore {
    store: Arc<dyn SecretStore>,
}

impl CredentialStore {
    /// Creates a credential store over the given secret facility.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Returns the stored bearer token, or `None` if not logged in.
    ///
    /// Empty tokens are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the secret facility fails.
    pub fn get(&self) -> Result<Option<String>, HostError> {
        Ok(self
            .store
            .get(CREDENTIAL_KEY)?
            .filter(|token| !token.is_empty()))
    }

    /// Stores a new bearer token.
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the secret facility fails.
    pub fn set(&self, token: &str) -> Result<(), HostError> {
        self.store.set(CREDENTIAL_KEY, token)
    }

    /// Clears the stored bearer token, if any.
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the secret facility fails.
    pub fn clear(&self) -> Result<(), HostError> {
        self.store.delete(CREDENTIAL_KEY)
    }

    /// One-time upgrade step: moves a legacy plaintext token from the
    /// durable state store into secure storage and erases the plaintext
    /// copy.
    ///
    /// A token already present in secure storage always wins; the legacy
    /// copy is still erased in that case.
    ///
    /// Returns `true` if a legacy token was migrated.
    ///
    /// # Errors
    ///
    /// Returns `HostError` if either store fails.
    pub fn migrate_legacy(&self, state: &dyn StateStore) -> Result<bool, HostError> {
        let Some(legacy) = state.read(LEGACY_TOKEN_KEY)? else {
            return Ok(false);
        };

        let legacy = legacy.trim().trim_matches('"').to_string();
        if legacy.is_empty() {
            state.remove(LEGACY_TOKEN_KEY)?;
            return Ok(false);
        }

        if self.get()?.is_some() {
            debug!("Secure credential already present, discarding legacy token");
            state.remove(LEGACY_TOKEN_KEY)?;
            return Ok(false);
        }

        self.set(&legacy)?;
        state.remove(LEGACY_TOKEN_KEY)?;
        info!("Migrated legacy plaintext token to secure storage");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemorySecretStore, MemoryStateStore};

    fn store_with_secret(token: &str) -> CredentialStore {
        CredentialStore::new(Arc::new(MemorySecretStore::with_secret(
            CREDENTIAL_KEY,
            token,
        )))
    }

    #[test]
    fn get_returns_none_when_absent() {
        let credentials = CredentialStore::new(Arc::new(MemorySecretStore::new()));
        assert!(credentials.get().unwrap().is_none());
    }

    #[test]
    fn set_then_get_roundtrips() {
        let credentials = CredentialStore::new(Arc::new(MemorySecretStore::new()));
        credentials.set("tok-abc").unwrap();
        assert_eq!(credentials.get().unwrap().as_deref(), Some("tok-abc"));
    }

    #[test]
    fn empty_token_is_treated_as_absent() {
        let credentials = store_with_secret("");
        assert!(credentials.get().unwrap().is_none());
    }

    #[test]
    fn clear_removes_token() {
        let credentials = store_with_secret("tok-abc");
        credentials.clear().unwrap();
        assert!(credentials.get().unwrap().is_none());
    }

    #[test]
    fn migrate_moves_legacy_token_and_erases_plaintext() {
        let credentials = CredentialStore::new(Arc::new(MemorySecretStore::new()));
        let state = MemoryStateStore::new();
        state.write("jwt_token", "legacy-tok").unwrap();

        let migrated = credentials.migrate_legacy(&state).unwrap();

        assert!(migrated);
        assert_eq!(credentials.get().unwrap().as_deref(), Some("legacy-tok"));
        assert!(state.read("jwt_token").unwrap().is_none());
    }

    #[test]
    fn migrate_is_a_no_op_without_legacy_token() {
        let credentials = CredentialStore::new(Arc::new(MemorySecretStore::new()));
        let state = MemoryStateStore::new();

        assert!(!credentials.migrate_legacy(&state).unwrap());
        assert!(credentials.get().unwrap().is_none());
    }

    #[test]
    fn migrate_runs_only_once() {
        let credentials = CredentialStore::new(Arc::new(MemorySecretStore::new()));
        let state = MemoryStateStore::new();
        state.write("jwt_token", "legacy-tok").unwrap();

        assert!(credentials.migrate_legacy(&state).unwrap());
        assert!(!credentials.migrate_legacy(&state).unwrap());
    }

    #[test]
    fn migrate_keeps_existing_secure_token() {
        let credentials = store_with_secret("secure-tok");
        let state = MemoryStateStore::new();
        state.write("jwt_token", "legacy-tok").unwrap();

        let migrated = credentials.migrate_legacy(&state).unwrap();

        assert!(!migrated);
        assert_eq!(credentials.get().unwrap().as_deref(), Some("secure-tok"));
        assert!(state.read("jwt_token").unwrap().is_none());
    }

    #[test]
    fn migrate_strips_json_quoting_from_legacy_value() {
        let credentials = CredentialStore::new(Arc::new(MemorySecretStore::new()));
        let state = MemoryStateStore::new();
        state.write("jwt_token", "\"legacy-tok\"").unwrap();

        assert!(credentials.migrate_legacy(&state).unwrap());
        assert_eq!(credentials.get().unwrap().as_deref(), Some("legacy-tok"));
    }
}
