//! Durable cache of records that failed delivery.
//!
//! Records that could not be delivered are preserved here rather than
//! dropped, persisted through the host's [`StateStore`] so they survive
//! process restarts. The cache is loaded once at startup and saved after
//! every mutation.
//!
//! The cache is capped (default 1000 records) so a prolonged outage cannot
//! grow it without bound; overflow drops the oldest records and logs a
//! warning.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::host::{HostError, StateStore};
use crate::types::ActivityRecord;

/// Durable state key holding the serialized cache.
const CACHE_STATE_KEY: &str = "offline_cache";

/// Default maximum number of cached records.
pub const DEFAULT_CACHE_LIMIT: usize = 1000;

/// Errors that can occur while loading or persisting the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The durable state facility failed.
    #[error("state store error: {0}")]
    State(#[from] HostError),

    /// Cache serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable ordered buffer of undelivered records.
pub struct OfflineCache {
    store: Arc<dyn StateStore>,
    records: Vec<ActivityRecord>,
    limit: usize,
}

impl OfflineCache {
    /// Loads the cache from durable state.
    ///
    /// A corrupt serialized cache is logged and discarded rather than
    /// failing startup.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::State` if the state facility itself fails.
    pub fn load(store: Arc<dyn StateStore>, limit: usize) -> Result<Self, CacheError> {
        let records = match store.read(CACHE_STATE_KEY)? {
            Some(raw) => match serde_json::from_str::<Vec<ActivityRecord>>(&raw) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Discarding corrupt offline cache");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if !records.is_empty() {
            info!(cached = records.len(), "Loaded offline cache");
        }

        let mut cache = Self {
            store,
            records,
            limit,
        };
        cache.enforce_limit();
        Ok(cache)
    }

    /// Appends records that failed delivery and persists the cache.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if persisting fails; the records are kept in
    /// memory either way.
    pub fn append(&mut self, records: Vec<ActivityRecord>) -> Result<(), CacheError> {
        if records.is_empty() {
            return Ok(());
        }

        debug!(appended = records.len(), "Caching undelivered records");
        self.records.extend(records);
        self.enforce_limit();
        self.persist()
    }

    /// Overwrites the durable set, used to atomically clear the cache after
    /// a successful flush.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if persisting fails.
    pub fn replace_all(&mut self, records: Vec<ActivityRecord>) -> Result<(), CacheError> {
        self.records = records;
        self.enforce_limit();
        self.persist()
    }

    /// Returns the cached records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    /// Returns the number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops oldest records when the cap is exceeded.
    fn enforce_limit(&mut self) {
        if self.records.len() > self.limit {
            let dropped = self.records.len() - self.limit;
            self.records.drain(..dropped);
            warn!(
                dropped,
                limit = self.limit,
                "Offline cache over capacity, oldest records dropped"
            );
        }
    }

    fn persist(&self) -> Result<(), CacheError> {
        let raw = serde_json::to_string(&self.records)?;
        self.store.write(CACHE_STATE_KEY, &raw)?;
        Ok(())
    }
}
