//! CodePulse Agent - editor activity tracking and sync engine.
//!
//! This crate tracks per-file coding sessions from a stream of editor
//! events and syncs the resulting activity records to a CodePulse
//! collector over HTTP.
//!
//! # Overview
//!
//! Editor events (file switches, edits, saves, focus changes) feed a
//! [`session::SessionTracker`] that accumulates active time per file.
//! Sessions that end with more than a few seconds of activity become
//! [`types::ActivityRecord`]s, which are queued and delivered in batches
//! on a periodic sync timer. Records that cannot be delivered are
//! preserved in a durable offline cache and retried opportunistically.
//!
//! Credentials are acquired through a device authorization flow and kept
//! in the host's secret storage.
//!
//! # Modules
//!
//! - [`types`]: Activity records and editor events
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for agent operations
//! - [`host`]: Host facility traits (secrets, durable state, notifications)
//! - [`credentials`]: Credential storage and legacy migration
//! - [`session`]: Per-file session tracking
//! - [`queue`]: Volatile queue of records awaiting delivery
//! - [`cache`]: Durable cache of undelivered records
//! - [`delivery`]: Batch-then-per-record HTTP delivery
//! - [`auth`]: Device authorization flow
//! - [`notifier`]: Rate-limited user-facing error notifications
//! - [`agent`]: The orchestrator tying the pieces together

pub mod agent;
pub mod auth;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod host;
pub mod notifier;
pub mod queue;
pub mod session;
pub mod types;

pub use agent::Agent;
pub use auth::{
    cancellation, AuthError, AuthOutcome, DeviceAuthClient, DeviceAuthSession, DeviceInfo,
};
pub use cache::{CacheError, OfflineCache, DEFAULT_CACHE_LIMIT};
pub use config::{Config, ConfigError};
pub use credentials::{CredentialStore, CREDENTIAL_KEY};
pub use delivery::{DeliveryEngine, DeliveryError};
pub use error::{AgentError, Result};
pub use host::{
    FileSecretStore, FileStateStore, HostError, LogNotifier, MemoryNotifier, MemorySecretStore,
    MemoryStateStore, Notifier, SecretStore, StateStore,
};
pub use notifier::{ErrorNotifier, DEFAULT_WARN_COOLDOWN};
pub use queue::RecordQueue;
pub use session::{
    detect_language, file_extension, SessionTracker, INACTIVITY_THRESHOLD,
    MIN_SIGNIFICANT_DURATION,
};
pub use types::{generate_record_id, generate_session_id, ActivityRecord, EditorEvent};
