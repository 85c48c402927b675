//! Configuration module for the CodePulse agent.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CODEPULSE_API_URL` | No | `http://localhost:8080/api` | Collector API base URL |
//! | `CODEPULSE_AUTH_URL` | No | `<api>/auth` | Auth endpoint base URL |
//! | `CODEPULSE_SYNC_INTERVAL_MINUTES` | No | 1 | Minutes between sync cycles |
//! | `CODEPULSE_AUTO_START` | No | false | Begin tracking when the agent starts |
//! | `CODEPULSE_STATE_DIR` | No | `~/.codepulse` | Directory for secrets and durable state |
//! | `CODEPULSE_PROJECT` | No | `unknown-project` | Fallback project name |
//! | `CODEPULSE_CACHE_LIMIT` | No | 1000 | Maximum offline cache size |
//!
//! # Example
//!
//! ```no_run
//! use codepulse_agent::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("API URL: {}", config.api_url);
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Default collector API base URL (local development collector).
const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Default sync interval in minutes.
const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 1;

/// Default state directory name relative to home.
const DEFAULT_STATE_DIR: &str = ".codepulse";

/// Default fallback project name when the host supplies none.
const DEFAULT_PROJECT: &str = "unknown-project";

/// Default offline cache cap.
const DEFAULT_CACHE_LIMIT: usize = 1000;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the CodePulse agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// Collector API base URL (e.g., `https://codepulse.example.com/api`).
    pub api_url: String,

    /// Auth endpoint base URL. Defaults to `<api_url>/auth`.
    pub auth_url: String,

    /// Interval between sync cycles.
    pub sync_interval: Duration,

    /// Whether to begin tracking as soon as the agent starts.
    pub auto_start: bool,

    /// Directory holding the secret store and durable state.
    pub state_dir: PathBuf,

    /// Fallback project name when the host does not supply one.
    pub project: String,

    /// Maximum number of records the offline cache retains.
    pub cache_limit: usize,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `CODEPULSE_SYNC_INTERVAL_MINUTES` or `CODEPULSE_CACHE_LIMIT` is set
    ///   but cannot be parsed as a positive integer
    /// - The home directory cannot be determined (needed for the default
    ///   state directory)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("CODEPULSE_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let auth_url = env::var("CODEPULSE_AUTH_URL")
            .unwrap_or_else(|_| format!("{api_url}/auth"))
            .trim_end_matches('/')
            .to_string();

        let sync_interval_minutes = match env::var("CODEPULSE_SYNC_INTERVAL_MINUTES") {
            Ok(val) => {
                let minutes = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: "CODEPULSE_SYNC_INTERVAL_MINUTES".to_string(),
                    message: format!("expected positive integer, got '{val}'"),
                })?;
                if minutes == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "CODEPULSE_SYNC_INTERVAL_MINUTES".to_string(),
                        message: "sync interval must be at least 1 minute".to_string(),
                    });
                }
                minutes
            }
            Err(_) => DEFAULT_SYNC_INTERVAL_MINUTES,
        };

        let auto_start = match env::var("CODEPULSE_AUTO_START") {
            Ok(val) => matches!(val.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            Err(_) => false,
        };

        let state_dir = match env::var("CODEPULSE_STATE_DIR") {
            Ok(val) => PathBuf::from(val),
            Err(_) => {
                let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
                base_dirs.home_dir().join(DEFAULT_STATE_DIR)
            }
        };

        let project =
            env::var("CODEPULSE_PROJECT").unwrap_or_else(|_| DEFAULT_PROJECT.to_string());

        let cache_limit = match env::var("CODEPULSE_CACHE_LIMIT") {
            Ok(val) => {
                let limit = val.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                    key: "CODEPULSE_CACHE_LIMIT".to_string(),
                    message: format!("expected positive integer, got '{val}'"),
                })?;
                if limit == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "CODEPULSE_CACHE_LIMIT".to_string(),
                        message: "cache limit must be greater than 0".to_string(),
                    });
                }
                limit
            }
            Err(_) => DEFAULT_CACHE_LIMIT,
        };

        Ok(Self {
            api_url,
            auth_url,
            sync_interval: Duration::from_secs(sync_interval_minutes * 60),
            auto_start,
            state_dir,
            project,
            cache_limit,
        })
    }
}
