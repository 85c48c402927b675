//! Core data types for the CodePulse agent.
//!
//! This module defines the activity record schema shared with the CodePulse
//! collector and the editor event stream consumed by the agent. All wire
//! types serialize to camelCase JSON.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of the random alphanumeric suffix in record and session IDs.
const ID_SUFFIX_LEN: usize = 20;

/// Prefix for activity record IDs.
const RECORD_ID_PREFIX: &str = "rec_";

/// Prefix for tracking session IDs.
const SESSION_ID_PREFIX: &str = "ses_";

/// A delivery-ready summary of one matured editing session slice.
///
/// Records are immutable once created. Each record lives in exactly one
/// place at a time: the record queue, an in-flight delivery batch, the
/// offline cache, or (once delivered) nowhere.
///
/// `time_spent_secs` is derived from the session's accumulated active
/// duration, not from `end_time - start_time`, and may be smaller than the
/// wall-clock span if the session was paused by inactivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Unique record identifier with format `rec_` followed by 20 alphanumeric characters.
    pub id: String,

    /// Project the edited file belongs to.
    pub project_name: String,

    /// Detected programming language.
    pub language: String,

    /// Workspace-relative file path.
    pub file: String,

    /// Active editing time in whole seconds.
    #[serde(rename = "timeSpent")]
    pub time_spent_secs: u64,

    /// When the accounted slice began.
    pub start_time: DateTime<Utc>,

    /// When the accounted slice ended.
    pub end_time: DateTime<Utc>,

    /// Tracking session this record belongs to.
    pub session_id: String,

    /// File extension, when the file has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
}

/// Editing events supplied by the host editor.
///
/// The host's event registration mechanism is decoupled from the agent:
/// whatever callbacks the editor exposes are translated into this single
/// tagged stream and consumed by one dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditorEvent {
    /// The active document changed.
    FileChanged {
        /// Workspace-relative path of the newly active file.
        file: String,
        /// Language identifier reported by the host, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        /// Project (workspace folder) name, if the host knows it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project: Option<String>,
    },

    /// The active document was edited.
    Edited,

    /// The active document was saved.
    Saved,

    /// The editor window gained or lost focus.
    FocusChanged {
        /// Whether the window is now focused.
        focused: bool,
    },
}

/// Generates a unique activity record ID.
#[must_use]
pub fn generate_record_id() -> String {
    generate_id(RECORD_ID_PREFIX)
}

/// Generates a unique tracking session ID.
#[must_use]
pub fn generate_session_id() -> String {
    generate_id(SESSION_ID_PREFIX)
}

/// Generates an ID with the given prefix followed by 20 alphanumeric characters.
fn generate_id(prefix: &str) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();

    format!("{prefix}{suffix}")
}
