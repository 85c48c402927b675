//! Session tracking for editor activity.
//!
//! The [`SessionTracker`] converts the raw stream of "user is editing file
//! F" signals into bounded sessions and, on session close, into
//! [`ActivityRecord`]s.
//!
//! # Session boundaries
//!
//! A session covers contiguous editing of one file. It ends when the
//! active file changes, when tracking stops, or when the user goes
//! inactive. Two thresholds govern what survives a close:
//!
//! - **Inactivity** (30 s): if the last qualifying event is older than the
//!   threshold at close time, the whole session is discarded and no record
//!   is produced. Idle time is never billed.
//! - **Significance** (5 s): sessions that accumulated less active time
//!   than the threshold close silently.
//!
//! Accumulation folds wall-clock time between a moving checkpoint and each
//! qualifying event, so `accumulated` counts active editing rather than
//! the full span between open and close.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use crate::types::{generate_record_id, generate_session_id, ActivityRecord};

/// Inactivity threshold after which a session is discarded at close.
pub const INACTIVITY_THRESHOLD: Duration = Duration::from_secs(30);

/// Minimum accumulated duration for a session to produce a record.
pub const MIN_SIGNIFICANT_DURATION: Duration = Duration::from_secs(5);

/// A live editing session on one file.
#[derive(Debug)]
struct Session {
    project: String,
    file: String,
    language: String,
    accumulated: Duration,
    checkpoint: Instant,
}

/// Tracks at most one open editing session.
pub struct SessionTracker {
    current: Option<Session>,
    last_activity: Option<Instant>,
    session_id: String,
    inactivity_threshold: Duration,
    min_significant: Duration,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    /// Creates a tracker with the default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_thresholds(INACTIVITY_THRESHOLD, MIN_SIGNIFICANT_DURATION)
    }

    /// Creates a tracker with custom thresholds.
    #[must_use]
    pub fn with_thresholds(inactivity_threshold: Duration, min_significant: Duration) -> Self {
        Self {
            current: None,
            last_activity: None,
            session_id: generate_session_id(),
            inactivity_threshold,
            min_significant,
        }
    }

    /// Returns the current tracking session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Starts a fresh tracking session ID. Called when tracking starts.
    pub fn reset_session_id(&mut self) {
        self.session_id = generate_session_id();
    }

    /// Returns `true` if a session is currently open.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.current.is_some()
    }

    /// Handles a switch of the active file: closes the current session and
    /// opens a new one.
    ///
    /// Returns the record produced by the closed session, if any.
    pub fn on_file_changed(
        &mut self,
        project: String,
        file: String,
        language: String,
        now: Instant,
    ) -> Option<ActivityRecord> {
        let closed = self.close(now);

        debug!(file = %file, language = %language, "Opening session");
        self.current = Some(Session {
            project,
            file,
            language,
            accumulated: Duration::ZERO,
            checkpoint: now,
        });
        self.last_activity = Some(now);

        closed
    }

    /// Handles a qualifying activity signal (edit, save, focus gained):
    /// folds the elapsed slice into the open session and refreshes the
    /// last-activity timestamp.
    pub fn on_activity(&mut self, now: Instant) {
        self.last_activity = Some(now);

        if let Some(session) = self.current.as_mut() {
            session.accumulated += now.saturating_duration_since(session.checkpoint);
            session.checkpoint = now;
        }
    }

    /// Closes the current session.
    ///
    /// An inactive session (last activity older than the inactivity
    /// threshold) is discarded entirely: the idle tail is not counted and
    /// no record is produced. Otherwise the final slice is folded in and a
    /// record is emitted iff the accumulated duration is significant.
    pub fn close(&mut self, now: Instant) -> Option<ActivityRecord> {
        let mut session = self.current.take()?;

        if self.is_inactive(now) {
            debug!(file = %session.file, "Discarding inactive session");
            return None;
        }

        session.accumulated += now.saturating_duration_since(session.checkpoint);
        if session.accumulated <= self.min_significant {
            debug!(
                file = %session.file,
                accumulated_ms = session.accumulated.as_millis() as u64,
                "Session below significance threshold"
            );
            return None;
        }

        Some(self.make_record(&session, session.accumulated))
    }

    /// Sync-tick accounting: folds elapsed time into the open session and
    /// emits a record for the matured slice, keeping the session open with
    /// its accumulation reset to zero.
    ///
    /// An inactive session is discarded, exactly as in [`close`](Self::close).
    pub fn checkpoint(&mut self, now: Instant) -> Option<ActivityRecord> {
        if self.current.is_none() {
            return None;
        }

        if self.is_inactive(now) {
            if let Some(session) = self.current.take() {
                debug!(file = %session.file, "Discarding inactive session at sync tick");
            }
            return None;
        }

        let session = self.current.as_mut()?;
        session.accumulated += now.saturating_duration_since(session.checkpoint);
        session.checkpoint = now;

        if session.accumulated <= self.min_significant {
            return None;
        }

        let matured = session.accumulated;
        session.accumulated = Duration::ZERO;

        let session = self.current.as_ref()?;
        Some(self.make_record(session, matured))
    }

    fn is_inactive(&self, now: Instant) -> bool {
        self.last_activity
            .is_some_and(|last| now.saturating_duration_since(last) > self.inactivity_threshold)
    }

    /// Builds a record for an accumulated slice of the given session.
    ///
    /// `start_time` is derived backwards from the accumulated duration, so
    /// `time_spent_secs` never exceeds the wall-clock span of the record.
    fn make_record(&self, session: &Session, accumulated: Duration) -> ActivityRecord {
        let end_time = Utc::now();
        let accumulated_ms = u64::try_from(accumulated.as_millis()).unwrap_or(u64::MAX);
        let start_time = end_time
            - chrono::Duration::milliseconds(i64::try_from(accumulated_ms).unwrap_or(i64::MAX));

        ActivityRecord {
            id: generate_record_id(),
            project_name: session.project.clone(),
            language: session.language.clone(),
            file: session.file.clone(),
            time_spent_secs: (accumulated_ms + 500) / 1000,
            start_time,
            end_time,
            session_id: self.session_id.clone(),
            file_extension: file_extension(&session.file),
        }
    }
}

/// Extracts the lowercase file extension, if the file has one.
#[must_use]
pub fn file_extension(file: &str) -> Option<String> {
    let basename = file.rsplit(['/', '\\']).next()?;
    let (stem, ext) = basename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Resolves the language for a file.
///
/// The host's language identifier wins when it is present and meaningful;
/// otherwise the extension is mapped to a language name, falling back to
/// the raw extension and finally to `"unknown"`.
#[must_use]
pub fn detect_language(file: &str, hint: Option<&str>) -> String {
    if let Some(hint) = hint {
        if !hint.is_empty() && hint != "plaintext" {
            return hint.to_string();
        }
    }

    match file_extension(file) {
        Some(ext) => language_for_extension(&ext)
            .map(str::to_string)
            .unwrap_or(ext),
        None => "unknown".to_string(),
    }
}

/// Maps common file extensions to the collector's language names.
fn language_for_extension(ext: &str) -> Option<&'static str> {
    let language = match ext {
        "js" => "javascript",
        "jsx" => "javascriptreact",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "py" => "python",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "cs" => "csharp",
        "php" => "php",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "sh" => "shellscript",
        "ps1" => "powershell",
        "sql" => "sql",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "less" => "less",
        "json" => "json",
        "xml" => "xml",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => return None,
    };
    Some(language)
}
