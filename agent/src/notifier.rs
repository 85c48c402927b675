//! Rate-limited user-facing warnings.
//!
//! Delivery runs on a timer, so a persistent failure (server down, expired
//! credential) would otherwise surface the same warning every cycle. The
//! [`ErrorNotifier`] suppresses repeat warnings inside a cooldown window.
//! The cooldown is global rather than per-message: after any warning is
//! shown, all further warnings are suppressed until the window elapses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::host::Notifier;

/// Default cooldown between user-visible warnings.
pub const DEFAULT_WARN_COOLDOWN: Duration = Duration::from_secs(300);

/// Warning surface with a global cooldown.
pub struct ErrorNotifier {
    notifier: Arc<dyn Notifier>,
    cooldown: Duration,
    last_warned: Option<Instant>,
}

impl ErrorNotifier {
    /// Creates a notifier with the default 5-minute cooldown.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::with_cooldown(notifier, DEFAULT_WARN_COOLDOWN)
    }

    /// Creates a notifier with a custom cooldown.
    #[must_use]
    pub fn with_cooldown(notifier: Arc<dyn Notifier>, cooldown: Duration) -> Self {
        Self {
            notifier,
            cooldown,
            last_warned: None,
        }
    }

    /// Shows a warning unless one was already shown inside the cooldown
    /// window. Returns `true` if the warning was shown.
    pub fn warn_once(&mut self, message: &str) -> bool {
        let now = Instant::now();
        let suppressed = self
            .last_warned
            .is_some_and(|last| now.duration_since(last) <= self.cooldown);

        if suppressed {
            debug!(message, "Warning suppressed by cooldown");
            return false;
        }

        self.notifier.warn(message);
        self.last_warned = Some(now);
        true
    }

    /// Shows an informational message. Not rate limited.
    pub fn info(&self, message: &str) {
        self.notifier.info(message);
    }
}
