//! The agent orchestrator.
//!
//! [`Agent`] holds every piece of mutable tracking state in one explicit
//! struct: the tracking flag, the session tracker, the record queue, the
//! offline cache, the delivery engine, and the notifier. There are no
//! ambient globals; the run loop constructs one `Agent`, feeds it editor
//! events and sync ticks, and tears it down on shutdown.
//!
//! # Sync cycle
//!
//! Each tick, while tracking:
//!
//! 1. the open session's matured time is checkpointed into the queue;
//! 2. the queue is drained and delivered as one batch;
//! 3. on success the offline cache is also flushed; on failure the drained
//!    batch is appended to the cache.
//!
//! When the queue is empty on a tick, the cache is deliberately left
//! alone; it gets its opportunistic flushes at tracking start and at
//! shutdown.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::OfflineCache;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::delivery::DeliveryEngine;
use crate::error::Result;
use crate::host::{Notifier, StateStore};
use crate::notifier::ErrorNotifier;
use crate::queue::RecordQueue;
use crate::session::{detect_language, SessionTracker};
use crate::types::EditorEvent;

/// Activity tracking and sync engine.
pub struct Agent {
    config: Config,
    credentials: Arc<CredentialStore>,
    tracker: SessionTracker,
    queue: RecordQueue,
    cache: OfflineCache,
    delivery: DeliveryEngine,
    notifier: ErrorNotifier,
    tracking: bool,
}

impl Agent {
    /// Creates an agent over the given host facilities, loading the
    /// offline cache from durable state.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable state facility fails while loading
    /// the offline cache.
    pub fn new(
        config: Config,
        credentials: Arc<CredentialStore>,
        state: Arc<dyn StateStore>,
        host_notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let cache = OfflineCache::load(state, config.cache_limit)?;
        let delivery = DeliveryEngine::new(
            config.api_url.clone(),
            config.auth_url.clone(),
            Arc::clone(&credentials),
        );

        Ok(Self {
            config,
            credentials,
            tracker: SessionTracker::new(),
            queue: RecordQueue::new(),
            cache,
            delivery,
            notifier: ErrorNotifier::new(host_notifier),
            tracking: false,
        })
    }

    /// Returns `true` if tracking is currently enabled.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Returns the number of records awaiting the next delivery attempt.
    #[must_use]
    pub fn queued_records(&self) -> usize {
        self.queue.len()
    }

    /// Returns the number of records in the offline cache.
    #[must_use]
    pub fn cached_records(&self) -> usize {
        self.cache.len()
    }

    /// Enables tracking.
    ///
    /// Requires a stored credential and validates it with the collector
    /// first: an invalid credential is cleared and tracking is refused; a
    /// transport failure refuses tracking without touching the credential.
    /// On success a fresh session ID is generated, the configured project
    /// is registered best-effort, and the offline cache gets an
    /// opportunistic flush.
    ///
    /// Returns `true` if tracking is now enabled.
    ///
    /// # Errors
    ///
    /// Returns an error only if the host secret facility fails.
    pub async fn start_tracking(&mut self) -> Result<bool> {
        if self.tracking {
            return Ok(true);
        }

        let Some(token) = self.credentials.get()? else {
            self.notifier.warn_once(
                "Not logged in to CodePulse. Run 'codepulse-agent login' to start tracking.",
            );
            return Ok(false);
        };

        match self.delivery.validate(&token).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Stored credential rejected by collector, clearing");
                self.credentials.clear()?;
                self.notifier
                    .warn_once("Your CodePulse session has expired. Please log in again.");
                return Ok(false);
            }
            Err(e) => {
                warn!(error = %e, "Credential validation failed");
                self.notifier.warn_once(
                    "Failed to validate CodePulse credentials. Check your connection.",
                );
                return Ok(false);
            }
        }

        self.tracker.reset_session_id();
        self.tracking = true;
        info!(session_id = %self.tracker.session_id(), "Tracking started");
        self.notifier.info("CodePulse activity tracking started");

        self.delivery.register_project(&self.config.project).await;
        self.flush_cache().await;

        Ok(true)
    }

    /// Disables tracking: closes the open session and runs one final
    /// delivery cycle.
    ///
    /// Idempotent; a second stop has no further side effects.
    pub async fn stop_tracking(&mut self) {
        if !self.tracking {
            return;
        }

        if let Some(record) = self.tracker.close(Instant::now()) {
            self.queue.enqueue(record);
        }
        self.deliver_queued().await;

        self.tracking = false;
        info!("Tracking stopped");
        self.notifier.info("CodePulse activity tracking stopped");
    }

    /// Toggles tracking, dispatching to whichever transition applies.
    ///
    /// Returns `true` if tracking is enabled afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error only if the host secret facility fails.
    pub async fn toggle_tracking(&mut self) -> Result<bool> {
        if self.tracking {
            self.stop_tracking().await;
            Ok(false)
        } else {
            self.start_tracking().await
        }
    }

    /// Consumes one editor event. Ignored while tracking is disabled.
    pub fn handle_event(&mut self, event: EditorEvent, now: Instant) {
        if !self.tracking {
            return;
        }

        match event {
            EditorEvent::FileChanged {
                file,
                language,
                project,
            } => {
                let language = detect_language(&file, language.as_deref());
                let project = project.unwrap_or_else(|| self.config.project.clone());
                if let Some(record) = self.tracker.on_file_changed(project, file, language, now) {
                    self.queue.enqueue(record);
                }
            }
            EditorEvent::Edited | EditorEvent::Saved => self.tracker.on_activity(now),
            EditorEvent::FocusChanged { focused: true } => self.tracker.on_activity(now),
            EditorEvent::FocusChanged { focused: false } => {}
        }
    }

    /// One periodic sync cycle. Does nothing while tracking is disabled.
    pub async fn tick(&mut self, now: Instant) {
        if !self.tracking {
            return;
        }

        if let Some(record) = self.tracker.checkpoint(now) {
            debug!(file = %record.file, seconds = record.time_spent_secs, "Matured session slice");
            self.queue.enqueue(record);
        }

        self.deliver_queued().await;
    }

    /// Final flush on process shutdown, independent of the timer and of
    /// the tracking state: closes the session, delivers what is queued,
    /// and gives the offline cache one last opportunistic flush.
    pub async fn shutdown(&mut self) {
        if let Some(record) = self.tracker.close(Instant::now()) {
            self.queue.enqueue(record);
        }
        self.deliver_queued().await;
        self.flush_cache().await;
        self.tracking = false;
        info!("Agent shut down");
    }

    /// Drains the queue and delivers it as one batch. An empty queue ends
    /// the cycle without touching the offline cache.
    async fn deliver_queued(&mut self) {
        let batch = self.queue.drain();
        if batch.is_empty() {
            return;
        }

        if self.delivery.deliver(&batch, &mut self.notifier).await {
            self.flush_cache().await;
        } else if let Err(e) = self.cache.append(batch) {
            warn!(error = %e, "Failed to persist offline cache");
        }
    }

    /// Attempts to deliver the entire offline cache, clearing it on
    /// success.
    async fn flush_cache(&mut self) {
        if self.cache.is_empty() {
            return;
        }

        let records = self.cache.records().to_vec();
        if self.delivery.deliver(&records, &mut self.notifier).await {
            match self.cache.replace_all(Vec::new()) {
                Ok(()) => info!(flushed = records.len(), "Offline cache flushed"),
                Err(e) => warn!(error = %e, "Failed to clear offline cache"),
            }
        }
    }
}
