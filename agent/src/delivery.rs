//! Delivery of activity records to the collector.
//!
//! The [`DeliveryEngine`] implements the batch-then-per-record policy:
//! one request carrying the full list goes to the batch endpoint; if the
//! endpoint is missing (404) or the request fails, each record is
//! dispatched independently and the per-record outcomes are aggregated.
//!
//! # All-or-nothing contract
//!
//! `deliver` reports success only when every record landed. Partial
//! per-record success still reports failure, and the caller re-queues the
//! entire batch. Some records may therefore reach the collector twice;
//! de-duplication by record `id` is the collector's responsibility.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::notifier::ErrorNotifier;
use crate::types::ActivityRecord;

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur during delivery or validation calls.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error status.
    #[error("server error: {status}")]
    Server { status: u16 },
}

/// HTTP client for the collector's activity and auth endpoints.
pub struct DeliveryEngine {
    client: Client,
    api_url: String,
    auth_url: String,
    credentials: Arc<CredentialStore>,
}

impl DeliveryEngine {
    /// Creates an engine for the given collector endpoints.
    #[must_use]
    pub fn new(api_url: String, auth_url: String, credentials: Arc<CredentialStore>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url,
            auth_url,
            credentials,
        }
    }

    /// Delivers a batch of records, returning `true` only if every record
    /// landed.
    ///
    /// Without a stored credential no network call is made: the records
    /// are not deliverable and the user is warned (rate limited).
    pub async fn deliver(&self, records: &[ActivityRecord], notifier: &mut ErrorNotifier) -> bool {
        if records.is_empty() {
            return true;
        }

        let token = match self.credentials.get() {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!("No credential configured, skipping delivery");
                notifier.warn_once(
                    "Not logged in to CodePulse. Activity is kept locally until you log in.",
                );
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read credential, skipping delivery");
                return false;
            }
        };

        if self.send_batch(records, &token).await {
            return true;
        }

        if self.send_individually(records, &token).await {
            return true;
        }

        notifier.warn_once("Failed to sync activity data to CodePulse.");
        false
    }

    /// Attempts the batch endpoint. Returns `false` on any failure,
    /// including a 404 from a collector without batch support; the caller
    /// falls back to per-record dispatch either way.
    async fn send_batch(&self, records: &[ActivityRecord], token: &str) -> bool {
        let url = format!("{}/activities/batch", self.api_url);

        debug!(url = %url, records = records.len(), "Sending activity batch");

        match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(records)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(records = records.len(), "Delivered records via batch endpoint");
                true
            }
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                debug!("Batch endpoint not available, falling back to per-record dispatch");
                false
            }
            Ok(response) => {
                warn!(
                    status = response.status().as_u16(),
                    "Batch request failed, falling back to per-record dispatch"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "Batch request failed, falling back to per-record dispatch");
                false
            }
        }
    }

    /// Dispatches each record as an independent concurrent request and
    /// waits for all outcomes. Succeeds only if zero records failed.
    async fn send_individually(&self, records: &[ActivityRecord], token: &str) -> bool {
        let outcomes = join_all(
            records
                .iter()
                .map(|record| self.send_single(record, token)),
        )
        .await;

        let failures = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if failures == 0 {
            info!(records = records.len(), "Delivered records individually");
            true
        } else {
            warn!(
                failed = failures,
                total = records.len(),
                "Per-record dispatch incomplete"
            );
            false
        }
    }

    /// Sends one record to the single-activity endpoint.
    async fn send_single(&self, record: &ActivityRecord, token: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/activities", self.api_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(record)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Server {
                status: response.status().as_u16(),
            })
        }
    }

    /// Validates a bearer token against the auth endpoint.
    ///
    /// Returns `Ok(false)` for any non-2xx response, meaning the token is
    /// expired or invalid and should be cleared.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Http` on transport failure, which says
    /// nothing about token validity.
    pub async fn validate(&self, token: &str) -> Result<bool, DeliveryError> {
        let url = format!("{}/validate", self.auth_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    /// Registers a project with the collector, best effort.
    ///
    /// Failure (for example, the project already exists) is logged and
    /// otherwise ignored.
    pub async fn register_project(&self, name: &str) {
        let token = match self.credentials.get() {
            Ok(Some(token)) => token,
            _ => return,
        };

        let url = format!("{}/projects", self.api_url);
        let body = serde_json::json!({ "name": name });

        match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(project = name, "Registered project");
            }
            Ok(response) => {
                debug!(
                    project = name,
                    status = response.status().as_u16(),
                    "Project registration declined"
                );
            }
            Err(e) => {
                debug!(project = name, error = %e, "Project registration failed");
            }
        }
    }
}
