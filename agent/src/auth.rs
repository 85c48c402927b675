//! Device authorization flow.
//!
//! Credential acquisition is out of band: the agent requests a device code,
//! the user confirms it in a browser, and the agent polls the token
//! endpoint until one of four terminal outcomes:
//!
//! - `Authorized`: the server returned a token (HTTP 200 with a token field)
//! - `Rejected`: the server answered with a protocol error (any other
//!   non-2xx); polling stops immediately
//! - `Expired`: the authorization lifetime elapsed with no decision
//! - `Cancelled`: the caller cancelled the flow
//!
//! Transport failures are deliberately not terminal: protocol-level
//! rejection ends the flow, connectivity loss is retried at the next poll.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// HTTP request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while initiating device authorization.
#[derive(Error, Debug)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server declined to start the flow.
    #[error("failed to initiate device authorization: {status}")]
    Server { status: u16 },
}

/// Identity of this agent installation, sent when requesting a device code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name shown on the confirmation page.
    pub device_name: String,

    /// Client type identifier.
    pub device_type: String,

    /// Unique device identifier.
    pub device_id: String,
}

impl DeviceInfo {
    /// Builds device identity from the local platform and hostname.
    #[must_use]
    pub fn detect() -> Self {
        let hostname = gethostname::gethostname()
            .into_string()
            .unwrap_or_else(|_| "unknown".to_string());
        let platform = std::env::consts::OS;

        Self {
            device_name: format!("{platform} - {hostname}"),
            device_type: "editor-agent".to_string(),
            device_id: format!("{platform}-{hostname}-{}", chrono::Utc::now().timestamp_millis()),
        }
    }
}

/// One in-flight authorization attempt.
///
/// Lives from [`DeviceAuthClient::begin`] until the poll loop resolves.
#[derive(Debug, Clone)]
pub struct DeviceAuthSession {
    /// Opaque code identifying this attempt to the collector.
    pub device_code: String,

    /// URL the user must open to confirm the device.
    pub verification_url: String,

    /// Lifetime of the attempt.
    pub expires_in: Duration,

    /// Cadence at which the token endpoint should be polled.
    pub poll_interval: Duration,
}

/// Terminal outcome of one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The user confirmed the device; the token authorizes delivery.
    Authorized {
        /// Bearer token to store in the credential store.
        token: String,
    },

    /// The server rejected the attempt.
    Rejected {
        /// Server-provided error message.
        message: String,
    },

    /// The attempt outlived `expires_in` without a decision.
    Expired,

    /// The caller cancelled the flow.
    Cancelled,
}

/// Wire response from the device code endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceCodeResponse {
    device_code: String,
    verification_url: String,
    expires_in: u64,
    interval: u64,
}

/// Wire response from the token endpoint. The collector has used both
/// field names across versions.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
    token: Option<String>,
}

/// Wire error body from the token endpoint.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

/// One poll of the token endpoint.
#[derive(Debug)]
enum TokenPoll {
    Authorized(String),
    Pending,
    Rejected(String),
}

/// HTTP client for the device authorization endpoints.
pub struct DeviceAuthClient {
    client: Client,
    api_url: String,
}

impl DeviceAuthClient {
    /// Creates a client for the given collector API base URL.
    #[must_use]
    pub fn new(api_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, api_url }
    }

    /// Requests a device code, starting a new authorization attempt.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the request fails or the server declines.
    pub async fn begin(&self, device: &DeviceInfo) -> Result<DeviceAuthSession, AuthError> {
        let url = format!("{}/auth/device", self.api_url);

        let response = self.client.post(&url).json(device).send().await?;

        if !response.status().is_success() {
            return Err(AuthError::Server {
                status: response.status().as_u16(),
            });
        }

        let body: DeviceCodeResponse = response.json().await?;

        info!(
            verification_url = %body.verification_url,
            expires_in_secs = body.expires_in,
            "Device authorization initiated"
        );

        Ok(DeviceAuthSession {
            device_code: body.device_code,
            verification_url: body.verification_url,
            expires_in: Duration::from_secs(body.expires_in),
            poll_interval: Duration::from_secs(body.interval.max(1)),
        })
    }

    /// Polls the token endpoint until the attempt resolves.
    ///
    /// `cancel` is an external cancellation signal: when it flips to
    /// `true`, polling stops and the flow resolves with
    /// [`AuthOutcome::Cancelled`] instead of being left pending.
    pub async fn poll(
        &self,
        session: &DeviceAuthSession,
        cancel: &mut watch::Receiver<bool>,
    ) -> AuthOutcome {
        let deadline = Instant::now() + session.expires_in;

        loop {
            if *cancel.borrow() {
                info!("Device authorization cancelled");
                return AuthOutcome::Cancelled;
            }

            if Instant::now() >= deadline {
                info!("Device authorization expired");
                return AuthOutcome::Expired;
            }

            match self.request_token(&session.device_code).await {
                Ok(TokenPoll::Authorized(token)) => {
                    info!("Device authorization confirmed");
                    return AuthOutcome::Authorized { token };
                }
                Ok(TokenPoll::Pending) => {
                    debug!("Authorization pending");
                }
                Ok(TokenPoll::Rejected(message)) => {
                    warn!(message = %message, "Device authorization rejected");
                    return AuthOutcome::Rejected { message };
                }
                Err(e) => {
                    // Connectivity loss is transient; keep polling.
                    warn!(error = %e, "Token poll failed, retrying");
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let nap = session.poll_interval.min(remaining);

            tokio::select! {
                _ = sleep(nap) => {}
                changed = cancel.changed() => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            info!("Device authorization cancelled");
                            return AuthOutcome::Cancelled;
                        }
                        // Spurious change or dropped sender: finish the nap.
                        _ => sleep(nap).await,
                    }
                }
            }
        }
    }

    /// One request against the token endpoint.
    async fn request_token(&self, device_code: &str) -> Result<TokenPoll, reqwest::Error> {
        let url = format!("{}/auth/device/token", self.api_url);
        let body = serde_json::json!({ "deviceCode": device_code });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if status == StatusCode::OK {
            let token: Option<String> = response
                .json::<TokenResponse>()
                .await
                .ok()
                .and_then(|body| body.access_token.or(body.token))
                .filter(|token| !token.is_empty());

            // A 200 without a token field is treated as still pending.
            return Ok(match token {
                Some(token) => TokenPoll::Authorized(token),
                None => TokenPoll::Pending,
            });
        }

        if status == StatusCode::ACCEPTED {
            return Ok(TokenPoll::Pending);
        }

        if status.is_success() {
            return Ok(TokenPoll::Pending);
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| format!("polling failed with status {}", status.as_u16()));

        Ok(TokenPoll::Rejected(message))
    }
}

/// Creates a cancellation pair for a poll loop.
///
/// Flip the sender to `true` to cancel.
#[must_use]
pub fn cancellation() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_detect_populates_fields() {
        let info = DeviceInfo::detect();
        assert!(!info.device_name.is_empty());
        assert_eq!(info.device_type, "editor-agent");
        assert!(info.device_id.contains(std::env::consts::OS));
    }

    #[test]
    fn device_info_serializes_to_camel_case() {
        let info = DeviceInfo {
            device_name: "linux - host".to_string(),
            device_type: "editor-agent".to_string(),
            device_id: "linux-host-1".to_string(),
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["deviceName"], "linux - host");
        assert_eq!(json["deviceType"], "editor-agent");
        assert_eq!(json["deviceId"], "linux-host-1");
    }

    #[test]
    fn token_response_accepts_both_field_names() {
        let by_access_token: TokenResponse =
            serde_json::from_str(r#"{"accessToken":"tok-a"}"#).unwrap();
        assert_eq!(by_access_token.access_token.as_deref(), Some("tok-a"));

        let by_token: TokenResponse = serde_json::from_str(r#"{"token":"tok-b"}"#).unwrap();
        assert_eq!(by_token.token.as_deref(), Some("tok-b"));
    }
}
