//! CodePulse Agent - editor activity tracking and sync engine.
//!
//! This binary reads editor events as JSON lines on stdin, tracks per-file
//! coding sessions, and syncs activity records to a CodePulse collector.
//!
//! # Commands
//!
//! - `codepulse-agent login`: Authorize this device with the collector
//! - `codepulse-agent logout`: Remove the stored credential
//! - `codepulse-agent run`: Start the agent
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.
//!
//! [`config`]: codepulse_agent::config

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use codepulse_agent::agent::Agent;
use codepulse_agent::auth::{cancellation, AuthOutcome, DeviceAuthClient, DeviceInfo};
use codepulse_agent::config::Config;
use codepulse_agent::credentials::CredentialStore;
use codepulse_agent::host::{FileSecretStore, FileStateStore, LogNotifier, StateStore};
use codepulse_agent::types::EditorEvent;

/// Subdirectory of the state dir holding the secret store.
const SECRETS_SUBDIR: &str = "secrets";

/// Subdirectory of the state dir holding durable state.
const STATE_SUBDIR: &str = "state";

/// CodePulse Agent - editor activity tracking and sync engine.
///
/// Tracks per-file coding sessions from editor events on stdin and syncs
/// activity records to a CodePulse collector.
#[derive(Parser, Debug)]
#[command(name = "codepulse-agent")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    CODEPULSE_API_URL                Collector API base URL (default: http://localhost:8080/api)
    CODEPULSE_AUTH_URL               Auth endpoint base URL (default: <api>/auth)
    CODEPULSE_SYNC_INTERVAL_MINUTES  Minutes between sync cycles (default: 1)
    CODEPULSE_AUTO_START             Begin tracking at startup (default: false)
    CODEPULSE_STATE_DIR              Secrets and state directory (default: ~/.codepulse)
    CODEPULSE_PROJECT                Fallback project name (default: unknown-project)
    CODEPULSE_CACHE_LIMIT            Maximum offline cache size (default: 1000)

EXAMPLES:
    # Authorize this device
    codepulse-agent login

    # Start the agent with tracking enabled immediately
    export CODEPULSE_AUTO_START=true
    codepulse-agent run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize this device with the collector.
    ///
    /// Requests a device code, prints the verification URL, and polls
    /// until you confirm the device in a browser. Press Ctrl+C to cancel.
    Login,

    /// Remove the stored credential.
    Logout,

    /// Start the agent.
    ///
    /// Reads editor events as JSON lines on stdin and syncs activity
    /// records on a periodic timer.
    Run,
}

/// Tracking commands accepted on stdin alongside editor events.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlCommand {
    StartTracking,
    StopTracking,
    ToggleTracking,
}

/// One line of stdin: either a tracking command or an editor event.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboundMessage {
    Control(ControlCommand),
    Editor(EditorEvent),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Login => runtime.block_on(run_login()),
        Command::Logout => run_logout(),
        Command::Run => runtime.block_on(run_agent()),
    }
}

/// Opens the credential store under the configured state directory.
fn open_credentials(config: &Config) -> Result<Arc<CredentialStore>> {
    let secrets = FileSecretStore::new(config.state_dir.join(SECRETS_SUBDIR))
        .context("Failed to open secret store")?;
    Ok(Arc::new(CredentialStore::new(Arc::new(secrets))))
}

/// Runs the device authorization flow.
async fn run_login() -> Result<()> {
    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;
    let credentials = open_credentials(&config)?;

    let client = DeviceAuthClient::new(config.api_url.clone());
    let device = DeviceInfo::detect();

    let session = client
        .begin(&device)
        .await
        .context("Failed to initiate device authorization")?;

    println!("To authorize this device, open:");
    println!();
    println!("  {}", session.verification_url);
    println!();
    println!(
        "Waiting for confirmation (expires in {} seconds, Ctrl+C to cancel)...",
        session.expires_in.as_secs()
    );

    // Wire Ctrl+C to poll-loop cancellation.
    let (cancel_tx, mut cancel_rx) = cancellation();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    match client.poll(&session, &mut cancel_rx).await {
        AuthOutcome::Authorized { token } => {
            credentials
                .set(&token)
                .context("Failed to store credential")?;
            println!("Device authorized. You are logged in.");
            Ok(())
        }
        AuthOutcome::Rejected { message } => {
            bail!("authorization rejected: {message}");
        }
        AuthOutcome::Expired => {
            bail!("authorization expired before the device was confirmed");
        }
        AuthOutcome::Cancelled => {
            println!("Login cancelled.");
            Ok(())
        }
    }
}

/// Removes the stored credential.
fn run_logout() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let credentials = open_credentials(&config)?;

    credentials.clear().context("Failed to clear credential")?;
    println!("Logged out.");
    Ok(())
}

/// Runs the agent loop.
async fn run_agent() -> Result<()> {
    init_logging();

    info!("Starting CodePulse Agent");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        api_url = %config.api_url,
        sync_interval_secs = config.sync_interval.as_secs(),
        state_dir = %config.state_dir.display(),
        "Configuration loaded"
    );

    let credentials = open_credentials(&config)?;
    let state: Arc<dyn StateStore> = Arc::new(
        FileStateStore::new(config.state_dir.join(STATE_SUBDIR))
            .context("Failed to open state store")?,
    );

    // One-time migration of plaintext tokens left by older releases.
    credentials
        .migrate_legacy(state.as_ref())
        .context("Failed to migrate legacy credential")?;

    let auto_start = config.auto_start;
    let sync_interval = config.sync_interval;

    let mut agent = Agent::new(config, credentials, state, Arc::new(LogNotifier))
        .context("Failed to initialize agent")?;

    if auto_start {
        match agent.start_tracking().await {
            Ok(true) => info!("Auto-start enabled, tracking started"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Auto-start failed"),
        }
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    let mut sync = tokio::time::interval(sync_interval);
    sync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    sync.tick().await;

    info!("Agent running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => handle_line(&mut agent, &line).await,
                    Ok(None) => {
                        info!("Event stream closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read event stream");
                        break;
                    }
                }
            }

            _ = sync.tick() => {
                agent.tick(Instant::now()).await;
            }
        }
    }

    info!("Shutting down...");
    agent.shutdown().await;
    info!("Agent stopped");

    Ok(())
}

/// Dispatches one line of stdin to the agent.
///
/// A failing tracking command (for example, a secret store I/O error) is
/// logged rather than propagated: the run loop must keep going so the
/// shutdown flush still happens.
async fn handle_line(agent: &mut Agent, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<InboundMessage>(line) {
        Ok(InboundMessage::Control(command)) => {
            let result = match command {
                ControlCommand::StartTracking => agent.start_tracking().await.map(|_| ()),
                ControlCommand::StopTracking => {
                    agent.stop_tracking().await;
                    Ok(())
                }
                ControlCommand::ToggleTracking => agent.toggle_tracking().await.map(|_| ()),
            };
            if let Err(e) = result {
                warn!(error = %e, "Tracking command failed");
            }
        }
        Ok(InboundMessage::Editor(event)) => {
            agent.handle_event(event, Instant::now());
        }
        Err(e) => {
            debug!(error = %e, "Ignoring malformed event line");
        }
    }
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;
    use std::time::Duration;

    use codepulse_agent::host::{
        HostError, MemoryNotifier, MemoryStateStore, SecretStore, StateStore,
    };

    /// Secret store whose every operation fails, as when the host's
    /// keychain is unavailable.
    struct FailingSecretStore;

    impl FailingSecretStore {
        fn error() -> HostError {
            HostError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "keychain unavailable",
            ))
        }
    }

    impl SecretStore for FailingSecretStore {
        fn get(&self, _key: &str) -> Result<Option<String>, HostError> {
            Err(Self::error())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), HostError> {
            Err(Self::error())
        }

        fn delete(&self, _key: &str) -> Result<(), HostError> {
            Err(Self::error())
        }
    }

    fn agent_with_failing_secrets() -> Agent {
        let config = Config {
            api_url: "http://127.0.0.1:9".to_string(),
            auth_url: "http://127.0.0.1:9/auth".to_string(),
            sync_interval: Duration::from_secs(60),
            auto_start: false,
            state_dir: PathBuf::from("unused-in-tests"),
            project: "test-project".to_string(),
            cache_limit: 100,
        };

        Agent::new(
            config,
            Arc::new(CredentialStore::new(Arc::new(FailingSecretStore))),
            Arc::new(MemoryStateStore::new()) as Arc<dyn StateStore>,
            Arc::new(MemoryNotifier::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn failing_tracking_command_does_not_end_the_loop() {
        let mut agent = agent_with_failing_secrets();

        // A secret store failure inside start_tracking is logged, not
        // propagated; the dispatch function returns normally so the run
        // loop (and its shutdown flush) survives.
        handle_line(&mut agent, r#"{"type":"start_tracking"}"#).await;
        assert!(!agent.is_tracking());

        handle_line(&mut agent, r#"{"type":"toggle_tracking"}"#).await;
        assert!(!agent.is_tracking());

        // Later lines are still dispatched.
        handle_line(&mut agent, r#"{"type":"stop_tracking"}"#).await;
        handle_line(&mut agent, r#"{"type":"edited"}"#).await;
        handle_line(&mut agent, "not json at all").await;
        assert!(!agent.is_tracking());
    }
}
