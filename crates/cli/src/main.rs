//! Threatfeed CLI - main entry point

mod args;

use anyhow::{bail, Context};
use args::{Cli, Command};
use clap::Parser;
use std::path::PathBuf;
use threatfeed_core::ClientConfig;
use threatfeed_engine::{LiveSession, MergedState, SessionDeps};
use threatfeed_networking::ThreatApiClient;
use threatfeed_persistence::CredentialStore;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "threatfeed=info,threatfeed_engine=info,threatfeed_networking=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env().context("invalid THREATFEED_* environment")?;
    if let Some(base) = &cli.api_base {
        config.api_base = base.trim_end_matches('/').to_string();
    }
    if let Some(url) = &cli.ws_url {
        config.ws_endpoint = url.clone();
    }
    config.validate()?;

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let store = CredentialStore::in_dir(&data_dir)?;

    match cli.command {
        Command::Watch { no_notify } => {
            let token = resolve_token(cli.token, &store).await;
            watch(&config, token, !no_notify).await
        }
        Command::Status => {
            let token = resolve_token(cli.token, &store).await;
            status(&config, token).await
        }
        Command::Login => {
            let Some(token) = cli.token else {
                bail!("login needs --token <TOKEN> (or THREATFEED_TOKEN)");
            };
            store.save(&token).await?;
            println!("Credential stored at {}", store.path().display());
            Ok(())
        }
        Command::Logout => {
            store.clear().await?;
            println!("Credential removed");
            Ok(())
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_local_dir()
        .map(|p| p.join("threatfeed"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Explicit token first, then the stored credential
async fn resolve_token(explicit: Option<String>, store: &CredentialStore) -> Option<String> {
    if let Some(token) = explicit.filter(|t| !t.trim().is_empty()) {
        return Some(token);
    }
    match store.load().await {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable stored credential");
            None
        }
    }
}

async fn watch(config: &ClientConfig, token: Option<String>, notify: bool) -> anyhow::Result<()> {
    if token.is_none() {
        warn!("No credential, live updates will stay disabled (run `threatfeed login --token <TOKEN>`)");
    }

    let mut deps = SessionDeps::new(token);
    deps.notifications.enabled = notify;

    let session = LiveSession::mount(config, deps)?;
    let max_attempts = session.connection().max_attempts();
    let mut transitions = session.connection().transitions();
    let mut state_rx = session.watch_state();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            status = transitions.recv() => match status {
                Ok(status) => {
                    if status.is_failed() {
                        warn!(status = %status.label(max_attempts), "Live updates stopped");
                    } else {
                        info!(status = %status.label(max_attempts), "Connection status");
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Status receiver lagged"),
                Err(RecvError::Closed) => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                log_summary(&state);
            }
        }
    }

    session.unmount().await;
    Ok(())
}

fn log_summary(state: &MergedState) {
    info!(
        alerts = state.alerts.len(),
        new_alerts = state.new_alert_ids.len(),
        events = state.events.len(),
        users = state.risk_by_user.len(),
        pipeline_active = state.pipeline.as_ref().map(|p| p.pipeline_active),
        "Merged view updated"
    );

    for alert in state.alerts.iter().take(5) {
        debug!(
            alert_id = %alert.alert_id,
            severity = alert.effective_severity().as_str(),
            new = state.is_new(&alert.alert_id),
            created_at = %alert.created_at,
            "{}",
            alert.summary
        );
    }
}

async fn status(config: &ClientConfig, token: Option<String>) -> anyhow::Result<()> {
    let client = ThreatApiClient::new(&config.api_base, token.as_deref().unwrap_or_default())?;

    match client.websocket_status().await {
        Ok(ws) => println!(
            "live-update server: {} connection(s), users: {}",
            ws.active_connections,
            ws.connected_users.join(", ")
        ),
        Err(e) => warn!(error = %e, "Live-update server status unavailable"),
    }

    let pipeline = client
        .pipeline_status()
        .await
        .context("failed to fetch pipeline status")?;
    println!("{}", serde_json::to_string_pretty(&pipeline)?);
    Ok(())
}
