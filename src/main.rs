//! sessiond - account and avatar session server.
//!
//! Bridges the session dispatcher over stdio: newline-delimited JSON
//! `Inbound` messages on stdin, one JSON `FabricCommand` per line on stdout.
//! Logs go to stderr.

use anyhow::Context;
use avatar_sessions::config::{Config, LogFormat};
use avatar_sessions::fabric::{ChannelFabric, FabricCommand};
use avatar_sessions::metrics;
use avatar_sessions::namedb::AccountNameDb;
use avatar_sessions::protocol::Inbound;
use avatar_sessions::store::SqliteRecordStore;
use avatar_sessions::{DispatcherParams, SessionDispatcher};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config first: it decides the log format.
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    init_tracing(config.logging.format);
    info!(server = %config.server.name, config = %config_path, "Starting sessiond");
    if config.server.ephemeral_secret {
        warn!(
            "No login_secret configured - using ephemeral random secret. \
             Login digests will NOT verify across server restarts."
        );
    }

    metrics::init();

    let store = SqliteRecordStore::connect(&config.database.path)
        .await
        .with_context(|| format!("failed to open record store {}", config.database.path))?;
    info!(path = %config.database.path, "Record store ready");

    let namedb = AccountNameDb::open(&config.namedb.path)
        .with_context(|| format!("failed to open name database {}", config.namedb.path))?
        .with_auto_approve(config.moderation.auto_approve);
    info!(
        path = %config.namedb.path,
        auto_approve = config.moderation.auto_approve,
        "Name database ready"
    );

    let (fabric, commands) = ChannelFabric::new();
    let params = DispatcherParams::from_config(&config, Arc::new(store), Arc::new(fabric), namedb)?;
    let dispatcher = SessionDispatcher::new(params)?;

    let writer = tokio::spawn(write_commands(commands));

    tokio::select! {
        result = read_inbound(Arc::clone(&dispatcher)) => match result {
            Ok(()) => info!("Input closed, shutting down"),
            Err(e) => error!(error = %e, "Input failed, shutting down"),
        },
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    debug!(in_flight = dispatcher.in_flight(), metrics = %metrics::gather_metrics(), "Final state");
    writer.abort();
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Feed stdin lines to the dispatcher until EOF.
async fn read_inbound(dispatcher: Arc<SessionDispatcher>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let inbound: Inbound = match serde_json::from_str(line) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "Discarding malformed input line");
                continue;
            }
        };
        match inbound {
            Inbound::Request { sender, request } => {
                dispatcher.handle(sender, request);
            }
            Inbound::Disconnect { connection } => dispatcher.connection_lost(connection),
            Inbound::SetNameStatus { avatar_id, status } => {
                let dispatcher = Arc::clone(&dispatcher);
                let result =
                    tokio::task::spawn_blocking(move || dispatcher.set_name_status(avatar_id, status))
                        .await?;
                if let Err(e) = result {
                    warn!(avatar_id, error = %e, "Failed to record name verdict");
                }
            }
        }
    }
    Ok(())
}

/// Write every fabric command to stdout as one JSON line.
async fn write_commands(mut commands: mpsc::UnboundedReceiver<FabricCommand>) {
    let mut stdout = tokio::io::stdout();
    while let Some(command) = commands.recv().await {
        let mut line = match serde_json::to_vec(&command) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to encode fabric command");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdout.write_all(&line).await {
            error!(error = %e, "Failed to write fabric command");
            return;
        }
        if let Err(e) = stdout.flush().await {
            error!(error = %e, "Failed to flush fabric output");
            return;
        }
    }
}
