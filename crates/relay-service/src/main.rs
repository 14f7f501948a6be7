//! # relay-service
//!
//! Relay server binary: loads settings, opens the message store, and
//! serves the HTTP + WebSocket surface until interrupted.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::logging::init_subscriber;
use relay_server::{ChatService, RelayServer};
use relay_settings::RelaySettings;
use relay_store::sqlite::connection::ConnectionConfig;
use relay_store::{MemoryStore, MessageStore, SqliteStore};
use tracing::info;

/// Real-time message relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Real-time message relay server")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// `SQLite` database path (overrides settings). Without one, messages
    /// are kept in memory.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Result<RelaySettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(relay_settings::settings_path);
        let mut settings = relay_settings::load_settings_from_path(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db_path) = &self.db_path {
            settings.storage.db_path = Some(db_path.display().to_string());
        }
        Ok(settings)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_store(settings: &RelaySettings) -> Result<Arc<dyn MessageStore>> {
    match settings.storage.db_path.as_deref() {
        Some(path) => {
            ensure_parent_dir(Path::new(path))?;
            let store = SqliteStore::open(path, &ConnectionConfig::default())
                .with_context(|| format!("failed to open database: {path}"))?;
            Ok(Arc::new(store))
        }
        None => {
            info!("no database path configured, keeping messages in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = relay_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;
    let store = open_store(&settings)?;
    info!(backend = store.backend(), "message store ready");

    let service = Arc::new(ChatService::start(&settings, store));
    let server = RelayServer::new(&settings, service, metrics);
    let (addr, handle) = server.listen().await.context("failed to bind listener")?;
    info!(%addr, "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("interrupt received, shutting down");
    server.stop(handle).await;
    Ok(())
}
