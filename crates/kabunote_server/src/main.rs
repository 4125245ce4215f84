//! `kabunote-server` entry point.
//!
//! Command-line flags override the matching `KABUNOTE_*` variables; every
//! other setting comes from the environment.

use anyhow::Context;
use clap::Parser;
use kabunote_core::config::{BIND_VAR, DB_PATH_VAR, ENV_VAR, LOG_LEVEL_VAR};
use kabunote_core::{init_logging, Settings};
use kabunote_server::{app, AppState};
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(name = "kabunote-server", version, about = "Serve the kabunote JSON API")]
struct Args {
    /// SQLite database file (`:memory:` for a throwaway database).
    #[arg(long)]
    db: Option<String>,
    /// Listen address, e.g. `127.0.0.1:8000`.
    #[arg(long)]
    bind: Option<String>,
    /// development, testing or production.
    #[arg(long)]
    env: Option<String>,
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overlay(&self, key: &str) -> Option<String> {
        match key {
            DB_PATH_VAR => self.db.clone(),
            BIND_VAR => self.bind.clone(),
            ENV_VAR => self.env.clone(),
            LOG_LEVEL_VAR => self.log_level.clone(),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings =
        Settings::from_lookup(|key| args.overlay(key).or_else(|| std::env::var(key).ok()))
            .context("resolve settings")?;
    init_logging(settings.log_level, settings.log_dir.as_deref()).map_err(anyhow::Error::msg)?;

    let conn = settings.open_database().context("open database")?;
    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("bind {}", settings.bind_addr))?;
    log::info!(
        "event=server_start module=server status=ok env={} addr={}",
        settings.environment.as_str(),
        listener.local_addr()?
    );

    axum::serve(listener, app(AppState::new(conn, settings)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;
    log::info!("event=server_stop module=server status=ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("event=server_signal module=server status=error error={err}");
    }
}
