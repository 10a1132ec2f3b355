pub mod config;
pub mod db;
pub mod detection;
pub mod metrics;
pub mod models;
pub mod relay;
pub mod session;
mod utils;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use db::Database;
use relay::RelayState;

/// Reads `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub port: u16,
    /// `None` disables the archive.
    pub db_path: Option<PathBuf>,
}

/// Runs the relay until Ctrl-C.
pub async fn run_relay(options: RelayOptions) -> Result<()> {
    log::info!("classwatch relay starting up...");

    let database = match &options.db_path {
        Some(path) => Some(Database::new(path.clone())?),
        None => {
            log::info!("archive disabled");
            None
        }
    };

    let state = RelayState::new(database);
    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("shutdown requested");
        }
        signal.cancel();
    });

    relay::serve(listener, state, shutdown).await
}
