use clap::Parser;
use std::path::PathBuf;

use classwatch_lib::{init_logging, run_relay, RelayOptions};

/// Relay between student monitors and the teacher dashboard.
#[derive(Debug, Parser)]
#[command(name = "classwatch", version)]
struct Args {
    /// HTTP/WebSocket port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// SQLite file for archived subjects
    #[arg(long, env = "CLASSWATCH_DB", default_value = "classwatch.sqlite3")]
    db_path: PathBuf,

    /// Keep nothing after a subject disconnects
    #[arg(long)]
    no_archive: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    run_relay(RelayOptions {
        port: args.port,
        db_path: (!args.no_archive).then_some(args.db_path),
    })
    .await
}
