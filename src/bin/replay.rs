//! Feeds recorded detector output (JSON lines) through a monitoring session
//! and ships the resulting updates to a relay.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use classwatch_lib::{
    config::{MonitorSettings, SettingsStore},
    init_logging,
    metrics::MetricsCollector,
    models::{DetectorOutput, ViolationKind},
    relay::{default_name, RelayClient},
    session::{MonitorController, SubjectInfo},
};

#[derive(Debug, Parser)]
#[command(name = "classwatch-replay", version)]
struct Args {
    /// JSON-lines file of detector output, `-` for stdin
    input: PathBuf,

    #[arg(long)]
    subject_id: Option<String>,

    #[arg(long)]
    name: Option<String>,

    /// Settings JSON; defaults apply when missing
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Overrides the relay URL from settings
    #[arg(long)]
    relay_url: Option<String>,

    /// Sleep between face frames to match their timestamps
    #[arg(long)]
    realtime: bool,

    /// Remove the subject from the relay when the replay ends
    #[arg(long)]
    remove_on_exit: bool,
}

fn load_settings(args: &Args) -> Result<MonitorSettings> {
    let mut settings = match &args.settings {
        Some(path) => SettingsStore::new(path.clone())?.settings(),
        None => MonitorSettings::default(),
    };
    if let Some(url) = &args.relay_url {
        settings.relay_url = url.clone();
    }
    settings.validate()?;
    Ok(settings)
}

async fn open_input(path: &PathBuf) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(file))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let settings = load_settings(&args)?;

    let subject_id = args
        .subject_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let name = args.name.clone().unwrap_or_else(|| default_name(&subject_id));

    let client = Arc::new(RelayClient::new(
        &settings.relay_url,
        Duration::from_millis(settings.session.emit_timeout_ms),
    )?);
    let metrics = MetricsCollector::new();
    let mut controller = MonitorController::new(Arc::clone(&client), metrics.clone());
    let mut feed = controller.start(SubjectInfo::new(subject_id.clone(), name), &settings)?;

    info!("replaying {} as {} into {}", args.input.display(), subject_id, settings.relay_url);

    let mut lines = BufReader::new(open_input(&args.input).await?).lines();
    let mut line_no = 0usize;
    let mut skipped = 0usize;
    let mut last_face_ts: Option<i64> = None;

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let output: DetectorOutput = match serde_json::from_str(&line) {
            Ok(output) => output,
            Err(err) => {
                warn!("line {line_no}: skipping malformed detector output: {err}");
                skipped += 1;
                continue;
            }
        };

        if args.realtime {
            if let DetectorOutput::Face { timestamp_ms, .. } = &output {
                if let Some(previous) = last_face_ts {
                    let gap = (*timestamp_ms - previous).max(0) as u64;
                    tokio::time::sleep(Duration::from_millis(gap)).await;
                }
                last_face_ts = Some(*timestamp_ms);
            }
        }

        feed.send(output).await?;
    }

    let frames = feed.frame_count();
    drop(feed);
    let state = controller
        .finish()
        .await?
        .context("monitoring session was not running")?;

    if args.remove_on_exit {
        match client.remove_subject(&subject_id).await {
            Ok(true) => info!("removed {subject_id} from relay"),
            Ok(false) => warn!("relay did not know {subject_id}"),
            Err(err) => warn!("failed to remove {subject_id}: {err:?}"),
        }
    }

    let snapshot = metrics.get_snapshot().await;
    let summary = serde_json::json!({
        "subjectId": subject_id,
        "faceFrames": frames,
        "skippedLines": skipped,
        "leftDesk": state.left_desk_count,
        "lookedDown": state.looked_down_count,
        "returned": state.count_of(ViolationKind::Returned),
        "emissionsSent": snapshot.emissions_sent,
        "emissionsFailed": snapshot.emissions_failed,
        "emissionsSkipped": snapshot.emissions_skipped,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
