//! Project Sentinel demo runner.
//!
//! Runs the full pipeline in one process: loads and merges the sensor
//! datasets, starts the replay server, then consumes one replay pass and
//! writes the detected business events to disk. The replay server and the
//! consumer are also available as standalone binaries (`replay_server`,
//! `stream_consumer`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing::{error, info};

use sentinel_stream::config::{Config, DEFAULT_PORT, DEFAULT_SPEED};
use sentinel_stream::consumer::consume_once;
use sentinel_stream::datasets::{load_all, merge_datasets};
use sentinel_stream::replay::ReplayServer;
use sentinel_stream::SentinelError;

#[derive(Parser, Debug)]
#[command(name = "sentinel")]
#[command(about = "Replay retail sensor logs and fuse them into detection events")]
struct Args {
    /// Bind/connect host for the replay stream
    #[arg(long, env = "SENTINEL_HOST")]
    host: Option<String>,

    /// Replay TCP port
    #[arg(long, env = "SENTINEL_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Replay acceleration factor
    #[arg(long, env = "SENTINEL_SPEED", default_value_t = DEFAULT_SPEED)]
    speed: f64,

    /// Repeat the replay forever instead of a single pass
    #[arg(long, env = "SENTINEL_LOOP")]
    r#loop: bool,

    /// Directory holding the dataset files
    #[arg(long, env = "SENTINEL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Product weight reference CSV (defaults to products_list.csv in the data dir)
    #[arg(long, env = "SENTINEL_PRODUCTS_CSV")]
    products_csv: Option<PathBuf>,

    /// Output JSON Lines file for detected events
    #[arg(long, env = "SENTINEL_OUT_FILE")]
    out: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Config {
        let mut cfg = Config::default();
        if let Some(host) = self.host {
            cfg.host = host;
        }
        cfg.port = self.port;
        cfg.speed = self.speed;
        cfg.loop_replay = self.r#loop;
        if let Some(dir) = self.data_dir {
            cfg.products_csv = dir.join("products_list.csv");
            cfg.data_dir = dir;
        }
        if let Some(path) = self.products_csv {
            cfg.products_csv = path;
        }
        if let Some(path) = self.out {
            cfg.out_file = path;
        }
        cfg
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run(Args::parse().into_config()).await {
        error!(error = %e, "Fatal");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    config.validate()?;

    if !config.products_csv.exists() {
        return Err(SentinelError::Configuration(format!(
            "product weight table not found at {}",
            config.products_csv.display()
        ))
        .into());
    }

    let inputs = load_all(&config.data_dir)?;
    let timeline = merge_datasets(inputs)?;
    info!(
        events = timeline.len(),
        datasets = timeline.dataset_names.len(),
        "Timeline merged"
    );

    let listener = TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("binding replay server to {}", config.addr()))?;

    let server = ReplayServer::new(timeline, config.speed, config.loop_replay);
    let server_task = tokio::spawn(server.serve(listener));

    // Let the accept loop come up before dialing it.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let report = consume_once(&config).await?;
    info!(
        frames = report.frames_processed,
        events = report.events_emitted,
        out = %config.out_file.display(),
        "Demo run complete"
    );

    server_task.abort();
    Ok(())
}
