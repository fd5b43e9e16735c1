//! Standalone replay server.
//!
//! Serves the merged timeline over TCP until killed. Pair it with the
//! `stream_consumer` binary, `nc`, or any newline-delimited JSON client.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;

use sentinel_stream::config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SPEED};
use sentinel_stream::datasets::{load_all, merge_datasets};
use sentinel_stream::replay::ReplayServer;

#[derive(Parser, Debug)]
#[command(name = "replay_server")]
#[command(about = "Serve merged sensor datasets over TCP with speed-scaled pacing")]
struct Args {
    /// Bind host
    #[arg(long, env = "SENTINEL_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Bind port
    #[arg(long, env = "SENTINEL_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Replay acceleration factor
    #[arg(long, env = "SENTINEL_SPEED", default_value_t = DEFAULT_SPEED)]
    speed: f64,

    /// Repeat the replay forever, shifting timestamps forward each cycle
    #[arg(long, env = "SENTINEL_LOOP")]
    r#loop: bool,

    /// Directory holding the dataset files
    #[arg(long, env = "SENTINEL_DATA_DIR", default_value = "data/input")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    if args.speed <= 0.0 {
        anyhow::bail!("replay speed must be > 0, got {}", args.speed);
    }

    let inputs = load_all(&args.data_dir)?;
    let timeline = merge_datasets(inputs)?;

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding replay server to {addr}"))?;

    ReplayServer::new(timeline, args.speed, args.r#loop)
        .serve(listener)
        .await
}
