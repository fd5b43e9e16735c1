//! Standalone stream consumer.
//!
//! Connects to a running replay server, fuses the stream, and writes the
//! detected business events as JSON Lines.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::info;

use sentinel_stream::config::{Config, DEFAULT_HOST, DEFAULT_PORT};
use sentinel_stream::consumer::consume_once;

#[derive(Parser, Debug)]
#[command(name = "stream_consumer")]
#[command(about = "Consume a replay stream and write detection events")]
struct Args {
    /// Replay server host
    #[arg(long, env = "SENTINEL_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Replay server port
    #[arg(long, env = "SENTINEL_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Product weight reference CSV
    #[arg(long, env = "SENTINEL_PRODUCTS_CSV", default_value = "data/input/products_list.csv")]
    products_csv: PathBuf,

    /// Output JSON Lines file for detected events
    #[arg(long, env = "SENTINEL_OUT_FILE", default_value = "results/events.jsonl")]
    out: PathBuf,
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
    let mut config = Config::from_env();
    config.host = args.host;
    config.port = args.port;
    config.products_csv = args.products_csv;
    config.out_file = args.out;
    config.validate()?;

    let report = consume_once(&config).await?;
    info!(
        frames = report.frames_processed,
        events = report.events_emitted,
        "Consumer finished"
    );
    Ok(())
}
