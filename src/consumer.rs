//! Stream consumer: one full pass over a replay session.
//!
//! Connects to the replay server, routes each frame into the fusion engine
//! by dataset, and writes the resulting business events as JSON Lines. The
//! pass ends when the server closes the stream or the read timeout elapses.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::Config;
use crate::datasets::{DatasetId, ProductWeightTable};
use crate::events::{EventMapper, JsonlSink};
use crate::fusion::{FusionConfig, FusionEngine};
use crate::replay::ReplayFrame;
use crate::stream::{FrameReader, Incoming};

/// Outcome of one consuming pass.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerReport {
    pub frames_processed: u64,
    pub events_emitted: u64,
}

/// Consume one replay session end to end.
pub async fn consume_once(config: &Config) -> Result<ConsumerReport> {
    let weights = ProductWeightTable::load(&config.products_csv);
    if weights.is_empty() {
        debug!("Product weight table is empty, weight rule will not fire");
    }
    let mut fusion = FusionEngine::new(
        weights,
        FusionConfig {
            vision_confidence: config.vision_confidence,
            weight_tolerance: config.weight_tolerance,
            max_stations: config.max_stations,
        },
    );
    let mut mapper = EventMapper::new(JsonlSink::create(&config.out_file)?);

    let addr = config.addr();
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to replay server at {addr}"))?;
    info!(%addr, "Connected to replay server");

    let mut reader = FrameReader::new(stream, Duration::from_secs(config.read_timeout_secs));
    let mut frames: u64 = 0;

    while let Some(incoming) = reader.next().await {
        match incoming {
            Incoming::Banner(banner) => {
                info!(
                    datasets = ?banner.datasets,
                    events = banner.events,
                    speed = banner.speed_factor,
                    looping = banner.loop_replay,
                    "Replay session opened"
                );
            }
            Incoming::Frame(frame) => {
                handle_frame(&frame, &mut fusion, &mut mapper)?;
                frames += 1;
            }
        }
    }

    let events = mapper.events_emitted();
    let sink = mapper.into_sink();
    sink.log_summary();
    info!(frames, "Stream closed");

    Ok(ConsumerReport {
        frames_processed: frames,
        events_emitted: events,
    })
}

/// Route one frame into fusion and mapping.
///
/// Frames from unrecognized datasets are counted but otherwise ignored, so
/// a server that adds a new dataset does not break older consumers.
fn handle_frame(
    frame: &ReplayFrame,
    fusion: &mut FusionEngine,
    mapper: &mut EventMapper,
) -> Result<()> {
    let Some(dataset) = DatasetId::from_name(&frame.dataset) else {
        debug!(dataset = %frame.dataset, "Ignoring frame from unknown dataset");
        return Ok(());
    };

    let station = frame
        .event
        .get("station_id")
        .and_then(Value::as_str)
        .unwrap_or("SCC?");
    let status = frame.event.get("status").and_then(Value::as_str);
    let data = frame.event.get("data");

    match dataset {
        DatasetId::PointOfSale => {
            fusion.observe_pos(station, decode_data(data));
            let result = fusion.compute_score(station);
            mapper.inspect_status(station, status)?;
            let last_pos = fusion.last_pos(station).cloned();
            mapper.from_fusion(station, &result, last_pos.as_ref())?;
        }
        DatasetId::Rfid => {
            fusion.observe_rfid(station, decode_data(data));
        }
        DatasetId::VisionRecognition => {
            fusion.observe_vision(station, decode_data(data));
            let result = fusion.compute_score(station);
            mapper.inspect_status(station, status)?;
            let last_pos = fusion.last_pos(station).cloned();
            mapper.from_fusion(station, &result, last_pos.as_ref())?;
        }
        DatasetId::QueueMonitor => {
            fusion.set_queue(station, decode_data(data));
            let queue = fusion.queue(station).cloned();
            mapper.inspect_queue(station, queue.as_ref())?;
        }
        DatasetId::InventorySnapshot => {
            // Snapshots pass through the stream but feed no rule yet.
        }
    }
    Ok(())
}

/// Decode a frame's `data` object into a typed record, tolerating missing
/// or malformed payloads by falling back to an empty record.
fn decode_data<T: DeserializeOwned + Default>(data: Option<&Value>) -> T {
    data.cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}
