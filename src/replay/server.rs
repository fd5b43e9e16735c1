//! Temporal replay server.
//!
//! Serves the merged timeline over TCP as newline-delimited JSON, pacing
//! emissions so inter-frame wall-clock gaps equal the original inter-event
//! gaps divided by the speed factor. Each accepted connection gets an
//! independent replay session over the same immutable timeline: sessions
//! share no cursor state, so no locking is needed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::datasets::MergedTimeline;
use crate::replay::frame::{Banner, ReplayFrame};

/// Wall-clock seconds to wait before emitting a frame whose adjusted
/// timestamp is `delta_seconds` after the previous one.
///
/// Out-of-order or duplicate timestamps would yield a non-positive gap; a
/// minimum positive gap is substituted so the loop always makes forward
/// progress without busy-spinning.
pub fn pacing_gap(delta_seconds: f64, speed: f64) -> f64 {
    let gap = if speed > 0.0 { delta_seconds / speed } else { 0.0 };
    if gap <= 0.0 {
        0.1 / speed.max(1.0)
    } else {
        gap
    }
}

/// TCP replay server over an immutable merged timeline.
pub struct ReplayServer {
    timeline: Arc<MergedTimeline>,
    speed: f64,
    loop_replay: bool,
}

impl ReplayServer {
    pub fn new(timeline: MergedTimeline, speed: f64, loop_replay: bool) -> Arc<Self> {
        Arc::new(Self {
            timeline: Arc::new(timeline),
            speed,
            loop_replay,
        })
    }

    /// Accept connections forever, serving each in its own task.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(
            addr = %listener.local_addr()?,
            events = self.timeline.len(),
            speed = self.speed,
            looping = self.loop_replay,
            cycle_seconds = cycle_seconds(&self.timeline),
            "Replay server listening"
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            info!(%peer, "Client connected");
            let server = self.clone();
            tokio::spawn(async move {
                // A broken connection ends this session only; concurrent
                // sessions keep replaying.
                if let Err(e) = server.replay_connection(stream).await {
                    debug!(%peer, error = %e, "Client disconnected mid-replay");
                }
                info!(%peer, "Stream ended");
            });
        }
    }

    /// Replay the full schedule to one connection.
    async fn replay_connection(&self, mut stream: TcpStream) -> Result<()> {
        let banner = Banner::new(
            self.timeline.dataset_names.clone(),
            self.timeline.len(),
            self.loop_replay,
            self.speed,
            cycle_seconds(&self.timeline),
        );
        send_line(&mut stream, &serde_json::to_string(&banner)?).await?;

        let mut loop_index: i32 = 0;
        let mut prev: Option<DateTime<Utc>> = None;
        let mut sequence: u64 = 1;

        loop {
            debug!(cycle = loop_index + 1, "Starting replay cycle");
            for record in &self.timeline.events {
                let adjusted = record.timestamp + self.timeline.cycle_span * loop_index;

                if let Some(prev_ts) = prev {
                    let delta = (adjusted - prev_ts).num_milliseconds() as f64 / 1000.0;
                    let gap = pacing_gap(delta, self.speed);
                    tokio::time::sleep(Duration::from_secs_f64(gap)).await;
                }
                prev = Some(adjusted);

                let frame =
                    ReplayFrame::new(record.dataset.as_str(), sequence, adjusted, &record.payload);
                send_line(&mut stream, &serde_json::to_string(&frame)?).await?;
                sequence += 1;
            }

            if !self.loop_replay {
                debug!("Loop disabled, ending stream");
                return Ok(());
            }
            loop_index += 1;
        }
    }
}

fn cycle_seconds(timeline: &MergedTimeline) -> f64 {
    timeline.cycle_span.num_milliseconds() as f64 / 1000.0
}

async fn send_line(stream: &mut TcpStream, line: &str) -> Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_gap_scales_by_speed() {
        assert_eq!(pacing_gap(10.0, 25.0), 0.4);
        assert_eq!(pacing_gap(2.0, 1.0), 2.0);
    }

    #[test]
    fn test_pacing_gap_substitutes_minimum_for_nonpositive_delta() {
        // Duplicate timestamp
        assert_eq!(pacing_gap(0.0, 25.0), 0.1 / 25.0);
        // Out-of-order timestamp
        assert_eq!(pacing_gap(-3.0, 25.0), 0.1 / 25.0);
        // Slow replay still bounded by 0.1s
        assert_eq!(pacing_gap(0.0, 0.5), 0.1);
    }
}
