//! Consuming-side stream reader.
//!
//! Reassembles a byte stream into newline-delimited messages and decodes
//! each line independently. A corrupt line is skipped, never fatal: one bad
//! frame must not kill the session. The sequence ends on EOF or when the
//! read timeout elapses, and is not restartable afterwards.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::replay::frame::{Banner, ReplayFrame};

/// A decoded message from the replay stream.
///
/// The banner is surfaced as its own variant so the caller can log it but
/// can never feed it into fusion logic by accident.
#[derive(Debug)]
pub enum Incoming {
    Banner(Banner),
    Frame(ReplayFrame),
}

/// Lazy reader of decoded frames over any byte stream.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    read_timeout: Duration,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, read_timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(inner),
            read_timeout,
            line: String::new(),
        }
    }

    /// Next decoded message, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Incoming> {
        loop {
            self.line.clear();
            let read = timeout(self.read_timeout, self.reader.read_line(&mut self.line)).await;

            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    debug!(error = %e, "Stream read failed, ending session");
                    return None;
                }
                Err(_) => {
                    warn!(timeout_secs = self.read_timeout.as_secs(), "Read timed out, ending session");
                    return None;
                }
            };
            if n == 0 {
                return None; // EOF
            }

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            match decode_line(line) {
                Some(incoming) => return Some(incoming),
                None => continue, // skip the corrupt line, keep the session alive
            }
        }
    }
}

fn decode_line(line: &str) -> Option<Incoming> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Skipping undecodable line");
            return None;
        }
    };

    if value.get("service").is_some() {
        match serde_json::from_value::<Banner>(value) {
            Ok(banner) => return Some(Incoming::Banner(banner)),
            Err(e) => {
                debug!(error = %e, "Skipping malformed banner");
                return None;
            }
        }
    }

    match serde_json::from_value::<ReplayFrame>(value) {
        Ok(frame) => Some(Incoming::Frame(frame)),
        Err(e) => {
            debug!(error = %e, "Skipping malformed frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn collect(input: &str) -> Vec<Incoming> {
        let (mut tx, rx) = tokio::io::duplex(4096);
        tx.write_all(input.as_bytes()).await.unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx, Duration::from_secs(5));
        let mut out = Vec::new();
        while let Some(msg) = reader.next().await {
            out.push(msg);
        }
        out
    }

    fn frame_line(sequence: u64) -> String {
        format!(
            "{{\"dataset\":\"POS_Transactions\",\"sequence\":{},\"timestamp\":\"2025-08-13T16:00:00+00:00\",\"original_timestamp\":null,\"event\":{{\"station_id\":\"SCC1\",\"data\":{{}}}}}}",
            sequence
        )
    }

    #[tokio::test]
    async fn test_banner_then_frames() {
        let banner = "{\"service\":\"project-sentinel-event-stream\",\"datasets\":[],\"events\":2,\"loop\":false,\"speed_factor\":25.0,\"cycle_seconds\":1.0,\"schema\":\"newline-delimited JSON objects\"}";
        let input = format!("{}\n{}\n{}\n", banner, frame_line(1), frame_line(2));

        let messages = collect(&input).await;
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], Incoming::Banner(_)));
        assert!(matches!(&messages[1], Incoming::Frame(f) if f.sequence == 1));
        assert!(matches!(&messages[2], Incoming::Frame(f) if f.sequence == 2));
    }

    #[tokio::test]
    async fn test_corrupt_line_is_skipped() {
        let input = format!("{}\nnot json at all{{\n{}\n", frame_line(1), frame_line(2));

        let messages = collect(&input).await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[1], Incoming::Frame(f) if f.sequence == 2));
    }

    #[tokio::test]
    async fn test_blank_lines_are_discarded() {
        let input = format!("\n\n{}\n\n", frame_line(1));
        let messages = collect(&input).await;
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_read_timeout_ends_sequence() {
        let (_tx, rx) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(rx, Duration::from_millis(50));
        assert!(reader.next().await.is_none());
    }
}
