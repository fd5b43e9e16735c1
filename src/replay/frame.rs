//! Wire protocol for the replay stream.
//!
//! Newline-delimited JSON objects over TCP. The first message on every
//! connection is a banner describing the session; all subsequent messages
//! are data frames carrying one source record each.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Service identifier carried in the banner. Its presence is what marks a
/// decoded message as a banner rather than a data frame.
pub const SERVICE_NAME: &str = "project-sentinel-event-stream";

/// Wire schema constant advertised in the banner.
pub const SCHEMA: &str = "newline-delimited JSON objects";

/// Session banner, sent exactly once per connection before any data frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Banner {
    pub service: String,
    pub datasets: Vec<String>,
    pub events: usize,
    #[serde(rename = "loop")]
    pub loop_replay: bool,
    pub speed_factor: f64,
    pub cycle_seconds: f64,
    pub schema: String,
}

impl Banner {
    pub fn new(
        datasets: Vec<String>,
        events: usize,
        loop_replay: bool,
        speed_factor: f64,
        cycle_seconds: f64,
    ) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            datasets,
            events,
            loop_replay,
            speed_factor,
            cycle_seconds,
            schema: SCHEMA.to_string(),
        }
    }
}

/// One replayed record.
///
/// `sequence` starts at 1 per connection and never resets across loop
/// cycles. `timestamp` is the cycle-adjusted instant; `original_timestamp`
/// is the raw value from the source record (null if the record had none).
/// The embedded `event` payload has its `timestamp` field rewritten to the
/// adjusted instant so consumers see a continuously flowing stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub dataset: String,
    pub sequence: u64,
    pub timestamp: String,
    pub original_timestamp: Option<String>,
    pub event: Value,
}

impl ReplayFrame {
    /// Build a frame for a record at its adjusted replay time.
    pub fn new(
        dataset: &str,
        sequence: u64,
        adjusted: DateTime<Utc>,
        payload: &Value,
    ) -> Self {
        let original_timestamp = payload
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string);

        let adjusted_iso = adjusted.to_rfc3339_opts(SecondsFormat::AutoSi, false);
        let mut event = payload.clone();
        if let Some(obj) = event.as_object_mut() {
            obj.insert("timestamp".to_string(), Value::String(adjusted_iso.clone()));
        }

        Self {
            dataset: dataset.to_string(),
            sequence,
            timestamp: adjusted_iso,
            original_timestamp,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_banner_roundtrip() {
        let banner = Banner::new(
            vec!["POS_Transactions".to_string()],
            42,
            false,
            25.0,
            17.0,
        );
        let line = serde_json::to_string(&banner).unwrap();
        assert!(line.contains("\"loop\":false"));
        assert!(line.contains(SERVICE_NAME));

        let restored: Banner = serde_json::from_str(&line).unwrap();
        assert_eq!(restored.events, 42);
        assert_eq!(restored.speed_factor, 25.0);
        assert_eq!(restored.schema, SCHEMA);
    }

    #[test]
    fn test_frame_rewrites_payload_timestamp() {
        let adjusted = Utc.with_ymd_and_hms(2025, 8, 13, 16, 0, 17).unwrap();
        let payload = json!({
            "timestamp": "2025-08-13T16:00:00+00:00",
            "station_id": "SCC1",
            "data": { "sku": "PRD_A_1" }
        });

        let frame = ReplayFrame::new("POS_Transactions", 7, adjusted, &payload);

        assert_eq!(frame.sequence, 7);
        assert_eq!(
            frame.original_timestamp.as_deref(),
            Some("2025-08-13T16:00:00+00:00")
        );
        assert_eq!(frame.timestamp, frame.event["timestamp"].as_str().unwrap());
        assert_ne!(frame.timestamp, frame.original_timestamp.unwrap());
        // Untouched payload fields survive.
        assert_eq!(frame.event["station_id"], "SCC1");
    }

    #[test]
    fn test_frame_without_original_timestamp() {
        let adjusted = Utc.with_ymd_and_hms(2025, 8, 13, 16, 0, 0).unwrap();
        let frame = ReplayFrame::new("RFID_data", 1, adjusted, &json!({ "data": {} }));
        assert!(frame.original_timestamp.is_none());
    }
}
