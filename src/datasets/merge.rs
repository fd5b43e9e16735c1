//! Dataset merger.
//!
//! Concatenates N independently-timestamped sensor logs into one globally
//! time-ordered timeline. The merged timeline is the single source of truth
//! for replay ordering: every timestamp must parse, and ties keep the
//! original per-source order (stable sort).

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::error::SentinelError;

/// Canonical dataset identifiers.
///
/// Canonical names are the upstream export names; file-system stems map to
/// them through the fixed alias table in [`DatasetId::from_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetId {
    PointOfSale,
    Rfid,
    VisionRecognition,
    QueueMonitor,
    InventorySnapshot,
}

impl DatasetId {
    /// All datasets a replay session serves, in export order.
    pub const ALL: [DatasetId; 5] = [
        Self::PointOfSale,
        Self::Rfid,
        Self::QueueMonitor,
        Self::VisionRecognition,
        Self::InventorySnapshot,
    ];

    /// Canonical upstream name, as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PointOfSale => "POS_Transactions",
            Self::Rfid => "RFID_data",
            Self::VisionRecognition => "Product_recognism",
            Self::QueueMonitor => "Queue_monitor",
            Self::InventorySnapshot => "Current_inventory_data",
        }
    }

    /// File-system alias (dataset file stem).
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::PointOfSale => "pos_transactions",
            Self::Rfid => "rfid_readings",
            Self::VisionRecognition => "product_recognition",
            Self::QueueMonitor => "queue_monitoring",
            Self::InventorySnapshot => "inventory_snapshots",
        }
    }

    /// Resolve a canonical name or a file-system alias to a dataset id.
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();
        match lowered.as_str() {
            "pos_transactions" => Some(Self::PointOfSale),
            "rfid_data" | "rfid_readings" => Some(Self::Rfid),
            "product_recognism" | "product_recognition" => Some(Self::VisionRecognition),
            "queue_monitor" | "queue_monitoring" => Some(Self::QueueMonitor),
            "current_inventory_data" | "inventory_snapshots" => Some(Self::InventorySnapshot),
            _ => None,
        }
    }
}

/// One record read from a source dataset. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct SourceEvent {
    pub dataset: DatasetId,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

/// The globally time-ordered event sequence plus its replay cycle span.
///
/// Invariant: `events` is sorted by non-decreasing timestamp; ties keep the
/// order in which records were appended per source.
#[derive(Debug, Clone)]
pub struct MergedTimeline {
    pub events: Vec<SourceEvent>,
    pub dataset_names: Vec<String>,
    pub cycle_span: Duration,
}

impl MergedTimeline {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Parse one record's `timestamp` field. RFC 3339 with offset, normalized to UTC.
pub fn parse_record_timestamp(
    payload: &Value,
    dataset: DatasetId,
) -> Result<DateTime<Utc>, SentinelError> {
    let raw = payload.get("timestamp").and_then(Value::as_str);
    let raw = match raw {
        Some(s) => s,
        None => {
            return Err(SentinelError::MalformedTimestamp {
                dataset: dataset.as_str().to_string(),
                value: payload
                    .get("timestamp")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "<missing>".to_string()),
            })
        }
    };

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SentinelError::MalformedTimestamp {
            dataset: dataset.as_str().to_string(),
            value: raw.to_string(),
        })
}

/// Merge per-dataset record lists into a single ordered timeline.
///
/// Pure function over its inputs: parses every timestamp (failing whole on
/// the first malformed one), tags each record with its dataset, stable-sorts
/// ascending, and computes the cycle span used for looped replay.
pub fn merge_datasets(
    inputs: Vec<(DatasetId, Vec<Value>)>,
) -> Result<MergedTimeline, SentinelError> {
    let mut dataset_names = Vec::with_capacity(inputs.len());
    let mut events: Vec<SourceEvent> = Vec::new();

    for (dataset, records) in inputs {
        dataset_names.push(dataset.as_str().to_string());
        for payload in records {
            let timestamp = parse_record_timestamp(&payload, dataset)?;
            events.push(SourceEvent {
                dataset,
                timestamp,
                payload,
            });
        }
    }

    if events.is_empty() {
        return Err(SentinelError::NoEventsFound);
    }

    // Stable sort preserves per-source order on equal timestamps.
    events.sort_by_key(|e| e.timestamp);

    let cycle_span = compute_cycle_span(&events);

    Ok(MergedTimeline {
        events,
        dataset_names,
        cycle_span,
    })
}

/// Cycle span = (last - first) + minimum positive inter-event gap.
///
/// The extra gap keeps cycle k+1's first frame from colliding with cycle k's
/// last. Defaults to 1 second when there are <= 1 distinct timestamps, and is
/// clamped strictly positive.
pub fn compute_cycle_span(events: &[SourceEvent]) -> Duration {
    let one_second = Duration::seconds(1);
    let (first, last) = match (events.first(), events.last()) {
        (Some(f), Some(l)) => (f.timestamp, l.timestamp),
        _ => return one_second,
    };

    let mut min_gap: Option<Duration> = None;
    for pair in events.windows(2) {
        let gap = pair[1].timestamp - pair[0].timestamp;
        if gap > Duration::zero() && min_gap.map_or(true, |m| gap < m) {
            min_gap = Some(gap);
        }
    }
    let min_gap = min_gap.unwrap_or(one_second);

    let span = (last - first) + min_gap;
    if span <= Duration::zero() {
        one_second
    } else {
        span
    }
}
