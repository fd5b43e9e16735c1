//! Fusion-to-business-event mapping.
//!
//! Translates fusion reasons, device status strings, and queue telemetry
//! into the named business events of the detection log. Event ids are minted
//! monotonically for the lifetime of the mapper and never reset, so a single
//! output file can never contain duplicate ids.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::events::sink::JsonlSink;
use crate::fusion::{
    FusionScore, PosRecord, QueueSnapshot, Reason, QUEUE_COUNT_THRESHOLD,
    QUEUE_DWELL_THRESHOLD_SECS,
};

/// Status substrings that indicate a station fault. Matched
/// case-insensitively anywhere in the status string.
const FAULT_MARKERS: [&str; 3] = ["crash", "read error", "failure"];

/// Maps fusion output to named business events on a JSON Lines sink.
pub struct EventMapper {
    sink: JsonlSink,
    counter: u64,
}

impl EventMapper {
    pub fn new(sink: JsonlSink) -> Self {
        Self { sink, counter: 0 }
    }

    pub fn into_sink(self) -> JsonlSink {
        self.sink
    }

    pub fn events_emitted(&self) -> u64 {
        self.counter
    }

    /// Emit business events for each fused reason that has a mapping.
    ///
    /// `RfidPresence` and `QueuePressure` reasons raise the score but map to
    /// no event of their own: the former only corroborates a scan-avoidance
    /// finding, the latter is reported from queue telemetry directly.
    pub fn from_fusion(
        &mut self,
        station_id: &str,
        result: &FusionScore,
        last_pos: Option<&PosRecord>,
    ) -> Result<()> {
        let customer_id = last_pos.and_then(|p| p.customer_id.clone());

        for reason in &result.reasons {
            match reason {
                Reason::ScanAvoidance { sku, .. } => {
                    // The latest POS record's SKU wins when one exists; the
                    // vision-predicted SKU is only the fallback.
                    let product_sku = last_pos
                        .and_then(|p| p.sku.clone())
                        .unwrap_or_else(|| sku.clone());
                    self.emit(json!({
                        "event_name": "Scanner Avoidance",
                        "station_id": station_id,
                        "customer_id": customer_id,
                        "product_sku": product_sku,
                    }))?;
                }
                Reason::BarcodeMismatch {
                    vision_sku,
                    pos_sku,
                } => {
                    self.emit(json!({
                        "event_name": "Barcode Switching",
                        "station_id": station_id,
                        "customer_id": customer_id,
                        "actual_sku": vision_sku,
                        "scanned_sku": pos_sku,
                    }))?;
                }
                Reason::WeightDelta {
                    sku,
                    observed,
                    expected,
                } => {
                    self.emit(json!({
                        "event_name": "Weight Discrepancies",
                        "station_id": station_id,
                        "customer_id": customer_id,
                        "product_sku": sku,
                        "expected_weight": expected,
                        "actual_weight": observed,
                    }))?;
                }
                Reason::RfidPresence { .. } | Reason::QueuePressure => {}
            }
        }
        Ok(())
    }

    /// Emit a crash event when the device status string indicates a fault.
    pub fn inspect_status(&mut self, station_id: &str, status: Option<&str>) -> Result<()> {
        let Some(status) = status else {
            return Ok(());
        };
        let lowered = status.to_lowercase();
        if FAULT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            self.emit(json!({
                "event_name": "Unexpected Systems Crash",
                "station_id": station_id,
                "duration_seconds": 0,
            }))?;
        }
        Ok(())
    }

    /// Emit operational events from the station's queue telemetry.
    ///
    /// A long queue produces three events in a fixed order: the observation,
    /// the staffing request, and the station-open action.
    pub fn inspect_queue(&mut self, station_id: &str, queue: Option<&QueueSnapshot>) -> Result<()> {
        let Some(queue) = queue else {
            return Ok(());
        };
        let customer_count = queue.customer_count.unwrap_or(0);
        let dwell = queue.average_dwell_time.unwrap_or(0.0);

        if customer_count >= QUEUE_COUNT_THRESHOLD {
            self.emit(json!({
                "event_name": "Long Queue Length",
                "station_id": station_id,
                "num_of_customers": customer_count,
            }))?;
            self.emit(json!({
                "event_name": "Staffing Needs",
                "station_id": station_id,
                "Staff_type": "Cashier",
            }))?;
            self.emit(json!({
                "event_name": "Checkout Station Action",
                "station_id": station_id,
                "Action": "Open",
            }))?;
        }

        if dwell >= QUEUE_DWELL_THRESHOLD_SECS {
            self.emit(json!({
                "event_name": "Long Wait Time",
                "station_id": station_id,
                "wait_time_seconds": dwell,
            }))?;
        }
        Ok(())
    }

    fn emit(&mut self, event_data: Value) -> Result<()> {
        let event = json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            "event_id": self.next_id(),
            "event_data": event_data,
        });
        self.sink.write_event(&event)
    }

    /// Zero-padded to three digits; wider ids past E999.
    fn next_id(&mut self) -> String {
        let id = format!("E{:03}", self.counter);
        self.counter += 1;
        id
    }
}
