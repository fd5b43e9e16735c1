//! Multi-sensor consensus fusion engine.
//!
//! Maintains bounded per-station rolling history for each signal type and
//! computes a weighted anomaly score from cross-referenced signals that
//! should normally agree. No single sensor is authoritative: the score is
//! consensus over POS, RFID, vision, and queue telemetry.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datasets::ProductWeightTable;

/// POS history per station.
const POS_HISTORY: usize = 10;
/// RFID history per station.
const RFID_HISTORY: usize = 20;
/// Vision history per station.
const VISION_HISTORY: usize = 10;

/// Rule weights. The fixed scoring policy: each fired rule adds its weight,
/// and the total is clamped to [0, 1].
const SCAN_AVOIDANCE_WEIGHT: f64 = 0.40;
const RFID_PRESENCE_WEIGHT: f64 = 0.20;
const BARCODE_MISMATCH_WEIGHT: f64 = 0.30;
const WEIGHT_DELTA_WEIGHT: f64 = 0.25;
const QUEUE_PRESSURE_WEIGHT: f64 = 0.05;

/// Queue pressure thresholds.
pub const QUEUE_COUNT_THRESHOLD: u64 = 6;
pub const QUEUE_DWELL_THRESHOLD_SECS: f64 = 120.0;

/// One point-of-sale scan record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PosRecord {
    pub customer_id: Option<String>,
    pub sku: Option<String>,
    pub product_name: Option<String>,
    pub barcode: Option<String>,
    pub price: Option<f64>,
    pub weight_g: Option<f64>,
    /// Reference weight attached at ingestion when the SKU is in the table.
    #[serde(skip)]
    pub expected_weight: Option<f64>,
}

/// One RFID read. A record with none of sku/epc/location carries no signal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RfidRecord {
    pub sku: Option<String>,
    pub epc: Option<String>,
    pub location: Option<String>,
}

impl RfidRecord {
    pub fn is_null_only(&self) -> bool {
        self.sku.is_none() && self.epc.is_none() && self.location.is_none()
    }
}

/// One computer-vision product recognition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VisionRecord {
    pub predicted_product: Option<String>,
    pub accuracy: Option<f64>,
}

/// Latest queue telemetry for a station. Latest wins, no history.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueSnapshot {
    /// Upstream exporters disagree on whether this is an integer or a
    /// float, so any JSON number is accepted and truncated.
    #[serde(deserialize_with = "lenient_count")]
    pub customer_count: Option<u64>,
    pub average_dwell_time: Option<f64>,
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64))))
}

impl QueueSnapshot {
    /// True when either queue-pressure threshold is met.
    pub fn is_pressured(&self) -> bool {
        self.customer_count.unwrap_or(0) >= QUEUE_COUNT_THRESHOLD
            || self.average_dwell_time.unwrap_or(0.0) >= QUEUE_DWELL_THRESHOLD_SECS
    }
}

/// Why a rule fired. Produced directly by the scoring rules so downstream
/// mapping never parses free text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    /// Vision saw a product with high confidence that never hit the POS log.
    ScanAvoidance { sku: String, confidence: f64 },
    /// RFID corroboration: the unscanned product's tag reads inside the
    /// bagging/scan area.
    RfidPresence { sku: String },
    /// Vision prediction and scanned SKU disagree.
    BarcodeMismatch { vision_sku: String, pos_sku: String },
    /// Observed weight outside tolerance of the expected weight.
    WeightDelta {
        sku: Option<String>,
        observed: f64,
        expected: f64,
    },
    /// Long queue or long dwell at the station.
    QueuePressure,
}

/// Result of one scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FusionScore {
    pub score: f64,
    pub reasons: Vec<Reason>,
}

/// Per-station state, owned exclusively by the engine.
#[derive(Debug, Default)]
struct StationState {
    pos: VecDeque<PosRecord>,
    rfid: VecDeque<RfidRecord>,
    vision: VecDeque<VisionRecord>,
    queue: QueueSnapshot,
    last: FusionScore,
    last_touch: u64,
}

/// Fusion engine tunables.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Minimum vision confidence for the scan-avoidance rule.
    pub vision_confidence: f64,
    /// Weight tolerance as a fraction of expected weight.
    pub weight_tolerance: f64,
    /// Bound on concurrently tracked stations; least-recently-updated wins
    /// eviction once exceeded.
    pub max_stations: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            vision_confidence: 0.85,
            weight_tolerance: 0.07,
            max_stations: 64,
        }
    }
}

/// Stateful multi-signal consensus scorer.
pub struct FusionEngine {
    config: FusionConfig,
    weights: ProductWeightTable,
    stations: HashMap<String, StationState>,
    touch_counter: u64,
}

impl FusionEngine {
    pub fn new(weights: ProductWeightTable, config: FusionConfig) -> Self {
        Self {
            config,
            weights,
            stations: HashMap::new(),
            touch_counter: 0,
        }
    }

    /// Append a POS record, attaching the reference weight when known.
    pub fn observe_pos(&mut self, station: &str, mut record: PosRecord) {
        if let Some(sku) = &record.sku {
            record.expected_weight = self.weights.expected_grams(sku);
        }
        let state = self.touch(station);
        push_bounded(&mut state.pos, record, POS_HISTORY);
    }

    /// Append an RFID record. Null-only frames carry no signal and are dropped.
    pub fn observe_rfid(&mut self, station: &str, record: RfidRecord) {
        if record.is_null_only() {
            return;
        }
        let state = self.touch(station);
        push_bounded(&mut state.rfid, record, RFID_HISTORY);
    }

    /// Append a vision record. Dropped when no product was predicted.
    pub fn observe_vision(&mut self, station: &str, record: VisionRecord) {
        if record.predicted_product.is_none() {
            return;
        }
        let state = self.touch(station);
        push_bounded(&mut state.vision, record, VISION_HISTORY);
    }

    /// Replace the station's queue snapshot unconditionally.
    pub fn set_queue(&mut self, station: &str, snapshot: QueueSnapshot) {
        self.touch(station).queue = snapshot;
    }

    /// Latest POS record for a station, if any.
    pub fn last_pos(&self, station: &str) -> Option<&PosRecord> {
        self.stations.get(station).and_then(|s| s.pos.back())
    }

    /// Current queue snapshot for a station.
    pub fn queue(&self, station: &str) -> Option<&QueueSnapshot> {
        self.stations.get(station).map(|s| &s.queue)
    }

    /// Most recently computed score for a station.
    pub fn last_score(&self, station: &str) -> Option<&FusionScore> {
        self.stations.get(station).map(|s| &s.last)
    }

    /// Number of live stations.
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Compute the consensus anomaly score for a station.
    ///
    /// Evaluated fresh on every call against the latest vision and POS
    /// observations plus full RFID/queue state; the stored score and
    /// reasons are overwritten, never merged.
    pub fn compute_score(&mut self, station: &str) -> FusionScore {
        self.touch(station);
        let result = match self.stations.get(station) {
            Some(state) => score_station(state, &self.weights, &self.config),
            None => FusionScore::default(),
        };
        if let Some(state) = self.stations.get_mut(station) {
            state.last = result.clone();
        }
        result
    }

    /// Get-or-create station state, bumping its recency and enforcing the
    /// station bound.
    fn touch(&mut self, station: &str) -> &mut StationState {
        self.touch_counter += 1;
        let tick = self.touch_counter;

        if !self.stations.contains_key(station) && self.stations.len() >= self.config.max_stations {
            if let Some(victim) = self
                .stations
                .iter()
                .min_by_key(|(_, s)| s.last_touch)
                .map(|(k, _)| k.clone())
            {
                debug!(station = %victim, "Evicting least-recently-updated station");
                self.stations.remove(&victim);
            }
        }

        let state = self.stations.entry(station.to_string()).or_default();
        state.last_touch = tick;
        state
    }
}

/// One scoring pass over a station's accumulated state.
fn score_station(
    state: &StationState,
    weights: &ProductWeightTable,
    config: &FusionConfig,
) -> FusionScore {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    let vision = state.vision.back();
    let pos = state.pos.back();

    // 1) Scan avoidance: confident vision prediction missing from POS.
    if let Some(v) = vision {
        let confidence = v.accuracy.unwrap_or(0.0);
        if let Some(product) = &v.predicted_product {
            if confidence >= config.vision_confidence {
                let seen_in_pos = state.pos.iter().any(|p| p.sku.as_deref() == Some(product));
                if !seen_in_pos {
                    score += SCAN_AVOIDANCE_WEIGHT;
                    reasons.push(Reason::ScanAvoidance {
                        sku: product.clone(),
                        confidence,
                    });

                    let in_bag_area = state.rfid.iter().any(|r| {
                        r.sku.as_deref() == Some(product)
                            && r.location
                                .as_deref()
                                .map(|loc| loc.to_uppercase().starts_with("IN"))
                                .unwrap_or(false)
                    });
                    if in_bag_area {
                        score += RFID_PRESENCE_WEIGHT;
                        reasons.push(Reason::RfidPresence {
                            sku: product.clone(),
                        });
                    }
                }
            }
        }
    }

    // 2) Barcode switching: vision and POS disagree on the product.
    if let (Some(vision_sku), Some(pos_sku)) = (
        vision.and_then(|v| v.predicted_product.as_deref()),
        pos.and_then(|p| p.sku.as_deref()),
    ) {
        if vision_sku != pos_sku {
            score += BARCODE_MISMATCH_WEIGHT;
            reasons.push(Reason::BarcodeMismatch {
                vision_sku: vision_sku.to_string(),
                pos_sku: pos_sku.to_string(),
            });
        }
    }

    // 3) Weight discrepancy. Missing fields make this rule contribute
    // nothing rather than failing the whole score. Unknown SKUs fall back
    // to expected = observed, so the rule cannot fire for them.
    if let Some(p) = pos {
        if let Some(observed) = p.weight_g {
            let expected = p
                .expected_weight
                .or_else(|| p.sku.as_deref().and_then(|s| weights.expected_grams(s)))
                .unwrap_or(observed);
            let tolerance = config.weight_tolerance * expected;
            if (observed - expected).abs() > tolerance {
                score += WEIGHT_DELTA_WEIGHT;
                reasons.push(Reason::WeightDelta {
                    sku: p.sku.clone(),
                    observed,
                    expected,
                });
            }
        }
    }

    // 4) Queue pressure bump.
    if state.queue.is_pressured() {
        score += QUEUE_PRESSURE_WEIGHT;
        reasons.push(Reason::QueuePressure);
    }

    FusionScore {
        score: score.clamp(0.0, 1.0),
        reasons,
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    buffer.push_back(item);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FusionEngine {
        let weights = ProductWeightTable::from_pairs(&[("PRD_A", 400.0), ("PRD_B", 150.0)]);
        FusionEngine::new(weights, FusionConfig::default())
    }

    fn vision(product: &str, accuracy: f64) -> VisionRecord {
        VisionRecord {
            predicted_product: Some(product.to_string()),
            accuracy: Some(accuracy),
        }
    }

    fn pos_scan(sku: &str) -> PosRecord {
        PosRecord {
            sku: Some(sku.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_scan_avoidance_fires_without_pos_match() {
        let mut engine = engine();
        engine.observe_vision("SCC1", vision("PRD_X_1", 0.90));

        let result = engine.compute_score("SCC1");
        assert!(result.score >= 0.40);
        assert!(matches!(
            &result.reasons[0],
            Reason::ScanAvoidance { sku, confidence } if sku == "PRD_X_1" && *confidence == 0.90
        ));
    }

    #[test]
    fn test_scan_avoidance_needs_confidence_threshold() {
        let mut engine = engine();
        engine.observe_vision("SCC1", vision("PRD_X_1", 0.80));

        let result = engine.compute_score("SCC1");
        assert_eq!(result.score, 0.0);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_scan_avoidance_suppressed_when_pos_has_sku() {
        let mut engine = engine();
        engine.observe_pos("SCC1", pos_scan("PRD_X_1"));
        engine.observe_vision("SCC1", vision("PRD_X_1", 0.95));

        let result = engine.compute_score("SCC1");
        assert!(!result
            .reasons
            .iter()
            .any(|r| matches!(r, Reason::ScanAvoidance { .. })));
    }

    #[test]
    fn test_rfid_presence_corroboration() {
        let mut engine = engine();
        engine.observe_vision("SCC1", vision("PRD_X_1", 0.92));
        engine.observe_rfid(
            "SCC1",
            RfidRecord {
                sku: Some("PRD_X_1".to_string()),
                epc: Some("E280".to_string()),
                location: Some("IN_SCAN_AREA".to_string()),
            },
        );

        let result = engine.compute_score("SCC1");
        assert!((result.score - 0.60).abs() < 1e-9);
        assert!(result
            .reasons
            .iter()
            .any(|r| matches!(r, Reason::RfidPresence { sku } if sku == "PRD_X_1")));
    }

    #[test]
    fn test_barcode_mismatch() {
        let mut engine = engine();
        engine.observe_pos("SCC1", pos_scan("PRD_A"));
        engine.observe_vision("SCC1", vision("PRD_B", 0.50)); // below threshold, still mismatch

        let result = engine.compute_score("SCC1");
        assert!((result.score - 0.30).abs() < 1e-9);
        assert!(matches!(
            &result.reasons[0],
            Reason::BarcodeMismatch { vision_sku, pos_sku }
                if vision_sku == "PRD_B" && pos_sku == "PRD_A"
        ));
    }

    #[test]
    fn test_weight_discrepancy_outside_tolerance() {
        let mut engine = engine();
        let mut record = pos_scan("PRD_A");
        record.weight_g = Some(500.0); // expected 400, tolerance 28g, delta 100g
        engine.observe_pos("SCC1", record);

        let result = engine.compute_score("SCC1");
        assert!((result.score - 0.25).abs() < 1e-9);
        assert!(matches!(
            &result.reasons[0],
            Reason::WeightDelta { observed, expected, .. }
                if *observed == 500.0 && *expected == 400.0
        ));
    }

    #[test]
    fn test_weight_within_tolerance_contributes_nothing() {
        let weights = ProductWeightTable::from_pairs(&[("PRD_A", 480.0)]);
        let mut engine = FusionEngine::new(weights, FusionConfig::default());
        let mut record = pos_scan("PRD_A");
        record.weight_g = Some(500.0); // tolerance 33.6g, delta 20g
        engine.observe_pos("SCC1", record);

        let result = engine.compute_score("SCC1");
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_weight_rule_cannot_fire_for_unknown_sku() {
        let mut engine = engine();
        let mut record = pos_scan("PRD_UNKNOWN");
        record.weight_g = Some(999.0);
        engine.observe_pos("SCC1", record);

        // expected falls back to observed, delta is zero
        let result = engine.compute_score("SCC1");
        assert!(!result
            .reasons
            .iter()
            .any(|r| matches!(r, Reason::WeightDelta { .. })));
    }

    #[test]
    fn test_queue_pressure_thresholds() {
        let mut engine = engine();
        engine.set_queue(
            "SCC1",
            QueueSnapshot {
                customer_count: Some(6),
                average_dwell_time: None,
            },
        );
        assert!((engine.compute_score("SCC1").score - 0.05).abs() < 1e-9);

        engine.set_queue(
            "SCC1",
            QueueSnapshot {
                customer_count: Some(2),
                average_dwell_time: Some(120.0),
            },
        );
        assert!((engine.compute_score("SCC1").score - 0.05).abs() < 1e-9);

        engine.set_queue(
            "SCC1",
            QueueSnapshot {
                customer_count: Some(2),
                average_dwell_time: Some(30.0),
            },
        );
        assert_eq!(engine.compute_score("SCC1").score, 0.0);
    }

    #[test]
    fn test_queue_snapshot_accepts_float_customer_count() {
        let snapshot: QueueSnapshot =
            serde_json::from_value(serde_json::json!({"customer_count": 6.0})).unwrap();
        assert_eq!(snapshot.customer_count, Some(6));
        assert!(snapshot.is_pressured());

        let snapshot: QueueSnapshot =
            serde_json::from_value(serde_json::json!({"customer_count": 5.9})).unwrap();
        assert_eq!(snapshot.customer_count, Some(5));
        assert!(!snapshot.is_pressured());
    }

    #[test]
    fn test_null_only_rfid_never_enters_buffer() {
        let mut engine = engine();
        engine.observe_vision("SCC1", vision("PRD_X_1", 0.95));
        engine.observe_rfid("SCC1", RfidRecord::default());

        // Without the null frame there is no RFID corroboration.
        let result = engine.compute_score("SCC1");
        assert!((result.score - 0.40).abs() < 1e-9);
        assert!(!result
            .reasons
            .iter()
            .any(|r| matches!(r, Reason::RfidPresence { .. })));
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let mut engine = engine();
        engine.observe_pos("SCC1", pos_scan("PRD_A"));
        engine.observe_vision("SCC1", vision("PRD_B", 0.95));
        engine.set_queue(
            "SCC1",
            QueueSnapshot {
                customer_count: Some(8),
                average_dwell_time: None,
            },
        );

        let first = engine.compute_score("SCC1");
        let second = engine.compute_score("SCC1");
        assert_eq!(first, second);
        assert_eq!(engine.last_score("SCC1"), Some(&second));
    }

    #[test]
    fn test_score_is_clamped() {
        let mut engine = engine();
        // Fire everything at once: 0.40 + 0.20 + 0.30 + 0.25 + 0.05 = 1.20
        let mut record = pos_scan("PRD_A");
        record.weight_g = Some(800.0);
        engine.observe_pos("SCC1", record);
        engine.observe_vision("SCC1", vision("PRD_X_1", 0.95));
        engine.observe_rfid(
            "SCC1",
            RfidRecord {
                sku: Some("PRD_X_1".to_string()),
                epc: None,
                location: Some("in_bagging".to_string()),
            },
        );
        engine.set_queue(
            "SCC1",
            QueueSnapshot {
                customer_count: Some(9),
                average_dwell_time: None,
            },
        );

        let result = engine.compute_score("SCC1");
        assert_eq!(result.score, 1.0);
        assert_eq!(result.reasons.len(), 5);
    }

    #[test]
    fn test_pos_ring_buffer_evicts_oldest() {
        let mut engine = engine();
        for i in 0..15 {
            engine.observe_pos("SCC1", pos_scan(&format!("PRD_{}", i)));
        }
        // Only the last 10 POS records survive; PRD_0 has been evicted, so
        // a confident vision sighting of it counts as unscanned.
        engine.observe_vision("SCC1", vision("PRD_0", 0.95));
        let result = engine.compute_score("SCC1");
        assert!(result
            .reasons
            .iter()
            .any(|r| matches!(r, Reason::ScanAvoidance { sku, .. } if sku == "PRD_0")));
    }

    #[test]
    fn test_station_bound_evicts_least_recent() {
        let weights = ProductWeightTable::default();
        let mut engine = FusionEngine::new(
            weights,
            FusionConfig {
                max_stations: 2,
                ..Default::default()
            },
        );

        engine.observe_pos("SCC1", pos_scan("PRD_A"));
        engine.observe_pos("SCC2", pos_scan("PRD_B"));
        engine.observe_pos("SCC1", pos_scan("PRD_C")); // SCC2 is now the coldest
        engine.observe_pos("SCC3", pos_scan("PRD_D"));

        assert_eq!(engine.station_count(), 2);
        assert!(engine.last_pos("SCC2").is_none());
        assert!(engine.last_pos("SCC1").is_some());
        assert!(engine.last_pos("SCC3").is_some());
    }
}
