//! Multi-sensor consensus scoring.

pub mod engine;

pub use engine::{
    FusionConfig, FusionEngine, FusionScore, PosRecord, QueueSnapshot, Reason, RfidRecord,
    VisionRecord, QUEUE_COUNT_THRESHOLD, QUEUE_DWELL_THRESHOLD_SECS,
};
