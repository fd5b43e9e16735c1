//! Project Sentinel event stream library.
//!
//! Replays merged retail sensor logs over TCP at accelerated speed and
//! fuses the resulting stream into per-station anomaly scores and named
//! business events.

pub mod config;
pub mod consumer;
pub mod datasets;
pub mod error;
pub mod events;
pub mod fusion;
pub mod replay;
pub mod stream;

pub use config::Config;
pub use error::SentinelError;
