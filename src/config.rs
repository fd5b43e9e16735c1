//! Application configuration.
//!
//! Defaults match the judged demo setup: 25x replay over a single pass.
//! Every knob can be overridden via environment variables (loaded from
//! `.env` by the binaries) or CLI flags.

use std::env;
use std::path::PathBuf;

use crate::error::SentinelError;

/// Default replay bind address.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default replay port.
pub const DEFAULT_PORT: u16 = 8765;
/// Default replay acceleration factor.
pub const DEFAULT_SPEED: f64 = 25.0;
/// Default vision confidence threshold for the scan-avoidance rule.
pub const DEFAULT_VISION_CONFIDENCE: f64 = 0.85;
/// Default weight tolerance as a fraction of expected weight.
pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 0.07;
/// Default consumer read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
/// Default bound on concurrently tracked stations.
pub const DEFAULT_MAX_STATIONS: usize = 64;

/// Application configuration shared by the replay server and the consumer.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Replay speed multiplier (> 0). 25 means one original second takes 40ms.
    pub speed: f64,
    /// When true, replay repeats forever, shifting timestamps forward each cycle.
    pub loop_replay: bool,
    /// Directory holding the dataset files.
    pub data_dir: PathBuf,
    /// Product SKU -> expected weight reference table.
    pub products_csv: PathBuf,
    /// Output JSONL file for business events.
    pub out_file: PathBuf,
    pub vision_confidence: f64,
    pub weight_tolerance: f64,
    pub read_timeout_secs: u64,
    pub max_stations: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("data/input");
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            speed: DEFAULT_SPEED,
            loop_replay: false,
            products_csv: data_dir.join("products_list.csv"),
            data_dir,
            out_file: PathBuf::from("results/events.jsonl"),
            vision_confidence: DEFAULT_VISION_CONFIDENCE,
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            max_stations: DEFAULT_MAX_STATIONS,
        }
    }
}

impl Config {
    /// Build a configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("SENTINEL_HOST") {
            cfg.host = host;
        }
        if let Some(port) = env_parse::<u16>("SENTINEL_PORT") {
            cfg.port = port;
        }
        if let Some(speed) = env_parse::<f64>("SENTINEL_SPEED") {
            cfg.speed = speed;
        }
        if let Ok(v) = env::var("SENTINEL_LOOP") {
            cfg.loop_replay = matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON");
        }
        if let Ok(dir) = env::var("SENTINEL_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
            cfg.products_csv = cfg.data_dir.join("products_list.csv");
        }
        if let Ok(path) = env::var("SENTINEL_PRODUCTS_CSV") {
            cfg.products_csv = PathBuf::from(path);
        }
        if let Ok(path) = env::var("SENTINEL_OUT_FILE") {
            cfg.out_file = PathBuf::from(path);
        }
        if let Some(v) = env_parse::<f64>("SENTINEL_VISION_CONFIDENCE") {
            cfg.vision_confidence = v;
        }
        if let Some(v) = env_parse::<f64>("SENTINEL_WEIGHT_TOLERANCE") {
            cfg.weight_tolerance = v;
        }
        if let Some(v) = env_parse::<u64>("SENTINEL_READ_TIMEOUT_SECS") {
            cfg.read_timeout_secs = v;
        }
        if let Some(v) = env_parse::<usize>("SENTINEL_MAX_STATIONS") {
            cfg.max_stations = v;
        }

        cfg
    }

    /// Validate configuration invariants before any work starts.
    pub fn validate(&self) -> Result<(), SentinelError> {
        if self.speed <= 0.0 {
            return Err(SentinelError::Configuration(format!(
                "replay speed must be > 0, got {}",
                self.speed
            )));
        }
        if self.vision_confidence <= 0.0 || self.vision_confidence > 1.0 {
            return Err(SentinelError::Configuration(format!(
                "vision confidence must be in (0, 1], got {}",
                self.vision_confidence
            )));
        }
        if self.weight_tolerance <= 0.0 {
            return Err(SentinelError::Configuration(format!(
                "weight tolerance must be > 0, got {}",
                self.weight_tolerance
            )));
        }
        if self.max_stations == 0 {
            return Err(SentinelError::Configuration(
                "max stations must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the replay server binds / the consumer dials.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    env::var(var).ok().and_then(|v| v.parse::<T>().ok())
}
