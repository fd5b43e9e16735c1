//! Error taxonomy for the ingest and merge path.
//!
//! Fatal errors only: a bad record cannot be silently dropped without
//! corrupting replay ordering guarantees, so the merger fails whole.
//! Wire decode errors and peer disconnects are recovered locally by the
//! stream reader / replay server and never reach this type.

use std::fmt;

/// Errors raised while loading datasets and building the merged timeline.
#[derive(Debug, Clone)]
pub enum SentinelError {
    /// Missing required input files/paths. Aborts before any network activity.
    Configuration(String),
    /// A record's timestamp is missing or unparsable.
    MalformedTimestamp { dataset: String, value: String },
    /// A dataset file's JSON structure is not a list/object of records.
    UnsupportedPayloadShape { dataset: String, detail: String },
    /// The merged result is empty.
    NoEventsFound,
}

impl fmt::Display for SentinelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Self::MalformedTimestamp { dataset, value } => {
                write!(f, "malformed timestamp in {}: {:?}", dataset, value)
            }
            Self::UnsupportedPayloadShape { dataset, detail } => {
                write!(f, "unsupported payload shape in {}: {}", dataset, detail)
            }
            Self::NoEventsFound => write!(f, "no events found across provided datasets"),
        }
    }
}

impl std::error::Error for SentinelError {}
