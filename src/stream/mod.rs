//! Wire stream consumption.

pub mod reader;

pub use reader::{FrameReader, Incoming};
