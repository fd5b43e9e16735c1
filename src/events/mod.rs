//! Business event emission: mapping and the JSON Lines sink.

pub mod mapper;
pub mod sink;

pub use mapper::EventMapper;
pub use sink::JsonlSink;
