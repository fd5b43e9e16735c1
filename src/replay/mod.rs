//! Temporal replay: wire frames and the paced TCP server.

pub mod frame;
pub mod server;

pub use frame::{Banner, ReplayFrame};
pub use server::ReplayServer;
