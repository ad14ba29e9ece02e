//! GDB/MI transport
//!
//! This module implements the front-end side of the GDB/MI text protocol
//! spoken by the debugger under test: request tokens, result records and
//! the out-of-band record log the event matcher scans.

pub mod client;
pub mod codec;
pub mod log;
pub mod types;

pub use client::MiClient;
pub use log::{LogState, RecordLog};
pub use types::*;
