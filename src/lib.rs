//! Debugger conformance - checkpoint scenarios for GDB/MI debuggers
//!
//! This library drives a managed-runtime debugger over its GDB/MI interface,
//! matches the events it emits against expectations, validates breakpoint
//! resolution and applies hot reload deltas to the running program.

pub mod breakpoints;
pub mod checkpoint;
pub mod cli;
pub mod commands;
pub mod common;
pub mod dap;
pub mod hot_reload;
pub mod matcher;
pub mod mi;
pub mod scenarios;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
