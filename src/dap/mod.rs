//! Debug Adapter Protocol (DAP) schema
//!
//! Request shapes of the debugger's IDE-style front end. Scenarios drive the
//! debugger over MI; this module only describes the secondary protocol.

pub mod types;

pub use types::*;
