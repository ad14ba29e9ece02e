//! Common utilities shared by the transport, scenarios and the CLI

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Render a caller location as the `file:line` tag used in failure reports
pub fn location_tag(location: &std::panic::Location<'_>) -> String {
    format!("{}:{}", location.file(), location.line())
}
