//! Error kinds for the core engine.
//!
//! Malformed telnet/MSDP/GMCP frames and bad regexes in a loaded config are
//! all recovered locally by the component that detects them (logged via
//! `tracing` or reported as a skipped [`crate::config::ConfigError`] record)
//! and never reach this type. `CoreError` is reserved for failures that abort
//! the connection itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("connect to {host}:{port} failed: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
