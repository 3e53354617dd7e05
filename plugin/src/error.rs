use std::io;

use thiserror::Error;

/// Result alias for the plugin core.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures the core can observe. Configuration gaps are not errors: an
/// incomplete key is simply left alone until the user finishes setting it up.
#[derive(Debug, Error)]
pub enum Error {
    /// The OS process list could not be read this time around.
    #[error("process snapshot failed: {0}")]
    Snapshot(String),

    /// I/O failure on the host bridge or while spawning a command.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line from the host could not be decoded.
    #[error("malformed host message: {0}")]
    Protocol(#[from] serde_json::Error),
}
