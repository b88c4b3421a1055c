//! Common error types for medley

use thiserror::Error;

/// Common result type for medley configuration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across medley crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file loading, parsing or saving error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The command line could not be parsed against the option table
    #[error("Command line error: {0}")]
    CommandLine(String),

    /// An option value does not match the option's declared kind
    #[error("Invalid value for option '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// Requested option or module not found
    #[error("Not found: {0}")]
    NotFound(String),
}
