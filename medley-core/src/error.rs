//! Error types for medley-core
//!
//! Defines engine error types using thiserror for clear error propagation,
//! and the mapping from errors to process exit statuses.

use crate::ipc::IpcError;
use thiserror::Error;

/// Main error type for the engine lifecycle
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration file or option table errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The command line could not be parsed
    #[error("Command line error: {0}")]
    CommandLine(String),

    /// Module bank could not be initialized or loaded
    #[error("Module load error: {0}")]
    ModuleLoad(String),

    /// Instance resources could not be allocated
    #[error("Resource error: {0}")]
    Resource(String),

    /// Playlist service could not be created
    #[error("Playlist initialization error: {0}")]
    PlaylistInit(String),

    /// Detaching from the controlling terminal failed
    #[error("Daemonize error: {0}")]
    Daemonize(String),

    /// Inter-process messaging failure
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    /// Optional capability not available (never fatal)
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Interface could not be created or started
    #[error("Interface error: {0}")]
    Interface(String),

    /// Operation not valid in the instance's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<medley_common::Error> for EngineError {
    fn from(e: medley_common::Error) -> Self {
        match e {
            medley_common::Error::CommandLine(msg) => EngineError::CommandLine(msg),
            medley_common::Error::Io(e) => EngineError::Io(e),
            other => EngineError::Config(other.to_string()),
        }
    }
}

impl EngineError {
    /// Process exit status reported for an initialization failure
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            EngineError::CommandLine(_) | EngineError::Daemonize(_) => ExitStatus::CleanExitFailure,
            _ => ExitStatus::GenericFailure,
        }
    }
}

/// Convenience Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Process exit statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal termination
    Success,
    /// An informational request (help, version, list) was served
    CleanExitSuccess,
    /// Bad command line or failed daemonization
    CleanExitFailure,
    /// Any other initialization failure
    GenericFailure,
    /// Work was handed to the running instance; neutral for scripts
    Handoff,
}

impl ExitStatus {
    /// Numeric process exit code
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success | ExitStatus::CleanExitSuccess | ExitStatus::Handoff => 0,
            ExitStatus::GenericFailure => 1,
            ExitStatus::CleanExitFailure => 2,
        }
    }
}
