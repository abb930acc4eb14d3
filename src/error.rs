//! Error types for app-container

use thiserror::Error;

/// Exit code reported when the user interrupts a session.
pub const INTERRUPTED_EXIT_CODE: i32 = 2;

#[derive(Error, Debug)]
pub enum AppContainerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown bind '{name}'. Known binds: {known}")]
    UnknownBind { name: String, known: String },

    #[error("++network not understood. Choose one of shared, isolated, nat, bridged. {0}")]
    InvalidNetwork(String),

    #[error("Host precondition failed: {0}")]
    Precondition(String),

    #[error("Failed to start container '{name}' (code {code:?})")]
    Provisioning { name: String, code: Option<i32> },

    #[error("Private display server exited (code {code:?}): {command}")]
    DisplayServer { command: String, code: Option<i32> },

    #[error("Session lock error: {0}")]
    Lock(String),

    #[error("Failed to run '{command}': {source}")]
    Command {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is already in use by another session")]
    Busy(String),

    #[error("{0} is already running - apt update skipped")]
    AlreadyRunning(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl AppContainerError {
    /// Process exit code to report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AppContainerError::Interrupted => INTERRUPTED_EXIT_CODE,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppContainerError>;
