/*!
 * Error types for uplink-warden
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use warden_sentinel::SentinelError;

pub type Result<T> = std::result::Result<T, WardenError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_DOWN: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Errors surfaced by the settings layer, logging setup and CLI
///
/// Network trouble never shows up here; the watchdog core absorbs it.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Settings file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Settings could not be rendered
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Environment or operator value is not a valid duration or number
    #[error("Invalid value {value:?} for {key}")]
    InvalidDuration { key: String, value: String },

    /// Watchdog core error
    #[error(transparent)]
    Sentinel(#[from] SentinelError),
}

impl WardenError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::Config(_)
            | WardenError::Parse { .. }
            | WardenError::InvalidDuration { .. }
            | WardenError::Sentinel(SentinelError::InvalidPolicy(_)) => EXIT_FATAL,
            _ => EXIT_DOWN,
        }
    }

    /// Check if this error is fatal (should not retry)
    pub fn is_fatal(&self) -> bool {
        match self {
            WardenError::Sentinel(e) => !e.is_transient(),
            WardenError::Io(_) => false,
            _ => true,
        }
    }
}
