//! Error taxonomy for the watchdog core
//!
//! None of these escape the monitor loop or a running sequence: collaborators
//! catch them at the call site, log them and degrade to a negative result.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentinelError>;

/// Watchdog core errors
///
/// Only settings problems reach callers of the public operations; the
/// transient variants are logged and folded into `bool`, [`PowerCycleReport`]
/// or [`Delivery`] at the call site.
///
/// [`PowerCycleReport`]: crate::relay::PowerCycleReport
/// [`Delivery`]: crate::notify::Delivery
#[derive(Debug, Error)]
pub enum SentinelError {
    /// Settings failed validation
    #[error("invalid watchdog policy: {0}")]
    InvalidPolicy(String),

    /// Transport-level HTTP failure (connect, timeout, body decode)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The probe process could not be started
    #[error("probe failed: {0}")]
    Probe(#[from] std::io::Error),

    /// The messaging provider refused the message
    #[error("notification rejected: {0}")]
    NotificationRejected(String),

    /// Settings store could not be read or written
    #[error("policy source error: {0}")]
    PolicySource(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SentinelError {
    /// Wrap any settings-store error
    pub fn source_error<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        SentinelError::PolicySource(err.into())
    }

    /// Transient errors are expected on a flaky uplink and are never fatal
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SentinelError::Http(_) | SentinelError::HttpStatus { .. } | SentinelError::Probe(_)
        )
    }
}
