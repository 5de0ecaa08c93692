//! Error types for smartguard-core.
//!
//! Most connector failures never reach callers as errors: the core folds
//! them into connection status values and [`Notice`](crate::events::SafetyEvent::Notice)
//! events. The variants below surface from the operations that do return
//! `Result`, such as linking a gateway or fetching history.
//!
//! | Error | Typical cause | Recovery |
//! |-------|---------------|----------|
//! | [`Error::Transport`] | Pairing cancelled, permission denied, link lost | Show the message, let the user retry |
//! | [`Error::Bluetooth`] | Adapter or GATT failure | Retry the link |
//! | [`Error::Http`] / [`Error::Api`] | Cloud unreachable or non-OK status | Next scheduled poll |
//! | [`Error::Timeout`] | Hung request or pairing | Next scheduled poll / retry |
//! | [`Error::InvalidConfig`] | Bad settings or options | Fix configuration |
//! | [`Error::Closed`] | Core already shut down | Restart the core |

use std::time::Duration;

use thiserror::Error;

/// Errors returned by smartguard-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Telemetry endpoint returned a non-OK status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response.
        message: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Proximity transport failure with a user-facing reason.
    #[error("{0}")]
    Transport(#[from] TransportFailure),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Response or file content could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Another operation of the same kind is still running.
    #[error("{0} already in progress")]
    Busy(&'static str),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The core has shut down.
    #[error("Safety core is not running")]
    Closed,

    /// CSV read or write failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reasons a proximity link could not be established or was lost.
///
/// `Display` yields text suitable for a toast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportFailure {
    /// No Bluetooth adapter present or powered.
    #[error("No Bluetooth adapter available.")]
    NoAdapter,
    /// The OS refused Bluetooth access.
    #[error("Bluetooth permission denied.")]
    PermissionDenied,
    /// Discovery ended without a device being chosen.
    #[error("Selection cancelled. No device linked.")]
    NoDeviceSelected,
    /// The link dropped.
    #[error("Link to gateway lost.")]
    LinkLost,
    /// The platform has no Bluetooth support.
    #[error("Bluetooth is not supported on this system.")]
    Unsupported,
    /// The gateway is missing the expected service or characteristic.
    #[error("Device is not a SmartGuard gateway.")]
    IncompatibleDevice,
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Text to show the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            Error::Transport(failure) => failure.to_string(),
            Error::Bluetooth(_) => "Bluetooth error. Try linking again.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias using smartguard-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
