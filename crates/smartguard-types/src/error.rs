//! Error types for data parsing in smartguard-types.

use thiserror::Error;

/// Errors that can occur when decoding a proximity-channel packet.
///
/// This error type is transport-agnostic and does not include
/// BLE-specific errors (those belong in smartguard-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The packet contained no text.
    #[error("Empty packet")]
    Empty,

    /// The first field did not name a known packet kind.
    #[error("Unknown packet kind: {0}")]
    UnknownKind(String),

    /// The packet had the wrong number of colon-delimited fields.
    #[error("{kind} packet requires {expected} fields, got {actual}")]
    FieldCount {
        /// Packet kind (`ALERT` or `DATA`).
        kind: &'static str,
        /// Number of fields the kind requires.
        expected: usize,
        /// Number of fields received.
        actual: usize,
    },

    /// A numeric field could not be parsed.
    #[error("Invalid {field} value: {value:?}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Raw text of the field.
        value: String,
    },
}

/// Result type alias using smartguard-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
