//! Error types for protocol operations
//!
//! Covers request encoding and JSON-RPC envelope validation.

use std::fmt;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during protocol operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// JSON serialization/deserialization error
    SerializationError(String),

    /// The `jsonrpc` member is missing or not `"2.0"`
    VersionMismatch {
        /// What the message carried, if anything
        got: Option<String>,
    },

    /// Missing required field
    MissingField(&'static str),

    /// The message is not a response (no `result`/`error`, or both)
    InvalidResponse(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::VersionMismatch { got: Some(got) } => {
                write!(f, "Version mismatch: expected \"2.0\", got {}", got)
            }
            Self::VersionMismatch { got: None } => {
                write!(f, "Version mismatch: missing \"jsonrpc\" member")
            }
            Self::MissingField(field) => write!(f, "Missing required field: {}", field),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
