//! Harness error types

use rpcprobe_protocol::ProtocolError;
use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Which bounded wait ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    /// Waiting for the child's readiness signal
    Startup,
    /// Delivering the request to the child's stdin
    Write,
    /// Waiting for a complete response line
    Response,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Startup => write!(f, "startup"),
            Self::Write => write!(f, "stdin"),
            Self::Response => write!(f, "response"),
        }
    }
}

/// Coarse classification of a [`HarnessError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The child could not be started
    LaunchFailure,
    /// The request could not be delivered
    WriteFailure,
    /// A bounded wait elapsed
    Timeout,
    /// The reply was not a JSON-RPC response
    DecodeFailure,
    /// The child could not be stopped
    TerminationFailure,
    /// The child closed stdout before replying
    ChildExited,
    /// The request could not be serialized
    Encode,
}

/// Errors produced by a one-shot exchange
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HarnessError {
    /// The child process could not be started
    #[error("failed to launch `{program}`: {source}")]
    LaunchFailure {
        /// Program that was being spawned
        program: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// Writing the request to the child's stdin failed
    #[error("failed to write request to child stdin: {source}")]
    WriteFailure {
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A bounded wait elapsed
    #[error("timed out after {waited:?} waiting for child {phase}")]
    Timeout {
        /// Which wait ran out
        phase: WaitPhase,
        /// How long the harness waited
        waited: Duration,
    },

    /// The child's output was not a well-formed JSON-RPC response
    #[error("could not decode child output ({reason}): {}", String::from_utf8_lossy(.raw))]
    DecodeFailure {
        /// Raw bytes of the offending line, newline stripped
        raw: Vec<u8>,
        /// Why decoding failed
        reason: String,
    },

    /// The child could not be terminated
    #[error("failed to terminate child process {pid:?}: {source}")]
    TerminationFailure {
        /// OS process id, if one was assigned
        pid: Option<u32>,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// stdout reached EOF before a complete response line
    #[error("child closed stdout before responding (status: {status:?})")]
    ChildExited {
        /// Exit status, if the child had already been reaped
        status: Option<ExitStatus>,
        /// Unterminated bytes read before EOF; never treated as a response
        partial: Vec<u8>,
    },

    /// The request could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(#[from] ProtocolError),
}

impl HarnessError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LaunchFailure { .. } => ErrorKind::LaunchFailure,
            Self::WriteFailure { .. } => ErrorKind::WriteFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            Self::TerminationFailure { .. } => ErrorKind::TerminationFailure,
            Self::ChildExited { .. } => ErrorKind::ChildExited,
            Self::Encode(_) => ErrorKind::Encode,
        }
    }

    /// Raw bytes attached to the error, if any
    pub fn raw_output(&self) -> Option<&[u8]> {
        match self {
            Self::DecodeFailure { raw, .. } => Some(raw.as_slice()),
            Self::ChildExited { partial, .. } if !partial.is_empty() => Some(partial.as_slice()),
            _ => None,
        }
    }

    pub(crate) fn decode(raw: &[u8], reason: impl Into<String>) -> Self {
        Self::DecodeFailure {
            raw: raw.to_vec(),
            reason: reason.into(),
        }
    }
}
