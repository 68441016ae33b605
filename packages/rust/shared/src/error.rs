//! Error types for the payslip workspace.
//!
//! Library crates use [`PayslipError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all payslip operations.
#[derive(Debug, thiserror::Error)]
pub enum PayslipError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the generation provider.
    #[error("network error: {0}")]
    Network(String),

    /// Uploaded content could not be decoded (unsupported type, corrupt image).
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Structured data could not be parsed (JSON payloads, model replies).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Index store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generation provider error (API failure, malformed response).
    #[error("generation error: {0}")]
    Generation(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Caller supplied arguments that make the request meaningless.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PayslipError>;

impl PayslipError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a decode error from any displayable message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create an invalid-argument error from any displayable message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure was caused by the caller's input rather than by
    /// the system (unsupported upload, missing identifiers).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::InvalidArgument { .. })
    }
}
