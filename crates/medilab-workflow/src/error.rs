//! Error types for the diagnostic workflow
//!
//! Provides error handling for:
//! - Credential gating (silent no-ops)
//! - Transport failures against the backend (retryable)
//! - Archival decode failures (isolated per record)
//! - Download triggering
//! - Illegal state-machine events

use crate::state_machine::WorkflowState;
use medilab_artifact::{DecodeError, DownloadError};

/// Main workflow error type
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Credential absent, malformed or expired; the stage did nothing
    #[error("credential not usable")]
    AuthNotUsable,

    /// Upload did not produce a locator
    #[error("upload failed: {0}")]
    UploadFailed(#[source] TransportError),

    /// Analysis request did not produce a report
    #[error("diagnosis failed: {0}")]
    DiagnosisFailed(#[source] TransportError),

    /// Diagnosis task ended before producing an outcome
    #[error("diagnosis interrupted before a result arrived")]
    DiagnosisInterrupted,

    /// Archival payload could not be decoded
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Download trigger failed (object URL already released)
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    /// Event not permitted in the current state
    #[error("illegal transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// Scan requested before an image was uploaded
    #[error("no uploaded image to scan")]
    MissingLocator,

    /// No report available
    #[error("no report available")]
    NoReport,
}

/// Coarse classification used by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stage no-op because the credential is not usable
    Auth,
    /// Network or non-2xx; retry is offered
    Transport,
    /// Malformed archival payload
    Decode,
    /// Download trigger failure
    Download,
    /// Event rejected by the state machine
    State,
}

impl WorkflowError {
    /// Classification of this error
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthNotUsable => ErrorKind::Auth,
            Self::UploadFailed(_) | Self::DiagnosisFailed(_) | Self::DiagnosisInterrupted => {
                ErrorKind::Transport
            }
            Self::Decode(_) => ErrorKind::Decode,
            Self::Download(_) => ErrorKind::Download,
            Self::IllegalTransition { .. } | Self::MissingLocator | Self::NoReport => {
                ErrorKind::State
            }
        }
    }

    /// Check if the user may simply try again
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UploadFailed(_) | Self::DiagnosisFailed(_) | Self::DiagnosisInterrupted
        )
    }

    /// Check if the error should be swallowed rather than shown
    #[inline]
    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::AuthNotUsable)
    }
}

/// Failures talking to the backend
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Non-2xx response
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not parse
    #[error("invalid response body: {0}")]
    InvalidBody(String),

    /// Expected JSON field missing or empty
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::InvalidBody(value.to_string())
        } else if let Some(status) = value.status() {
            Self::Status {
                status: status.as_u16(),
                message: value.to_string(),
            }
        } else {
            Self::Network(value.to_string())
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Base URL or endpoint path does not form a URL
    #[error("invalid URL `{value}`: {reason}")]
    InvalidUrl { value: String, reason: String },

    /// Value out of range
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },

    /// HTTP client could not be built
    #[error("http client error: {0}")]
    Client(String),
}
