//! Error types for dispatch and queue operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Primary error type for dispatch operations that cannot be folded into a
/// health status or a queued task.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Filesystem operation on the queue failed.
    #[error("queue filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// Queue record could not be encoded or decoded.
    #[error("queue record serialization failed")]
    Json {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source JSON error.
        source: serde_json::Error,
    },
    /// Exclusive queue lock could not be acquired.
    #[cfg(unix)]
    #[error("failed to lock queue")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Source errno.
        source: nix::errno::Errno,
    },
    /// HTTP client construction failed.
    #[error("failed to build HTTP client")]
    HttpClient {
        /// Source reqwest error.
        source: reqwest::Error,
    },
}

impl DispatchError {
    pub(crate) fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(operation: &'static str, path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Convenience alias for dispatch results.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failure of a single call against an execution endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Endpoint has no address or credentials.
    #[error("endpoint not configured")]
    NotConfigured,
    /// Endpoint address could not be parsed.
    #[error("invalid endpoint address")]
    InvalidUrl {
        /// Offending address.
        value: String,
    },
    /// Call did not complete within its deadline.
    #[error("endpoint call timed out")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Endpoint answered with a non-success status.
    #[error("endpoint returned an error status")]
    Status {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
    },
    /// Login was refused.
    #[error("endpoint rejected credentials")]
    AuthRejected {
        /// HTTP status code of the refusal.
        status: u16,
    },
    /// Endpoint answered 2xx but without the expected acknowledgement.
    #[error("endpoint returned a malformed acknowledgement")]
    MalformedAck {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Endpoint refused the submitted task.
    #[error("endpoint rejected the task")]
    Rejected,
    /// Request failed below HTTP (connect, TLS, body read).
    #[error("endpoint transport failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Source reqwest error.
        source: reqwest::Error,
    },
}

impl EndpointError {
    pub(crate) fn from_reqwest(operation: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { operation }
        } else {
            Self::Transport { operation, source }
        }
    }

    /// Short machine-readable outcome label used for metrics and logs.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Timeout { .. } => "timeout",
            Self::Status { .. } => "http_error",
            Self::AuthRejected { .. } => "auth_failed",
            Self::MalformedAck { .. } => "malformed_ack",
            Self::Rejected => "rejected",
            Self::Transport { .. } => "transport_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(EndpointError::NotConfigured.outcome(), "not_configured");
        assert_eq!(
            EndpointError::Timeout { operation: "login" }.outcome(),
            "timeout"
        );
        assert_eq!(
            EndpointError::Status {
                operation: "version",
                status: 503
            }
            .outcome(),
            "http_error"
        );
        assert_eq!(EndpointError::Rejected.to_string(), "endpoint rejected the task");
    }

    #[test]
    fn io_helper_keeps_context() {
        let err = DispatchError::io(
            "queue.write",
            Path::new("/tmp/queue.json"),
            io::Error::other("disk full"),
        );
        match err {
            DispatchError::Io {
                operation, path, ..
            } => {
                assert_eq!(operation, "queue.write");
                assert_eq!(path, PathBuf::from("/tmp/queue.json"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
