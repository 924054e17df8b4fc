//! # Design
//!
//! - Provide structured, constant-message errors for the repair pipeline.
//! - Capture operation context (paths, fields) so failures are reproducible in tests.
//! - Keep media extraction failures separate: they are ordinary comparison outcomes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for repair operations.
pub type RepairResult<T> = Result<T, RepairError>;

/// Errors produced by repair reporting and file handling.
#[derive(Debug, Error)]
pub enum RepairError {
    /// IO failures while interacting with the filesystem.
    #[error("repair io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// JSON parsing or serialization failures for reports.
    #[error("repair json failure")]
    Json {
        /// Operation that triggered the JSON failure.
        operation: &'static str,
        /// Path involved in the JSON failure.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A digest check failed after a copy.
    #[error("repair integrity check failed")]
    Integrity {
        /// Operation whose output failed verification.
        operation: &'static str,
        /// File that failed verification.
        path: PathBuf,
        /// Expected SHA-256 digest.
        expected: String,
        /// Observed SHA-256 digest.
        actual: String,
    },
    /// Input validation failures.
    #[error("repair invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

impl RepairError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Context and cause in one line, for reports and operator output.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {source}", path.display()),
            Self::Json {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {source}", path.display()),
            Self::Integrity {
                operation,
                path,
                expected,
                actual,
            } => format!(
                "{operation} digest mismatch for {}: expected {expected}, found {actual}",
                path.display()
            ),
            Self::InvalidInput {
                field,
                reason,
                value,
            } => value.as_ref().map_or_else(
                || format!("{field} {reason}"),
                |value| format!("{field} {reason}: {value}"),
            ),
        }
    }
}

/// Reasons media properties could not be extracted.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file does not exist.
    #[error("media file not found")]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },
    /// The probe binary could not be started.
    #[error("failed to run media probe")]
    Spawn {
        /// Probe binary.
        binary: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The probe did not finish within its deadline.
    #[error("media probe timed out")]
    Timeout {
        /// Probed path.
        path: PathBuf,
    },
    /// The probe exited unsuccessfully.
    #[error("media probe failed")]
    ProbeFailed {
        /// Probed path.
        path: PathBuf,
        /// Exit code when available.
        code: Option<i32>,
    },
    /// The probe output was not the expected JSON.
    #[error("media probe output malformed")]
    Malformed {
        /// Probed path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// The file carries no audio stream.
    #[error("no audio stream found")]
    NoAudioStream {
        /// Probed path.
        path: PathBuf,
    },
    /// Capturing probe output failed.
    #[error("media probe io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Underlying IO error.
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn repair_error_helpers_build_variants() {
        let io_err = RepairError::io("backup.copy", "/library/book.m4b", io::Error::other("io"));
        assert!(matches!(
            io_err,
            RepairError::Io {
                operation: "backup.copy",
                ..
            }
        ));
        assert!(io_err.source().is_some());
        assert_eq!(io_err.to_string(), "repair io failure");
        assert_eq!(io_err.detail(), "backup.copy failed for /library/book.m4b: io");

        let json_source = serde_json::from_str::<serde_json::Value>("{")
            .err()
            .map(|err| RepairError::json("report.decode", "report.json", err));
        assert!(matches!(json_source, Some(RepairError::Json { .. })));

        let invalid = RepairError::InvalidInput {
            field: "original",
            reason: "file not found",
            value: Some("/library/book.m4b".into()),
        };
        assert_eq!(invalid.detail(), "original file not found: /library/book.m4b");
    }

    #[test]
    fn extraction_errors_have_constant_messages() {
        let err = ExtractionError::ProbeFailed {
            path: PathBuf::from("a.mp3"),
            code: Some(1),
        };
        assert_eq!(err.to_string(), "media probe failed");
        assert!(err.source().is_none());
    }
}
