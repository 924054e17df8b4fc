//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: String,
        /// Field that failed validation.
        field: String,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Configuration document could not be parsed.
    #[error("failed to parse configuration document")]
    Parse {
        /// Document that failed to parse.
        path: PathBuf,
        /// Source JSON error.
        source: serde_json::Error,
    },
    /// File system operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: impl Into<String>,
        field: impl Into<String>,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section: section.into(),
            field: field.into(),
            value,
            reason,
        }
    }

    /// Render a one-line description including the offending field, suitable
    /// for operator-facing output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::InvalidField {
                section,
                field,
                value,
                reason,
            } => match value {
                Some(value) => format!("{section}.{field} = '{value}': {reason}"),
                None => format!("{section}.{field}: {reason}"),
            },
            Self::Parse { path, source } => {
                format!("{}: {source}", path.display())
            }
            Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} {}: {source}", path.display()),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_includes_field_context() {
        let err =
            ConfigError::invalid("repair", "max_candidates", Some("0".into()), "must be >= 1");
        assert_eq!(err.to_string(), "invalid configuration field");
        assert_eq!(err.describe(), "repair.max_candidates = '0': must be >= 1");

        let err = ConfigError::invalid("endpoints", "name", None, "must not be empty");
        assert_eq!(err.describe(), "endpoints.name: must not be empty");
    }

    #[test]
    fn io_error_describes_operation_and_path() {
        let err = ConfigError::Io {
            operation: "config.read",
            path: PathBuf::from("/missing/lectern.json"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.to_string(), "filesystem operation failed");
        assert!(err.describe().starts_with("config.read /missing/lectern.json"));
    }
}
