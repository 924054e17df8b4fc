//! Telemetry failures.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Failures while installing logging or maintaining the metrics registry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber could not be installed.
    #[error("logging initialisation failed")]
    LoggingInit {
        /// Subscriber install failure, usually a second install.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// A collector could not be defined or registered.
    #[error("metric setup failed")]
    Metric {
        /// `metrics.define` or `metrics.register`.
        operation: &'static str,
        /// Metric family name.
        metric: &'static str,
        /// Prometheus failure.
        #[source]
        source: prometheus::Error,
    },
    /// The registry could not be rendered in text exposition format.
    #[error("metrics rendering failed")]
    Render {
        /// Encoder failure.
        #[source]
        source: prometheus::Error,
    },
    /// The rendered exposition was not UTF-8.
    #[error("rendered metrics were not utf-8")]
    RenderEncoding {
        /// Conversion failure.
        #[source]
        source: std::string::FromUtf8Error,
    },
    /// The node-exporter textfile could not be written.
    #[error("metrics textfile write failed")]
    Textfile {
        /// Staging or final path.
        path: PathBuf,
        /// Filesystem failure.
        #[source]
        source: std::io::Error,
    },
}

impl TelemetryError {
    pub(crate) const fn metric(
        operation: &'static str,
        metric: &'static str,
        source: prometheus::Error,
    ) -> Self {
        Self::Metric {
            operation,
            metric,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn metric_failure_keeps_context_and_source() {
        let err = TelemetryError::metric(
            "metrics.register",
            "queued_tasks",
            prometheus::Error::AlreadyReg,
        );
        assert_eq!(err.to_string(), "metric setup failed");
        assert!(matches!(
            err,
            TelemetryError::Metric {
                operation: "metrics.register",
                metric: "queued_tasks",
                ..
            }
        ));
        assert!(err.source().is_some());
    }

    #[test]
    fn textfile_failure_exposes_io_source() {
        let err = TelemetryError::Textfile {
            path: PathBuf::from("/var/lib/node_exporter/lectern.prom"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "metrics textfile write failed");
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("denied"));
    }

    #[test]
    fn invalid_utf8_render_is_reported() {
        let Err(source) = String::from_utf8(vec![0xff, 0xfe]) else {
            panic!("bytes should not decode");
        };
        let err = TelemetryError::RenderEncoding { source };
        assert_eq!(err.to_string(), "rendered metrics were not utf-8");
    }
}
