//! Shared command state, configuration loading and CLI error types.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use lectern_config::{
    CONFIG_PATH_ENV, ConfigError, LecternConfig, apply_overrides, load, resolve_path, validate,
};
use lectern_telemetry::Metrics;
use tracing::{debug, warn};

use crate::cli::OutputFormat;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

/// How a command that ran to the end left its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Everything requested was done.
    Done,
    /// The command finished but left work behind (tasks queued, a failed swap).
    WorkLeft,
}

impl Completion {
    pub(crate) const fn exit_code(self) -> i32 {
        match self {
            Self::Done => 0,
            Self::WorkLeft => 4,
        }
    }

    pub(crate) const fn from_flag(done: bool) -> Self {
        if done { Self::Done } else { Self::WorkLeft }
    }
}

/// Application context passed to command handlers.
#[derive(Debug, Clone)]
pub(crate) struct AppContext {
    pub(crate) config: LecternConfig,
    pub(crate) output: OutputFormat,
    pub(crate) metrics: Metrics,
}

impl AppContext {
    pub(crate) fn new(config: LecternConfig, output: OutputFormat) -> CliResult<Self> {
        let metrics = Metrics::new()
            .map_err(|err| CliError::failure(anyhow!("failed to build metrics registry: {err}")))?;
        Ok(Self {
            config,
            output,
            metrics,
        })
    }

    /// Write the metrics registry to a node-exporter textfile.
    pub(crate) fn export_metrics(&self, path: &Path) {
        if let Err(err) = self.metrics.write_textfile(path) {
            warn!(path = %path.display(), error = %err, "failed to write metrics textfile");
        }
    }
}

/// Load configuration from `--config`, `LECTERN_CONFIG` or `lectern.json`.
///
/// When neither flag nor variable is given and the default file is absent,
/// built-in defaults are used so repair commands work without a file.
pub(crate) fn load_config(explicit: Option<&Path>) -> CliResult<LecternConfig> {
    let path = resolve_path(explicit);
    let implicit = explicit.is_none() && std::env::var_os(CONFIG_PATH_ENV).is_none();
    if implicit && !path.exists() {
        debug!(path = %path.display(), "no configuration file; using defaults");
        let mut config = LecternConfig::default();
        apply_overrides(&mut config, |key| std::env::var(key).ok());
        validate(&config).map_err(config_error)?;
        return Ok(config);
    }
    load(&path).map_err(config_error)
}

pub(crate) fn config_error(err: ConfigError) -> CliError {
    let message = format!("configuration error: {}", err.describe());
    match err {
        ConfigError::Io { .. } => CliError::failure(anyhow!(message)),
        ConfigError::InvalidField { .. } | ConfigError::Parse { .. } => {
            CliError::validation(message)
        }
    }
}

/// Require a non-blank path argument.
pub(crate) fn require_path(field: &str, path: &Path) -> CliResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(CliError::validation(format!("{field} must not be empty")));
    }
    Ok(path.to_path_buf())
}
