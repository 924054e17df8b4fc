//! File loading and environment overrides.
//!
//! # Design
//! - Read once per invocation; there is no watcher or reload path.
//! - Environment lookups go through a closure so tests never mutate the process env.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::defaults::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use crate::error::{ConfigError, ConfigResult};
use crate::model::LecternConfig;
use crate::validate::validate;

/// Overrides the configured log level.
pub const LOG_LEVEL_ENV: &str = "LECTERN_LOG_LEVEL";
/// Overrides the durable queue location.
pub const QUEUE_PATH_ENV: &str = "LECTERN_QUEUE_PATH";

/// Resolve the configuration path from an explicit value, then
/// `LECTERN_CONFIG`, then the default file name.
#[must_use]
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(
        || {
            std::env::var_os(CONFIG_PATH_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
        },
        Path::to_path_buf,
    )
}

/// Load, override from the process environment, and validate a config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read,
/// [`ConfigError::Parse`] when it is not a valid document, and
/// [`ConfigError::InvalidField`] when validation fails.
pub fn load(path: &Path) -> ConfigResult<LecternConfig> {
    load_with_env(path, |key| std::env::var(key).ok())
}

/// Like [`load`], with an explicit environment lookup.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<F>(path: &Path, lookup: F) -> ConfigResult<LecternConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: LecternConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    apply_overrides(&mut config, lookup);
    validate(&config)?;
    debug!(
        path = %path.display(),
        endpoints = config.endpoints.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Apply `LECTERN_*` environment overrides to a parsed document.
pub fn apply_overrides<F>(config: &mut LecternConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|value| !value.trim().is_empty()) {
        config.logging.level = level;
    }
    if let Some(queue_path) = lookup(QUEUE_PATH_ENV).filter(|value| !value.trim().is_empty()) {
        config.dispatch.queue_path = PathBuf::from(queue_path);
    }
    for endpoint in &mut config.endpoints {
        if let Some(password) = lookup(&password_env_key(&endpoint.name)) {
            endpoint.password = Some(password);
        }
    }
}

/// Environment key carrying the password for an endpoint name.
#[must_use]
pub fn password_env_key(endpoint_name: &str) -> String {
    let normalized: String = endpoint_name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("LECTERN_ENDPOINT_{normalized}_PASSWORD")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn password_key_normalizes_name() {
        assert_eq!(
            password_env_key("seed-box.eu"),
            "LECTERN_ENDPOINT_SEED_BOX_EU_PASSWORD"
        );
    }

    #[test]
    fn overrides_replace_level_queue_and_password() -> Result<(), serde_json::Error> {
        let mut config: LecternConfig =
            serde_json::from_str(r#"{"endpoints":[{"name":"home","password":"old"}]}"#)?;
        let env: HashMap<&str, &str> = HashMap::from([
            ("LECTERN_LOG_LEVEL", "debug"),
            ("LECTERN_QUEUE_PATH", "/var/lib/lectern/queue.json"),
            ("LECTERN_ENDPOINT_HOME_PASSWORD", "new"),
        ]);
        apply_overrides(&mut config, |key| env.get(key).map(|value| (*value).to_string()));

        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.dispatch.queue_path,
            PathBuf::from("/var/lib/lectern/queue.json")
        );
        assert_eq!(config.endpoints[0].password.as_deref(), Some("new"));
        Ok(())
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let mut config = LecternConfig::default();
        apply_overrides(&mut config, |_| Some("  ".to_string()));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.dispatch.queue_path, PathBuf::from("lectern-queue.json"));
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            resolve_path(Some(Path::new("/etc/lectern.json"))),
            PathBuf::from("/etc/lectern.json")
        );
    }
}
