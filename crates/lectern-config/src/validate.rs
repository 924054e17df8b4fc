//! Validation helpers for configuration documents.

use std::collections::HashSet;

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{EndpointDescriptor, LecternConfig};

/// Validate a fully merged configuration document.
///
/// # Errors
///
/// Returns the first [`ConfigError::InvalidField`] encountered.
pub fn validate(config: &LecternConfig) -> ConfigResult<()> {
    validate_endpoints(&config.endpoints)?;

    ensure_positive("vpn", "timeout_secs", config.vpn.timeout_secs)?;
    if config.vpn.port == 0 {
        return Err(ConfigError::invalid(
            "vpn",
            "port",
            Some("0".to_string()),
            "must be between 1 and 65535",
        ));
    }

    ensure_positive("dispatch", "probe_timeout_secs", config.dispatch.probe_timeout_secs)?;
    ensure_positive(
        "dispatch",
        "submit_timeout_secs",
        config.dispatch.submit_timeout_secs,
    )?;
    if config.dispatch.queue_path.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            "dispatch",
            "queue_path",
            None,
            "must not be empty",
        ));
    }

    ensure_positive("repair", "probe_timeout_secs", config.repair.probe_timeout_secs)?;
    if config.repair.max_candidates == 0 {
        return Err(ConfigError::invalid(
            "repair",
            "max_candidates",
            Some("0".to_string()),
            "must be at least 1",
        ));
    }
    validate_backup_dir_name(&config.repair.backup_dir_name)?;

    if let Some(format) = config.logging.format.as_deref()
        && !matches!(format, "json" | "pretty")
    {
        return Err(ConfigError::invalid(
            "logging",
            "format",
            Some(format.to_string()),
            "must be 'json' or 'pretty'",
        ));
    }

    Ok(())
}

fn validate_endpoints(endpoints: &[EndpointDescriptor]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for endpoint in endpoints {
        let name = endpoint.name.trim();
        if name.is_empty() {
            return Err(ConfigError::invalid(
                "endpoints",
                "name",
                None,
                "must not be empty",
            ));
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(ConfigError::invalid(
                "endpoints",
                "name",
                Some(name.to_string()),
                "must be unique",
            ));
        }
        // Blank addresses are allowed; the prober reports them as NOT_CONFIGURED.
        if let Some(base_url) = endpoint
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            parse_base_url(name, base_url)?;
        }
    }
    Ok(())
}

fn parse_base_url(name: &str, raw: &str) -> ConfigResult<Url> {
    let url = Url::parse(raw).map_err(|_| {
        ConfigError::invalid(
            "endpoints",
            format!("{name}.base_url"),
            Some(raw.to_string()),
            "must be an absolute URL",
        )
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "endpoints",
            format!("{name}.base_url"),
            Some(raw.to_string()),
            "scheme must be http or https",
        ));
    }
    Ok(url)
}

fn validate_backup_dir_name(name: &str) -> ConfigResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(
            "repair",
            "backup_dir_name",
            None,
            "must not be empty",
        ));
    }
    if trimmed.contains(['/', '\\']) || matches!(trimmed, "." | "..") {
        return Err(ConfigError::invalid(
            "repair",
            "backup_dir_name",
            Some(name.to_string()),
            "must be a single directory name",
        ));
    }
    Ok(())
}

fn ensure_positive(section: &'static str, field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(value.to_string()),
            "must be positive",
        ));
    }
    Ok(())
}
