//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers shared by the dispatch, repair and CLI crates.
//! - Every section has serde defaults so a minimal document only lists endpoints.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LecternConfig {
    /// Execution endpoints in caller order.
    pub endpoints: Vec<EndpointDescriptor>,
    /// VPN reachability probing.
    pub vpn: VpnSettings,
    /// Failover dispatch and durable queue settings.
    pub dispatch: DispatchSettings,
    /// Repair orchestration settings.
    pub repair: RepairSettings,
    /// Logging defaults (overridden by `RUST_LOG`).
    pub logging: LoggingSettings,
}

/// Role an endpoint plays in the failover order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    /// Preferred endpoint, tried before any secondary.
    #[default]
    Primary,
    /// Fallback endpoint.
    Secondary,
}

impl EndpointRole {
    /// Render the role as its lowercase string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution endpoint (a qBittorrent Web API instance).
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointDescriptor {
    /// Unique operator-facing name.
    pub name: String,
    /// Base address, e.g. `http://10.0.0.2:8080`.
    pub base_url: Option<String>,
    /// Login user.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Failover role.
    pub role: EndpointRole,
    /// Gateway that must answer before the endpoint is considered; presence
    /// makes the endpoint VPN-gated.
    pub vpn_gateway: Option<String>,
}

impl EndpointDescriptor {
    /// Whether the endpoint carries an address and a credential pair.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        non_blank(self.base_url.as_deref())
            && non_blank(self.username.as_deref())
            && non_blank(self.password.as_deref())
    }

    /// Gateway address when the endpoint sits behind a VPN tunnel.
    #[must_use]
    pub fn vpn_gateway(&self) -> Option<&str> {
        self.vpn_gateway
            .as_deref()
            .map(str::trim)
            .filter(|gateway| !gateway.is_empty())
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .field("vpn_gateway", &self.vpn_gateway)
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|value| !value.trim().is_empty())
}

/// How the VPN gateway is probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VpnProbeMethod {
    /// One ICMP echo via the system `ping` binary.
    #[default]
    Icmp,
    /// TCP connect to `gateway:port`.
    Tcp,
}

/// VPN reachability settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VpnSettings {
    /// Probe method.
    pub method: VpnProbeMethod,
    /// Port used by the TCP probe.
    pub port: u16,
    /// Probe deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for VpnSettings {
    fn default() -> Self {
        Self {
            method: VpnProbeMethod::default(),
            port: defaults::VPN_TCP_PORT,
            timeout_secs: defaults::VPN_TIMEOUT_SECS,
        }
    }
}

impl VpnSettings {
    /// Probe deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Failover dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchSettings {
    /// Deadline for login and version query.
    pub probe_timeout_secs: u64,
    /// Deadline for one submission.
    pub submit_timeout_secs: u64,
    /// Durable queue file.
    pub queue_path: PathBuf,
    /// Category applied to tasks that do not carry one.
    pub category: Option<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: defaults::PROBE_TIMEOUT_SECS,
            submit_timeout_secs: defaults::SUBMIT_TIMEOUT_SECS,
            queue_path: PathBuf::from(defaults::QUEUE_PATH),
            category: None,
        }
    }
}

impl DispatchSettings {
    /// Probe deadline as a [`Duration`].
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Submission deadline as a [`Duration`].
    #[must_use]
    pub const fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}

/// Repair orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepairSettings {
    /// `ffprobe` binary, resolved through `PATH` when relative.
    pub ffprobe_path: PathBuf,
    /// Deadline for one `ffprobe` invocation.
    pub probe_timeout_secs: u64,
    /// Maximum candidates evaluated by a batch.
    pub max_candidates: usize,
    /// Name of the sibling directory receiving backups.
    pub backup_dir_name: String,
    /// Master switch consulted by the safety gate.
    pub allow_replacements: bool,
    /// Library roots an original must live under; empty permits any path.
    pub library_roots: Vec<PathBuf>,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            ffprobe_path: PathBuf::from(defaults::FFPROBE_PATH),
            probe_timeout_secs: defaults::FFPROBE_TIMEOUT_SECS,
            max_candidates: defaults::MAX_CANDIDATES,
            backup_dir_name: defaults::BACKUP_DIR_NAME.to_string(),
            allow_replacements: true,
            library_roots: Vec::new(),
        }
    }
}

impl RepairSettings {
    /// `ffprobe` deadline as a [`Duration`].
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Logging defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `json` or `pretty`; absent selects the build default.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}
