//! VPN gateway reachability checks.
//!
//! # Design
//! - A single probe per check; unreachable is `false`, never an error.
//! - The last observation is kept for display only and never short-circuits a check.

use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_config::{VpnProbeMethod, VpnSettings};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, warn};

/// Strategy used to decide whether a gateway answers.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// Send one probe and report whether a reply arrived within `timeout`.
    async fn reachable(&self, gateway: &str, timeout: Duration) -> bool;
}

/// One ICMP echo through the system `ping` binary.
#[derive(Debug, Clone, Default)]
pub struct IcmpProbe;

#[async_trait]
impl Reachability for IcmpProbe {
    async fn reachable(&self, gateway: &str, timeout: Duration) -> bool {
        let deadline_secs = timeout.as_secs().max(1).to_string();
        let child = Command::new("ping")
            .args(["-c", "1", "-W", deadline_secs.as_str()])
            .arg(gateway)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(err)) => {
                warn!(gateway = %gateway, error = %err, "failed to run ping");
                false
            }
            Err(_) => false,
        }
    }
}

/// TCP connect to `gateway:port` (or to an explicit `host:port` gateway).
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
}

impl TcpProbe {
    /// Probe the given port when the gateway carries none.
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self { port }
    }

    fn target(&self, gateway: &str) -> String {
        if gateway.parse::<std::net::SocketAddr>().is_ok() {
            return gateway.to_string();
        }
        if gateway.parse::<std::net::Ipv6Addr>().is_ok() {
            return format!("[{gateway}]:{}", self.port);
        }
        if let Some((host, port)) = gateway.rsplit_once(':')
            && !host.contains(':')
            && port.parse::<u16>().is_ok()
        {
            return gateway.to_string();
        }
        format!("{gateway}:{}", self.port)
    }
}

#[async_trait]
impl Reachability for TcpProbe {
    async fn reachable(&self, gateway: &str, timeout: Duration) -> bool {
        let target = self.target(gateway);
        match tokio::time::timeout(timeout, TcpStream::connect(target.as_str())).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                debug!(gateway = %target, error = %err, "gateway refused connection");
                false
            }
            Err(_) => false,
        }
    }
}

/// Most recent probe result, kept for status display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VpnObservation {
    /// Gateway probed.
    pub gateway: String,
    /// Whether it answered.
    pub reachable: bool,
    /// When the probe finished.
    pub checked_at: DateTime<Utc>,
}

/// Reachability monitor for VPN-gated endpoints.
pub struct VpnMonitor {
    probe: Box<dyn Reachability>,
    timeout: Duration,
    last: Mutex<Option<VpnObservation>>,
}

impl VpnMonitor {
    /// Build a monitor around an explicit probe strategy.
    #[must_use]
    pub fn new(probe: Box<dyn Reachability>, timeout: Duration) -> Self {
        Self {
            probe,
            timeout,
            last: Mutex::new(None),
        }
    }

    /// Build a monitor from the `vpn` configuration section.
    #[must_use]
    pub fn from_settings(settings: &VpnSettings) -> Self {
        let probe: Box<dyn Reachability> = match settings.method {
            VpnProbeMethod::Icmp => Box::new(IcmpProbe),
            VpnProbeMethod::Tcp => Box::new(TcpProbe::new(settings.port)),
        };
        Self::new(probe, settings.timeout())
    }

    /// Configured per-probe deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `gateway` once with the configured deadline.
    pub async fn check_default(&self, gateway: &str) -> bool {
        self.check(gateway, self.timeout).await
    }

    /// Probe `gateway` once; true only when it answers within `timeout`.
    pub async fn check(&self, gateway: &str, timeout: Duration) -> bool {
        let reachable = self.probe.reachable(gateway, timeout).await;
        debug!(gateway = %gateway, reachable, "vpn gateway probed");
        if let Ok(mut last) = self.last.lock() {
            *last = Some(VpnObservation {
                gateway: gateway.to_string(),
                reachable,
                checked_at: Utc::now(),
            });
        }
        reachable
    }

    /// Last probe result, if any.
    #[must_use]
    pub fn last_observation(&self) -> Option<VpnObservation> {
        self.last.lock().ok().and_then(|last| last.clone())
    }
}

impl std::fmt::Debug for VpnMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VpnMonitor")
            .field("timeout", &self.timeout)
            .field("last", &self.last_observation())
            .finish_non_exhaustive()
    }
}
