//! Endpoint health probing.
//!
//! # Design
//! - Probe order: configuration, VPN gateway, login, authenticated version query.
//! - Every failure folds into a [`HealthStatus`]; probing never returns an error.
//! - Reports are not cached; each dispatch cycle probes again.

use chrono::Utc;
use lectern_config::{EndpointDescriptor, LecternConfig};
use lectern_telemetry::Metrics;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::EndpointError;
use crate::model::{HealthReport, HealthStatus};
use crate::qbittorrent::{EndpointTimeouts, QbittorrentClient};
use crate::vpn::VpnMonitor;

/// Probes endpoints and builds clients for the healthy ones.
#[derive(Debug)]
pub struct EndpointProber {
    http: Client,
    vpn: VpnMonitor,
    timeouts: EndpointTimeouts,
    metrics: Option<Metrics>,
}

impl EndpointProber {
    /// Build a prober from its collaborators.
    #[must_use]
    pub const fn new(http: Client, vpn: VpnMonitor, timeouts: EndpointTimeouts) -> Self {
        Self {
            http,
            vpn,
            timeouts,
            metrics: None,
        }
    }

    /// Build a prober from configuration, sharing `http` across endpoints.
    #[must_use]
    pub fn from_config(http: Client, config: &LecternConfig) -> Self {
        Self::new(
            http,
            VpnMonitor::from_settings(&config.vpn),
            EndpointTimeouts {
                probe: config.dispatch.probe_timeout(),
                submit: config.dispatch.submit_timeout(),
            },
        )
    }

    /// Record probe outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// VPN monitor used for gated endpoints.
    #[must_use]
    pub const fn vpn(&self) -> &VpnMonitor {
        &self.vpn
    }

    /// Bind an API client to `endpoint` with the prober's HTTP client and deadlines.
    ///
    /// # Errors
    ///
    /// See [`QbittorrentClient::new`].
    pub fn connect(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<QbittorrentClient, EndpointError> {
        QbittorrentClient::new(self.http.clone(), endpoint, self.timeouts)
    }

    /// Probe every endpoint once, in caller order.
    pub async fn probe_all(&self, endpoints: &[EndpointDescriptor]) -> Vec<HealthReport> {
        let mut reports = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            reports.push(self.probe(endpoint).await);
        }
        reports
    }

    /// Probe one endpoint.
    pub async fn probe(&self, endpoint: &EndpointDescriptor) -> HealthReport {
        let status = self.probe_status(endpoint).await;
        if let Some(metrics) = &self.metrics {
            metrics.inc_endpoint_probe(&endpoint.name, &status.label());
        }
        if status.is_healthy() {
            info!(
                endpoint = %endpoint.name,
                role = %endpoint.role,
                status = %status,
                "endpoint healthy"
            );
        } else {
            warn!(
                endpoint = %endpoint.name,
                role = %endpoint.role,
                status = %status,
                "endpoint unhealthy"
            );
        }
        HealthReport {
            endpoint: endpoint.name.clone(),
            role: endpoint.role,
            status,
            checked_at: Utc::now(),
        }
    }

    async fn probe_status(&self, endpoint: &EndpointDescriptor) -> HealthStatus {
        if !endpoint.is_configured() {
            return HealthStatus::NotConfigured;
        }
        if let Some(gateway) = endpoint.vpn_gateway()
            && !self.vpn.check_default(gateway).await
        {
            return HealthStatus::VpnDown;
        }

        let client = match self.connect(endpoint) {
            Ok(client) => client,
            Err(EndpointError::NotConfigured) => return HealthStatus::NotConfigured,
            Err(err) => {
                warn!(endpoint = %endpoint.name, error = %err, "endpoint address unusable");
                return HealthStatus::UnknownError;
            }
        };

        let session = match client.login().await {
            Ok(session) => session,
            Err(err) => {
                debug!(endpoint = %endpoint.name, error = ?err, "login failed");
                return login_failure_status(&err);
            }
        };

        let status = match client.version(&session).await {
            Ok(version) => {
                debug!(endpoint = %endpoint.name, version = %version, "version query succeeded");
                HealthStatus::Ok
            }
            Err(err) => {
                debug!(endpoint = %endpoint.name, error = ?err, "version query failed");
                query_failure_status(&err)
            }
        };

        if let Err(err) = client.logout(session).await {
            debug!(endpoint = %endpoint.name, error = %err, "logout failed");
        }
        status
    }
}

const fn login_failure_status(err: &EndpointError) -> HealthStatus {
    match err {
        EndpointError::AuthRejected { .. } | EndpointError::MalformedAck { .. } => {
            HealthStatus::AuthFailed
        }
        EndpointError::Timeout { .. } => HealthStatus::Timeout,
        EndpointError::NotConfigured => HealthStatus::NotConfigured,
        _ => HealthStatus::UnknownError,
    }
}

const fn query_failure_status(err: &EndpointError) -> HealthStatus {
    match err {
        EndpointError::Timeout { .. } => HealthStatus::Timeout,
        EndpointError::Status { status, .. } => HealthStatus::Http(*status),
        _ => HealthStatus::UnknownError,
    }
}
