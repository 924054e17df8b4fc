//! Failover dispatch of download tasks across redundant endpoints.
//!
//! # Design
//! - Endpoints are probed once per batch; only `OK` endpoints receive tasks.
//! - Healthy endpoints keep caller order with primaries ahead of secondaries.
//! - Each submission runs its own login/submit/logout cycle.
//! - Every input task ends either submitted or queued, never both.

use std::borrow::Cow;

use lectern_config::{EndpointDescriptor, EndpointRole, LecternConfig};
use lectern_telemetry::Metrics;
use reqwest::Client;
use tracing::{info, warn};

use crate::error::{DispatchError, DispatchResult, EndpointError};
use crate::model::{
    DispatchReport, DrainReport, HealthReport, QueuePersistence, Submission, Task,
};
use crate::prober::EndpointProber;
use crate::qbittorrent::QbittorrentClient;
use crate::queue::{DEFAULT_QUEUE_REASON, DurableQueue};

/// Stages a dispatch run moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    /// Probing every endpoint.
    ProbeAll,
    /// Submitting tasks to healthy endpoints.
    DispatchEachTask,
    /// Writing leftover tasks to the durable queue.
    PersistQueue,
    /// Run finished.
    Done,
}

impl DispatchStage {
    /// Stable stage label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProbeAll => "probe_all",
            Self::DispatchEachTask => "dispatch_each_task",
            Self::PersistQueue => "persist_queue",
            Self::Done => "done",
        }
    }
}

struct BatchOutcome {
    health: Vec<HealthReport>,
    submitted: Vec<Submission>,
    queued: Vec<Task>,
}

/// Submits tasks to the first healthy endpoint that accepts them and queues the rest.
#[derive(Debug)]
pub struct FailoverDispatcher {
    prober: EndpointProber,
    queue: DurableQueue,
    default_category: Option<String>,
    metrics: Option<Metrics>,
}

impl FailoverDispatcher {
    /// Build a dispatcher from a prober and a queue.
    #[must_use]
    pub const fn new(prober: EndpointProber, queue: DurableQueue) -> Self {
        Self {
            prober,
            queue,
            default_category: None,
            metrics: None,
        }
    }

    /// Build a dispatcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::HttpClient`] when the HTTP client cannot be built.
    pub fn from_config(config: &LecternConfig) -> DispatchResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("lectern/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| DispatchError::HttpClient { source })?;
        let prober = EndpointProber::from_config(http, config);
        let queue = DurableQueue::new(config.dispatch.queue_path.clone());
        let mut dispatcher = Self::new(prober, queue);
        dispatcher.default_category = config.dispatch.category.clone();
        Ok(dispatcher)
    }

    /// Send `category` for tasks that carry none. Reported and queued tasks keep their own.
    #[must_use]
    pub fn with_default_category(mut self, category: Option<String>) -> Self {
        self.default_category = category;
        self
    }

    /// Record probe, attempt and queue metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.prober = self.prober.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    /// Prober used for health checks.
    #[must_use]
    pub const fn prober(&self) -> &EndpointProber {
        &self.prober
    }

    /// Durable queue used for leftover tasks.
    #[must_use]
    pub const fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    /// Dispatch `tasks`, queueing the remainder with the default reason.
    pub async fn dispatch(
        &self,
        tasks: Vec<Task>,
        endpoints: &[EndpointDescriptor],
    ) -> DispatchReport {
        self.dispatch_with_reason(tasks, endpoints, DEFAULT_QUEUE_REASON)
            .await
    }

    /// Dispatch `tasks`, queueing the remainder with `reason`.
    ///
    /// Queue write failures do not abort the run; they are reported as
    /// [`QueuePersistence::Failed`] alongside the queued tasks.
    pub async fn dispatch_with_reason(
        &self,
        tasks: Vec<Task>,
        endpoints: &[EndpointDescriptor],
        reason: &str,
    ) -> DispatchReport {
        let outcome = self.run_batch(tasks, endpoints).await;

        let queue = if outcome.queued.is_empty() {
            QueuePersistence::NotNeeded
        } else {
            info!(
                stage = DispatchStage::PersistQueue.as_str(),
                tasks = outcome.queued.len(),
                "persisting queue"
            );
            match self.queue.persist(&outcome.queued, reason) {
                Ok(()) => {
                    self.record_queue_depth(outcome.queued.len());
                    QueuePersistence::Persisted {
                        path: self.queue.path().to_path_buf(),
                    }
                }
                Err(err) => {
                    warn!(
                        path = %self.queue.path().display(),
                        error = ?err,
                        "failed to persist queue"
                    );
                    QueuePersistence::Failed {
                        detail: format!("{err}: {}", error_source(&err)),
                    }
                }
            }
        };

        self.finish(outcome, queue)
    }

    /// Re-dispatch queued tasks. The queue is removed when everything is
    /// submitted and rewritten with the remainder otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error when the queue cannot be locked, read or rewritten.
    pub async fn drain(&self, endpoints: &[EndpointDescriptor]) -> DispatchResult<DrainReport> {
        if !self.queue.path().exists() {
            info!(path = %self.queue.path().display(), "no queue file; nothing to drain");
            return Ok(DrainReport::NothingQueued);
        }
        let lock = self.queue.lock()?;
        let Some(record) = self.queue.load()? else {
            info!(path = %self.queue.path().display(), "queue empty; nothing to drain");
            return Ok(DrainReport::NothingQueued);
        };
        let tasks = record.pending_tasks();
        if tasks.is_empty() {
            self.queue.remove_locked(&lock)?;
            self.record_queue_depth(0);
            return Ok(DrainReport::NothingQueued);
        }

        info!(tasks = tasks.len(), reason = %record.reason, "draining queue");
        let outcome = self.run_batch(tasks, endpoints).await;

        let queue = if outcome.queued.is_empty() {
            self.queue.remove_locked(&lock)?;
            QueuePersistence::Cleared {
                path: self.queue.path().to_path_buf(),
            }
        } else {
            self.queue
                .write_locked(&lock, &outcome.queued, &record.reason)?;
            QueuePersistence::Persisted {
                path: self.queue.path().to_path_buf(),
            }
        };
        drop(lock);
        self.record_queue_depth(outcome.queued.len());

        Ok(DrainReport::Drained {
            report: self.finish(outcome, queue),
        })
    }

    async fn run_batch(&self, tasks: Vec<Task>, endpoints: &[EndpointDescriptor]) -> BatchOutcome {
        info!(
            stage = DispatchStage::ProbeAll.as_str(),
            endpoints = endpoints.len(),
            tasks = tasks.len(),
            "dispatch started"
        );
        let health = self.prober.probe_all(endpoints).await;
        let clients = self.healthy_clients(endpoints, &health);
        if clients.is_empty() && !tasks.is_empty() {
            warn!("no healthy endpoints; queueing every task");
        }

        info!(
            stage = DispatchStage::DispatchEachTask.as_str(),
            healthy = clients.len(),
            "dispatching tasks"
        );
        let mut submitted = Vec::new();
        let mut queued = Vec::new();
        for task in tasks {
            let outgoing = self.with_defaults(&task);
            match self.submit_with_failover(&clients, &outgoing).await {
                Some(endpoint) => submitted.push(Submission { task, endpoint }),
                None => queued.push(task),
            }
        }

        BatchOutcome {
            health,
            submitted,
            queued,
        }
    }

    fn healthy_clients(
        &self,
        endpoints: &[EndpointDescriptor],
        health: &[HealthReport],
    ) -> Vec<QbittorrentClient> {
        let mut healthy: Vec<&EndpointDescriptor> = endpoints
            .iter()
            .zip(health)
            .filter(|(_, report)| report.status.is_healthy())
            .map(|(endpoint, _)| endpoint)
            .collect();
        // Stable: caller order survives within each role.
        healthy.sort_by_key(|endpoint| endpoint.role == EndpointRole::Secondary);

        healthy
            .into_iter()
            .filter_map(|endpoint| match self.prober.connect(endpoint) {
                Ok(client) => Some(client),
                Err(err) => {
                    warn!(
                        endpoint = %endpoint.name,
                        error = %err,
                        "healthy endpoint could not be bound"
                    );
                    None
                }
            })
            .collect()
    }

    /// Task as sent to an endpoint. The caller's task is what gets reported and queued.
    fn with_defaults<'a>(&self, task: &'a Task) -> Cow<'a, Task> {
        match (&task.category, &self.default_category) {
            (None, Some(category)) => Cow::Owned(task.clone().with_category(category.clone())),
            _ => Cow::Borrowed(task),
        }
    }

    async fn submit_with_failover(
        &self,
        clients: &[QbittorrentClient],
        task: &Task,
    ) -> Option<String> {
        for client in clients {
            match submit_once(client, task).await {
                Ok(()) => {
                    self.record_attempt(client.name(), "submitted");
                    info!(endpoint = %client.name(), locator = %task.locator, "task submitted");
                    return Some(client.name().to_string());
                }
                Err(err) => {
                    self.record_attempt(client.name(), err.outcome());
                    warn!(
                        endpoint = %client.name(),
                        locator = %task.locator,
                        error = %err,
                        "submission failed; trying next endpoint"
                    );
                }
            }
        }
        None
    }

    fn finish(&self, outcome: BatchOutcome, queue: QueuePersistence) -> DispatchReport {
        info!(
            stage = DispatchStage::Done.as_str(),
            submitted = outcome.submitted.len(),
            queued = outcome.queued.len(),
            "dispatch finished"
        );
        DispatchReport {
            health: outcome.health,
            submitted: outcome.submitted,
            queued: outcome.queued,
            queue,
        }
    }

    fn record_attempt(&self, endpoint: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_dispatch_attempt(endpoint, outcome);
        }
    }

    fn record_queue_depth(&self, depth: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_queued_tasks(depth);
        }
    }
}

async fn submit_once(client: &QbittorrentClient, task: &Task) -> Result<(), EndpointError> {
    let session = client.login().await?;
    let result = client.submit(&session, task).await;
    if let Err(err) = client.logout(session).await {
        tracing::debug!(endpoint = %client.name(), error = %err, "logout failed");
    }
    result
}

fn error_source(err: &DispatchError) -> String {
    std::error::Error::source(err).map_or_else(String::new, ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use httpmock::prelude::*;

    use crate::qbittorrent::EndpointTimeouts;
    use crate::vpn::{TcpProbe, VpnMonitor};

    type TestResult<T> = anyhow::Result<T>;

    fn dispatcher(queue: DurableQueue) -> FailoverDispatcher {
        let prober = EndpointProber::new(
            Client::new(),
            VpnMonitor::new(Box::new(TcpProbe::new(1)), Duration::from_millis(200)),
            EndpointTimeouts {
                probe: Duration::from_millis(500),
                submit: Duration::from_millis(500),
            },
        );
        FailoverDispatcher::new(prober, queue)
    }

    fn endpoint(name: &str, role: EndpointRole, base_url: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            name: name.into(),
            base_url: Some(base_url.into()),
            username: Some("admin".into()),
            password: Some("secret".into()),
            role,
            vpn_gateway: None,
        }
    }

    fn session_mocks(server: &MockServer) {
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(200)
                .header("set-cookie", "SID=ok; path=/")
                .body("Ok.");
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/app/version");
            then.status(200).body("v4.6.2");
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/logout");
            then.status(200);
        });
    }

    fn healthy_server(server: &MockServer, add_body: &'static str) {
        session_mocks(server);
        server.mock(move |when, then| {
            when.method(POST).path("/api/v2/torrents/add");
            then.status(200).body(add_body);
        });
    }

    #[tokio::test]
    async fn secondary_listed_first_is_tried_after_primary() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let primary = MockServer::start_async().await;
        let secondary = MockServer::start_async().await;
        healthy_server(&primary, "Ok.");
        healthy_server(&secondary, "Ok.");

        let endpoints = vec![
            endpoint("backup", EndpointRole::Secondary, &secondary.base_url()),
            endpoint("main", EndpointRole::Primary, &primary.base_url()),
        ];
        let report = dispatcher(DurableQueue::new(dir.path().join("queue.json")))
            .dispatch(vec![Task::new("magnet:?xt=urn:btih:1")], &endpoints)
            .await;

        assert_eq!(report.submitted.len(), 1);
        assert_eq!(report.submitted[0].endpoint, "main");
        assert_eq!(report.queue, QueuePersistence::NotNeeded);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_submission_falls_over_to_next_endpoint() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let primary = MockServer::start_async().await;
        let secondary = MockServer::start_async().await;
        healthy_server(&primary, "Fails.");
        healthy_server(&secondary, "Ok.");

        let endpoints = vec![
            endpoint("main", EndpointRole::Primary, &primary.base_url()),
            endpoint("backup", EndpointRole::Secondary, &secondary.base_url()),
        ];
        let report = dispatcher(DurableQueue::new(dir.path().join("queue.json")))
            .dispatch(
                vec![
                    Task::new("magnet:?xt=urn:btih:1"),
                    Task::new("magnet:?xt=urn:btih:2"),
                ],
                &endpoints,
            )
            .await;

        assert_eq!(report.total(), 2);
        assert!(report.submitted.iter().all(|sub| sub.endpoint == "backup"));
        assert!(report.is_complete());
        Ok(())
    }

    #[tokio::test]
    async fn default_category_is_sent_but_not_written_back() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let server = MockServer::start_async().await;
        session_mocks(&server);
        let defaulted = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/add")
                .body_includes("category=audiobooks");
            then.status(200).body("Ok.");
        });
        let explicit = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/add")
                .body_includes("category=podcasts");
            then.status(200).body("Ok.");
        });
        let endpoints = vec![endpoint("main", EndpointRole::Primary, &server.base_url())];

        let report = dispatcher(DurableQueue::new(dir.path().join("queue.json")))
            .with_default_category(Some("audiobooks".into()))
            .dispatch(
                vec![
                    Task::new("magnet:?a"),
                    Task::new("magnet:?b").with_category("podcasts"),
                ],
                &endpoints,
            )
            .await;

        defaulted.assert_hits(1);
        explicit.assert_hits(1);
        let categories: Vec<_> = report
            .submitted
            .iter()
            .map(|sub| sub.task.category.as_deref())
            .collect();
        assert_eq!(categories, vec![None, Some("podcasts")]);
        Ok(())
    }

    #[tokio::test]
    async fn default_category_leaves_queued_tasks_unchanged() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let queue = DurableQueue::new(dir.path().join("queue.json"));
        let input = vec![
            Task::new("magnet:?a"),
            Task::new("magnet:?b").with_tags(["retry"]),
        ];

        let report = dispatcher(queue.clone())
            .with_default_category(Some("audiobooks".into()))
            .dispatch(input.clone(), &[])
            .await;

        assert_eq!(report.queued, input);
        let record = queue
            .load()?
            .ok_or_else(|| anyhow::anyhow!("queue file missing"))?;
        assert_eq!(record.pending_tasks(), input);
        Ok(())
    }

    #[tokio::test]
    async fn unwritable_queue_is_reported_not_raised() -> TestResult<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file")?;
        let queue = DurableQueue::new(blocker.join("queue.json"));

        let report = dispatcher(queue)
            .dispatch(vec![Task::new("magnet:?a")], &[])
            .await;

        assert_eq!(report.queued.len(), 1);
        assert!(matches!(report.queue, QueuePersistence::Failed { .. }));
        Ok(())
    }

    #[test]
    fn stage_labels_are_stable() {
        assert_eq!(DispatchStage::ProbeAll.as_str(), "probe_all");
        assert_eq!(DispatchStage::PersistQueue.as_str(), "persist_queue");
    }
}
