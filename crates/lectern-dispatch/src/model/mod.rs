//! Dispatch domain types shared by the prober, dispatcher and queue.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use lectern_config::EndpointRole;
use serde::{Deserialize, Serialize, Serializer};

/// A unit of download work: one content locator plus submission hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Magnet URI (or any locator the endpoint accepts in `urls`).
    pub locator: String,
    /// Destination directory hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Category label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Tag labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Task {
    /// Build a task with no submission hints.
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            save_path: None,
            category: None,
            tags: Vec::new(),
        }
    }

    /// Attach a destination directory hint.
    #[must_use]
    pub fn with_save_path(mut self, save_path: impl Into<String>) -> Self {
        self.save_path = Some(save_path.into());
        self
    }

    /// Attach a category label.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Attach tag labels.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Outcome of probing one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Login and version query succeeded.
    Ok,
    /// Login was refused or its acknowledgement was malformed.
    AuthFailed,
    /// Authenticated version query returned a non-success status.
    Http(u16),
    /// A call exceeded its deadline.
    Timeout,
    /// The endpoint's VPN gateway did not answer.
    VpnDown,
    /// The endpoint lacks an address or credentials.
    NotConfigured,
    /// Any other failure.
    UnknownError,
}

impl HealthStatus {
    /// Operator-facing label (`OK`, `HTTP_503`, ...).
    #[must_use]
    pub fn label(&self) -> Cow<'static, str> {
        match self {
            Self::Ok => Cow::Borrowed("OK"),
            Self::AuthFailed => Cow::Borrowed("AUTH_FAILED"),
            Self::Http(code) => Cow::Owned(format!("HTTP_{code}")),
            Self::Timeout => Cow::Borrowed("TIMEOUT"),
            Self::VpnDown => Cow::Borrowed("VPN_DOWN"),
            Self::NotConfigured => Cow::Borrowed("NOT_CONFIGURED"),
            Self::UnknownError => Cow::Borrowed("UNKNOWN_ERROR"),
        }
    }

    /// Whether tasks may be submitted to the endpoint.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

/// Probe result for one endpoint at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Endpoint name.
    pub endpoint: String,
    /// Endpoint role.
    pub role: EndpointRole,
    /// Probe outcome.
    pub status: HealthStatus,
    /// When the probe finished.
    pub checked_at: DateTime<Utc>,
}

/// A task accepted by an endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    /// The submitted task.
    pub task: Task,
    /// Name of the endpoint that accepted it.
    pub endpoint: String,
}

/// What happened to the durable queue at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueuePersistence {
    /// Nothing was queued, the file was not touched.
    NotNeeded,
    /// Queued tasks were written.
    Persisted {
        /// Queue file path.
        path: PathBuf,
    },
    /// Every queued task was dispatched and the file was removed.
    Cleared {
        /// Queue file path.
        path: PathBuf,
    },
    /// Writing the queue failed; the queued tasks exist only in this report.
    Failed {
        /// Failure description.
        detail: String,
    },
}

/// Result of one dispatch or drain run.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    /// One health report per endpoint, in caller order.
    pub health: Vec<HealthReport>,
    /// Tasks accepted by an endpoint.
    pub submitted: Vec<Submission>,
    /// Tasks no endpoint accepted.
    pub queued: Vec<Task>,
    /// Queue file outcome.
    pub queue: QueuePersistence,
}

impl DispatchReport {
    /// Whether every task was submitted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.queued.is_empty()
    }

    /// Total tasks accounted for by the run.
    #[must_use]
    pub fn total(&self) -> usize {
        self.submitted.len() + self.queued.len()
    }
}

/// Result of draining the durable queue.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DrainReport {
    /// No queue file (or an empty one) was present.
    NothingQueued,
    /// Queued tasks were re-dispatched.
    Drained {
        /// Dispatch outcome for the drained tasks.
        report: DispatchReport,
    },
}
