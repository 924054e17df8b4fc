//! Durable single-file task queue.
//!
//! # Design
//! - One JSON record per queue; every write replaces it (last write wins).
//! - The file exists iff at least one task is pending.
//! - Writes go through a sibling temp file and a rename.
//! - Mutations hold an exclusive advisory lock on `<queue>.lock`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{DispatchError, DispatchResult};
use crate::model::Task;

/// Reason recorded when a dispatch run leaves tasks behind.
pub const DEFAULT_QUEUE_REASON: &str = "all endpoints unavailable";

const INSTRUCTIONS: &str = "Run `lectern queue drain` once an endpoint is reachable, \
or add the listed magnets to a torrent client by hand.";

/// On-disk queue record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    /// When the record was written.
    pub saved_at: DateTime<Utc>,
    /// Why the tasks were queued.
    #[serde(default)]
    pub reason: String,
    /// Locators in queue order, kept for operators and older tooling.
    #[serde(default)]
    pub magnets: Vec<String>,
    /// Full tasks in queue order.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Free-form operator guidance.
    #[serde(default)]
    pub instructions: String,
}

impl QueueRecord {
    fn new(tasks: &[Task], reason: &str) -> Self {
        Self {
            saved_at: Utc::now(),
            reason: reason.to_string(),
            magnets: tasks.iter().map(|task| task.locator.clone()).collect(),
            tasks: tasks.to_vec(),
            instructions: INSTRUCTIONS.to_string(),
        }
    }

    /// Tasks awaiting dispatch. Records without `tasks` fall back to `magnets`.
    #[must_use]
    pub fn pending_tasks(&self) -> Vec<Task> {
        if self.tasks.is_empty() {
            self.magnets
                .iter()
                .map(|locator| locator.trim())
                .filter(|locator| !locator.is_empty())
                .map(Task::new)
                .collect()
        } else {
            self.tasks.clone()
        }
    }
}

/// Handle to the queue file.
#[derive(Debug, Clone)]
pub struct DurableQueue {
    path: PathBuf,
}

/// Exclusive hold on the queue; released on drop.
pub struct QueueLock {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl std::fmt::Debug for QueueLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueLock").finish_non_exhaustive()
    }
}

impl DurableQueue {
    /// Bind to a queue file path. Nothing is touched until the first mutation.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Queue file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut raw = self.path.as_os_str().to_owned();
        raw.push(".lock");
        PathBuf::from(raw)
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Acquire the exclusive queue lock, blocking until it is free.
    ///
    /// # Errors
    ///
    /// Returns an error when the lock file cannot be opened or locked.
    pub fn lock(&self) -> DispatchResult<QueueLock> {
        let parent = self.parent_dir();
        fs::create_dir_all(&parent)
            .map_err(|source| DispatchError::io("queue.create_dir", &parent, source))?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| DispatchError::io("queue.open_lock", &lock_path, source))?;

        #[cfg(unix)]
        {
            let lock = nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive)
                .map_err(|(_, source)| DispatchError::Lock {
                    path: lock_path.clone(),
                    source,
                })?;
            debug!(path = %lock_path.display(), "queue lock acquired");
            Ok(QueueLock { _lock: lock })
        }
        #[cfg(not(unix))]
        {
            Ok(QueueLock { _file: file })
        }
    }

    /// Read the current record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or decoded.
    pub fn load(&self) -> DispatchResult<Option<QueueRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(DispatchError::io("queue.read", &self.path, source)),
        };
        let record = serde_json::from_str(&raw)
            .map_err(|source| DispatchError::json("queue.decode", &self.path, source))?;
        Ok(Some(record))
    }

    /// Overwrite the queue with `tasks`; an empty list removes the file.
    ///
    /// # Errors
    ///
    /// Returns an error when the lock cannot be taken or the file cannot be written.
    pub fn persist(&self, tasks: &[Task], reason: &str) -> DispatchResult<()> {
        let lock = self.lock()?;
        self.write_locked(&lock, tasks, reason)
    }

    /// Remove the queue file if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the lock cannot be taken or the file cannot be removed.
    pub fn clear(&self) -> DispatchResult<()> {
        let lock = self.lock()?;
        self.remove_locked(&lock)
    }

    pub(crate) fn write_locked(
        &self,
        lock: &QueueLock,
        tasks: &[Task],
        reason: &str,
    ) -> DispatchResult<()> {
        if tasks.is_empty() {
            return self.remove_locked(lock);
        }

        let record = QueueRecord::new(tasks, reason);
        let payload = serde_json::to_vec_pretty(&record)
            .map_err(|source| DispatchError::json("queue.encode", &self.path, source))?;

        let parent = self.parent_dir();
        let mut staging = NamedTempFile::new_in(&parent)
            .map_err(|source| DispatchError::io("queue.create_temp", &parent, source))?;
        staging
            .write_all(&payload)
            .and_then(|()| staging.as_file().sync_all())
            .map_err(|source| DispatchError::io("queue.write", staging.path(), source))?;
        staging
            .persist(&self.path)
            .map_err(|err| DispatchError::io("queue.rename", &self.path, err.error))?;

        info!(
            path = %self.path.display(),
            tasks = tasks.len(),
            reason = %reason,
            "queue persisted"
        );
        Ok(())
    }

    pub(crate) fn remove_locked(&self, _lock: &QueueLock) -> DispatchResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "queue cleared");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DispatchError::io("queue.remove", &self.path, source)),
        }
    }
}
