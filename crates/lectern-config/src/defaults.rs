//! Default values applied when a configuration document omits a field.
//!
//! # Design
//! - Centralize defaults so serde, docs and tests agree on the same numbers.
//! - Keep time-based defaults in whole seconds for readable config files.

/// Config file consulted when neither `--config` nor `LECTERN_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "lectern.json";
/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "LECTERN_CONFIG";

/// Upper bound for the login handshake and version query.
pub(crate) const PROBE_TIMEOUT_SECS: u64 = 5;
/// Upper bound for a single task submission.
pub(crate) const SUBMIT_TIMEOUT_SECS: u64 = 10;
/// Durable queue location relative to the working directory.
pub(crate) const QUEUE_PATH: &str = "lectern-queue.json";

/// Upper bound for a single VPN gateway probe.
pub(crate) const VPN_TIMEOUT_SECS: u64 = 2;
/// Port used by the TCP reachability probe.
pub(crate) const VPN_TCP_PORT: u16 = 443;

pub(crate) const FFPROBE_PATH: &str = "ffprobe";
pub(crate) const FFPROBE_TIMEOUT_SECS: u64 = 30;
/// Candidates evaluated per batch before the rest are skipped.
pub(crate) const MAX_CANDIDATES: usize = 5;
/// Sibling directory that receives pre-swap backups.
pub(crate) const BACKUP_DIR_NAME: &str = ".lectern-backups";

pub(crate) const LOG_LEVEL: &str = "info";
