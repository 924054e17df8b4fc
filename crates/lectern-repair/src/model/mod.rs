//! Domain models for the repair pipeline.
//!
//! # Design
//! - Plain owned values so outcomes can be reported, serialized and read back.
//! - Audio properties are recomputed for every comparison; nothing here caches them.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Technical properties of one audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProperties {
    /// Codec name as reported by the probe (`aac`, `mp3`, ...).
    pub codec: String,
    /// Bitrate in bits per second, when known.
    pub bitrate_bps: Option<u64>,
    /// Sample rate in hertz.
    pub sample_rate_hz: Option<u32>,
    /// Channel count.
    pub channels: Option<u32>,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// File size in bytes.
    pub size_bytes: u64,
}

impl AudioProperties {
    /// Bitrate in whole kilobits per second.
    #[must_use]
    pub fn bitrate_kbps(&self) -> Option<u64> {
        self.bitrate_bps.map(|bps| bps / 1000)
    }
}

/// Directional comparison of a replacement against an original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityComparison {
    /// Original properties; absent when extraction failed.
    pub original: Option<AudioProperties>,
    /// Replacement properties; absent when extraction failed.
    pub replacement: Option<AudioProperties>,
    /// Codec names are identical.
    pub codec_match: bool,
    /// Durations are within tolerance.
    pub duration_match: bool,
    /// Replacement bitrate is not materially lower.
    pub bitrate_acceptable: bool,
    /// One human-readable line per failing verdict.
    pub issues: Vec<String>,
    /// All verdicts hold.
    pub is_better_or_equal: bool,
}

/// Outcome of evaluating a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// The replacement may be installed.
    Approved,
    /// The replacement must not be installed.
    Rejected,
}

impl Decision {
    /// Uppercase label used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Lowercase label used for metrics.
    #[must_use]
    pub const fn metric_label(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluated replacement with its supporting comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementDecision {
    /// Approval verdict.
    pub decision: Decision,
    /// `quality acceptable` or the joined comparison issues.
    pub reason: String,
    /// Comparison that produced the verdict.
    pub comparison: QualityComparison,
    /// File that would be replaced.
    pub original: PathBuf,
    /// Candidate replacement file.
    pub replacement: PathBuf,
    /// Title of the work.
    pub title: String,
    /// Author of the work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// When the evaluation ran.
    pub evaluated_at: DateTime<Utc>,
}

impl ReplacementDecision {
    /// Whether the decision approves the replacement.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approved
    }
}

/// Verified copy of the original taken before a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Location of the backup copy.
    pub backup_path: PathBuf,
    /// File the backup was taken from.
    pub source_path: PathBuf,
    /// Lowercase hex SHA-256 of the backup contents.
    pub sha256: String,
    /// Backup size in bytes.
    pub size_bytes: u64,
    /// When the backup was written.
    pub created_at: DateTime<Utc>,
}

/// Stages of a replacement execution, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    /// Both paths are checked.
    Validate,
    /// The safety gate is consulted.
    Safety,
    /// The original is copied aside and verified.
    Backup,
    /// The replacement is copied over the original.
    Swap,
    /// The swapped-in file is verified against the replacement.
    Verify,
    /// All stages completed.
    Done,
}

impl ExecutionStage {
    /// Stable label used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Safety => "safety",
            Self::Backup => "backup",
            Self::Swap => "swap",
            Self::Verify => "verify",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a failed swap was undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// No rollback was needed.
    #[default]
    NotAttempted,
    /// The original was restored from the backup.
    Restored,
    /// Restoring from the backup failed; the backup is still on disk.
    Failed,
}

impl RollbackStatus {
    /// Stable label used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::Restored => "restored",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of one replacement execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the replacement is now installed.
    pub success: bool,
    /// File that was (or would have been) replaced.
    pub original: PathBuf,
    /// Replacement source file.
    pub replacement: PathBuf,
    /// Title of the work.
    pub title: String,
    /// Last stage reached; the failing stage when `success` is false.
    pub stage: ExecutionStage,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rollback outcome.
    #[serde(default)]
    pub rollback: RollbackStatus,
    /// Backup taken before the swap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
    /// When the execution finished.
    pub executed_at: DateTime<Utc>,
}

/// Outcome of evaluating several candidates for one original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// File the candidates would replace.
    pub original: PathBuf,
    /// Title of the work.
    pub title: String,
    /// Decisions in candidate order.
    pub evaluated: Vec<ReplacementDecision>,
    /// Approved candidate paths in candidate order.
    pub approved: Vec<PathBuf>,
    /// Highest-bitrate approved candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<PathBuf>,
    /// Candidates beyond the evaluation cap.
    #[serde(default)]
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_serializes_uppercase() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Decision::Approved)?, "\"APPROVED\"");
        assert_eq!(
            serde_json::from_str::<Decision>("\"REJECTED\"")?,
            Decision::Rejected
        );
        assert_eq!(Decision::Rejected.metric_label(), "rejected");
        Ok(())
    }

    #[test]
    fn rollback_status_labels_match_serde() -> anyhow::Result<()> {
        for status in [
            RollbackStatus::NotAttempted,
            RollbackStatus::Restored,
            RollbackStatus::Failed,
        ] {
            assert_eq!(
                serde_json::to_string(&status)?,
                format!("\"{}\"", status.as_str())
            );
        }
        Ok(())
    }

    #[test]
    fn bitrate_kbps_truncates() {
        let props = AudioProperties {
            codec: "mp3".into(),
            bitrate_bps: Some(128_999),
            sample_rate_hz: Some(44_100),
            channels: Some(2),
            duration_secs: 60.0,
            size_bytes: 1,
        };
        assert_eq!(props.bitrate_kbps(), Some(128));
    }
}
