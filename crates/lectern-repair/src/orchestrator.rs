//! Replacement evaluation and backup-swap-verify execution.
//!
//! # Design
//! - Evaluation is read-only; only [`RepairOrchestrator::execute_replacement`] touches files.
//! - Execution stages run in order: validate, safety, backup, swap, verify.
//! - Once the backup is verified, at least one of original, replacement copy or backup exists.
//! - A failed swap or verification restores the original from the backup.
//! - The backup is never deleted.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lectern_config::RepairSettings;
use lectern_telemetry::Metrics;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::compare::QualityComparator;
use crate::error::{RepairError, RepairResult};
use crate::model::{
    BackupRecord, BatchResult, Decision, ExecutionResult, ExecutionStage, ReplacementDecision,
    RollbackStatus,
};
use crate::probe::FfprobeInspector;
use crate::safety::{PolicySafetyGate, SafetyGate, SafetyVerdict};

/// Reason recorded for approved replacements.
pub const QUALITY_ACCEPTABLE: &str = "quality acceptable";

/// File primitives used by the swap, replaceable in tests.
pub(crate) trait SwapIo: Send + Sync {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

struct StdSwapIo;

impl SwapIo for StdSwapIo {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

struct StageFailure {
    stage: ExecutionStage,
    detail: String,
}

impl StageFailure {
    fn new(stage: ExecutionStage, err: &RepairError) -> Self {
        Self {
            stage,
            detail: err.detail(),
        }
    }
}

/// Evaluates and installs replacement audio files.
pub struct RepairOrchestrator {
    comparator: QualityComparator,
    gate: Arc<dyn SafetyGate>,
    max_candidates: usize,
    backup_dir_name: String,
    metrics: Option<Metrics>,
    io: Arc<dyn SwapIo>,
}

impl std::fmt::Debug for RepairOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairOrchestrator")
            .field("max_candidates", &self.max_candidates)
            .field("backup_dir_name", &self.backup_dir_name)
            .finish_non_exhaustive()
    }
}

impl RepairOrchestrator {
    /// Build an orchestrator from explicit collaborators.
    #[must_use]
    pub fn new(
        comparator: QualityComparator,
        gate: Arc<dyn SafetyGate>,
        settings: &RepairSettings,
    ) -> Self {
        Self {
            comparator,
            gate,
            max_candidates: settings.max_candidates.max(1),
            backup_dir_name: settings.backup_dir_name.clone(),
            metrics: None,
            io: Arc::new(StdSwapIo),
        }
    }

    /// Build an orchestrator backed by `ffprobe` and the policy gate.
    #[must_use]
    pub fn from_settings(settings: &RepairSettings) -> Self {
        Self::new(
            QualityComparator::new(Arc::new(FfprobeInspector::from_settings(settings))),
            Arc::new(PolicySafetyGate::from_settings(settings)),
            settings,
        )
    }

    /// Record decisions and executions in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_swap_io(mut self, io: Arc<dyn SwapIo>) -> Self {
        self.io = io;
        self
    }

    /// Comparator used for evaluations.
    #[must_use]
    pub const fn comparator(&self) -> &QualityComparator {
        &self.comparator
    }

    /// Decide whether `replacement` may replace `original`. Never mutates files.
    #[must_use]
    pub fn evaluate_replacement(
        &self,
        original: &Path,
        replacement: &Path,
        title: &str,
        author: Option<&str>,
    ) -> ReplacementDecision {
        let comparison = self.comparator.compare(original, replacement);
        let (decision, reason) = if comparison.is_better_or_equal {
            (Decision::Approved, QUALITY_ACCEPTABLE.to_string())
        } else {
            (Decision::Rejected, comparison.issues.join("; "))
        };
        info!(
            title = %title,
            replacement = %replacement.display(),
            decision = %decision,
            reason = %reason,
            "replacement evaluated"
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_repair_decision(decision.metric_label());
        }
        ReplacementDecision {
            decision,
            reason,
            comparison,
            original: original.to_path_buf(),
            replacement: replacement.to_path_buf(),
            title: title.to_string(),
            author: author.map(str::to_string),
            evaluated_at: Utc::now(),
        }
    }

    /// Evaluate up to the configured number of candidates and recommend the
    /// approved one with the highest bitrate. Earlier candidates win ties;
    /// unknown bitrates rank last.
    #[must_use]
    pub fn batch_evaluate_replacements(
        &self,
        original: &Path,
        candidates: &[PathBuf],
        title: &str,
        author: Option<&str>,
    ) -> BatchResult {
        let considered = candidates.len().min(self.max_candidates);
        let skipped = candidates.len() - considered;
        if skipped > 0 {
            info!(
                title = %title,
                skipped,
                cap = self.max_candidates,
                "candidates beyond cap skipped"
            );
        }

        let evaluated: Vec<ReplacementDecision> = candidates[..considered]
            .iter()
            .map(|candidate| self.evaluate_replacement(original, candidate, title, author))
            .collect();

        let mut recommended: Option<&ReplacementDecision> = None;
        for decision in evaluated.iter().filter(|decision| decision.is_approved()) {
            let outranks = recommended.is_none_or(|best| {
                match (replacement_bitrate(decision), replacement_bitrate(best)) {
                    (Some(candidate), Some(current)) => candidate > current,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            });
            if outranks {
                recommended = Some(decision);
            }
        }
        let recommended = recommended.map(|decision| decision.replacement.clone());
        let approved = evaluated
            .iter()
            .filter(|decision| decision.is_approved())
            .map(|decision| decision.replacement.clone())
            .collect::<Vec<_>>();

        info!(
            title = %title,
            evaluated = evaluated.len(),
            approved = approved.len(),
            recommended = ?recommended,
            "batch evaluated"
        );
        BatchResult {
            original: original.to_path_buf(),
            title: title.to_string(),
            evaluated,
            approved,
            recommended,
            skipped,
        }
    }

    /// Install `replacement` over `original` with backup-swap-verify.
    ///
    /// Must not run concurrently for the same original.
    #[must_use]
    pub fn execute_replacement(
        &self,
        original: &Path,
        replacement: &Path,
        title: &str,
    ) -> ExecutionResult {
        let mut backup = None;
        let outcome = self.run_stages(original, replacement, title, &mut backup);

        let result = match outcome {
            Ok(()) => ExecutionResult {
                success: true,
                original: original.to_path_buf(),
                replacement: replacement.to_path_buf(),
                title: title.to_string(),
                stage: ExecutionStage::Done,
                error: None,
                rollback: RollbackStatus::NotAttempted,
                backup,
                executed_at: Utc::now(),
            },
            Err(failure) => {
                error!(
                    title = %title,
                    original = %original.display(),
                    stage = failure.stage.as_str(),
                    error = %failure.detail,
                    "replacement failed"
                );
                let rollback = match (&backup, failure.stage) {
                    (Some(record), ExecutionStage::Swap | ExecutionStage::Verify) => {
                        self.rollback(original, record)
                    }
                    _ => RollbackStatus::NotAttempted,
                };
                ExecutionResult {
                    success: false,
                    original: original.to_path_buf(),
                    replacement: replacement.to_path_buf(),
                    title: title.to_string(),
                    stage: failure.stage,
                    error: Some(failure.detail),
                    rollback,
                    backup,
                    executed_at: Utc::now(),
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.inc_repair_execution(if result.success { "succeeded" } else { "failed" });
        }
        result
    }

    fn run_stages(
        &self,
        original: &Path,
        replacement: &Path,
        title: &str,
        backup: &mut Option<BackupRecord>,
    ) -> Result<(), StageFailure> {
        let expected = validate_paths(original, replacement)
            .map_err(|err| StageFailure::new(ExecutionStage::Validate, &err))?;
        stage_completed(ExecutionStage::Validate, title);

        if let SafetyVerdict::Deny { reason } = self.gate.check(original, replacement, title) {
            return Err(StageFailure {
                stage: ExecutionStage::Safety,
                detail: format!("safety check denied: {reason}"),
            });
        }
        stage_completed(ExecutionStage::Safety, title);

        let record = self
            .backup(original)
            .map_err(|err| StageFailure::new(ExecutionStage::Backup, &err))?;
        info!(
            title = %title,
            backup = %record.backup_path.display(),
            sha256 = %record.sha256,
            "backup verified"
        );
        *backup = Some(record);

        self.swap(original, replacement)
            .map_err(|err| StageFailure::new(ExecutionStage::Swap, &err))?;
        stage_completed(ExecutionStage::Swap, title);

        let (actual, _) = sha256_file(original)
            .map_err(|err| StageFailure::new(ExecutionStage::Verify, &err))?;
        if actual != expected {
            let err = RepairError::Integrity {
                operation: "verify.replacement",
                path: original.to_path_buf(),
                expected,
                actual,
            };
            return Err(StageFailure::new(ExecutionStage::Verify, &err));
        }
        stage_completed(ExecutionStage::Verify, title);
        Ok(())
    }

    fn backup(&self, original: &Path) -> RepairResult<BackupRecord> {
        let file_name = original.file_name().ok_or_else(|| RepairError::InvalidInput {
            field: "original",
            reason: "has no file name",
            value: Some(original.display().to_string()),
        })?;
        let dir = parent_dir(original).join(&self.backup_dir_name);
        fs::create_dir_all(&dir)
            .map_err(|source| RepairError::io("backup.create_dir", &dir, source))?;

        let created_at = Utc::now();
        let backup_path = unique_backup_path(&dir, &file_name.to_string_lossy(), created_at);
        self.io
            .copy(original, &backup_path)
            .map_err(|source| RepairError::io("backup.copy", &backup_path, source))?;

        let (expected, _) = sha256_file(original)?;
        let (actual, size_bytes) = sha256_file(&backup_path)?;
        if actual != expected {
            return Err(RepairError::Integrity {
                operation: "backup.verify",
                path: backup_path,
                expected,
                actual,
            });
        }

        Ok(BackupRecord {
            backup_path,
            source_path: original.to_path_buf(),
            sha256: actual,
            size_bytes,
            created_at,
        })
    }

    fn swap(&self, original: &Path, replacement: &Path) -> RepairResult<()> {
        self.io
            .remove(original)
            .map_err(|source| RepairError::io("swap.remove_original", original, source))?;
        self.io
            .copy(replacement, original)
            .map_err(|source| RepairError::io("swap.copy_replacement", original, source))?;
        Ok(())
    }

    fn rollback(&self, original: &Path, backup: &BackupRecord) -> RollbackStatus {
        if let Err(err) = self.io.copy(&backup.backup_path, original) {
            error!(
                original = %original.display(),
                backup = %backup.backup_path.display(),
                error = %err,
                "rollback copy failed; backup left in place"
            );
            return RollbackStatus::Failed;
        }
        match sha256_file(original) {
            Ok((digest, _)) if digest == backup.sha256 => {
                warn!(original = %original.display(), "original restored from backup");
                RollbackStatus::Restored
            }
            Ok(_) => {
                error!(original = %original.display(), "restored file does not match backup");
                RollbackStatus::Failed
            }
            Err(err) => {
                error!(
                    original = %original.display(),
                    error = %err.detail(),
                    "restored file unreadable"
                );
                RollbackStatus::Failed
            }
        }
    }
}

fn stage_completed(stage: ExecutionStage, title: &str) {
    info!(title = %title, stage = stage.as_str(), "replacement stage completed");
}

fn replacement_bitrate(decision: &ReplacementDecision) -> Option<u64> {
    decision
        .comparison
        .replacement
        .as_ref()
        .and_then(|props| props.bitrate_bps)
}

// Returns the replacement digest so the swap can be verified against it.
fn validate_paths(original: &Path, replacement: &Path) -> RepairResult<String> {
    for (field, path) in [("original", original), ("replacement", replacement)] {
        if !path.is_file() {
            return Err(RepairError::InvalidInput {
                field,
                reason: "file not found",
                value: Some(path.display().to_string()),
            });
        }
    }
    let same = match (original.canonicalize(), replacement.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => original == replacement,
    };
    if same {
        return Err(RepairError::InvalidInput {
            field: "replacement",
            reason: "is the original file",
            value: Some(replacement.display().to_string()),
        });
    }
    let (digest, _) = sha256_file(replacement)?;
    Ok(digest)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn unique_backup_path(dir: &Path, file_name: &str, at: DateTime<Utc>) -> PathBuf {
    let stamp = at.format("%Y%m%dT%H%M%S%.3fZ");
    let mut candidate = dir.join(format!("{file_name}.{stamp}.bak"));
    let mut counter = 1_u32;
    while candidate.exists() {
        candidate = dir.join(format!("{file_name}.{stamp}-{counter}.bak"));
        counter += 1;
    }
    candidate
}

/// SHA-256 of a file as lowercase hex, with the number of bytes hashed.
pub(crate) fn sha256_file(path: &Path) -> RepairResult<(String, u64)> {
    let file = File::open(path).map_err(|source| RepairError::io("digest.open", path, source))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut BufReader::new(file), &mut hasher)
        .map_err(|source| RepairError::io("digest.read", path, source))?;
    Ok((format!("{:x}", hasher.finalize()), size))
}
