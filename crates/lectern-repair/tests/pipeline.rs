use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lectern_config::RepairSettings;
use lectern_repair::{
    AudioProperties, Decision, ExecutionStage, ExtractionError, MediaInspector, PolicySafetyGate,
    QualityComparator, RepairOrchestrator, RepairReport, ReportFormat, RollbackStatus,
    SummaryReport, read_report, write_report,
};
use lectern_telemetry::Metrics;

type TestResult<T> = anyhow::Result<T>;

struct CannedInspector(HashMap<PathBuf, AudioProperties>);

impl MediaInspector for CannedInspector {
    fn inspect(&self, path: &Path) -> Result<AudioProperties, ExtractionError> {
        self.0
            .get(path)
            .cloned()
            .ok_or_else(|| ExtractionError::NotFound {
                path: path.to_path_buf(),
            })
    }
}

fn aac(bitrate_bps: u64) -> AudioProperties {
    AudioProperties {
        codec: "aac".into(),
        bitrate_bps: Some(bitrate_bps),
        sample_rate_hz: Some(44_100),
        channels: Some(2),
        duration_secs: 36_000.0,
        size_bytes: 500_000_000,
    }
}

fn orchestrator(canned: HashMap<PathBuf, AudioProperties>) -> RepairOrchestrator {
    RepairOrchestrator::new(
        QualityComparator::new(Arc::new(CannedInspector(canned))),
        Arc::new(PolicySafetyGate::new(true, Vec::new())),
        &RepairSettings::default(),
    )
}

fn dir_entries(path: &Path) -> TestResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(path)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();
    Ok(entries)
}

#[test]
fn matching_codec_and_duration_at_95_percent_bitrate_is_approved() {
    let original = PathBuf::from("/library/Dune/Dune.m4b");
    let replacement = PathBuf::from("/incoming/Dune.m4b");
    let mut canned = HashMap::new();
    canned.insert(original.clone(), aac(128_000));
    canned.insert(replacement.clone(), aac(121_600));

    let decision = orchestrator(canned).evaluate_replacement(
        &original,
        &replacement,
        "Dune",
        Some("Frank Herbert"),
    );
    assert_eq!(decision.decision, Decision::Approved);
    assert_eq!(decision.reason, "quality acceptable");
    assert!(decision.comparison.issues.is_empty());
}

#[test]
fn execution_with_missing_replacement_has_no_side_effects() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let original = dir.path().join("book.mp3");
    fs::write(&original, b"original")?;
    let before = dir_entries(dir.path())?;

    let result = orchestrator(HashMap::new()).execute_replacement(
        &original,
        &dir.path().join("missing.mp3"),
        "Book",
    );

    assert!(!result.success);
    assert_eq!(result.stage, ExecutionStage::Validate);
    assert_eq!(result.rollback, RollbackStatus::NotAttempted);
    assert!(result.backup.is_none());
    assert_eq!(dir_entries(dir.path())?, before);
    assert_eq!(fs::read(&original)?, b"original");
    Ok(())
}

#[test]
fn successful_execution_leaves_byte_identical_backup() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let original = dir.path().join("book.mp3");
    let replacement = dir.path().join("incoming").join("book.mp3");
    fs::create_dir_all(dir.path().join("incoming"))?;
    fs::write(&original, b"low bitrate original payload")?;
    fs::write(&replacement, b"high bitrate replacement payload")?;

    let metrics = Metrics::new()?;
    let result = orchestrator(HashMap::new())
        .with_metrics(metrics.clone())
        .execute_replacement(&original, &replacement, "Book");

    assert!(result.success, "execution failed: {:?}", result.error);
    assert_eq!(result.stage, ExecutionStage::Done);
    assert_eq!(fs::read(&original)?, b"high bitrate replacement payload");

    let backup = result
        .backup
        .ok_or_else(|| anyhow::anyhow!("backup record missing"))?;
    assert_eq!(fs::read(&backup.backup_path)?, b"low bitrate original payload");
    assert_eq!(
        backup.backup_path.parent(),
        Some(dir.path().join(".lectern-backups").as_path())
    );
    let name = backup
        .backup_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    assert!(name.starts_with("book.mp3."));
    assert!(name.ends_with(".bak"));
    assert_eq!(backup.size_bytes, 28);
    assert_eq!(backup.sha256.len(), 64);
    assert_eq!(metrics.snapshot().repair_executions_succeeded_total, 1);
    Ok(())
}

#[test]
fn batch_without_approvals_recommends_nothing() {
    let original = PathBuf::from("/library/book.mp3");
    let candidates = vec![
        PathBuf::from("/incoming/low.mp3"),
        PathBuf::from("/incoming/short.mp3"),
    ];
    let mut short = aac(128_000);
    short.duration_secs = 30_000.0;
    let mut canned = HashMap::new();
    canned.insert(original.clone(), aac(128_000));
    canned.insert(candidates[0].clone(), aac(64_000));
    canned.insert(candidates[1].clone(), short);

    let batch =
        orchestrator(canned).batch_evaluate_replacements(&original, &candidates, "Book", None);
    assert_eq!(batch.evaluated.len(), 2);
    assert!(batch.approved.is_empty());
    assert!(batch.recommended.is_none());
    assert_eq!(batch.skipped, 0);
}

#[test]
fn written_reports_summarize_back() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let original = dir.path().join("book.mp3");
    let replacement = dir.path().join("new.mp3");
    fs::write(&original, b"a")?;
    fs::write(&replacement, b"b")?;

    let mut canned = HashMap::new();
    canned.insert(original.clone(), aac(128_000));
    canned.insert(replacement.clone(), aac(128_000));
    let orchestrator = orchestrator(canned);

    let decision = orchestrator.evaluate_replacement(&original, &replacement, "Book", None);
    let execution = orchestrator.execute_replacement(&original, &replacement, "Book");
    let reports = dir.path().join("reports");
    let mut written = write_report(
        &RepairReport::Decision(decision),
        &reports.join("evaluate"),
        ReportFormat::Both,
    )?;
    written.extend(write_report(
        &RepairReport::Execution(execution),
        &reports.join("execute"),
        ReportFormat::Json,
    )?);

    let outcomes = written
        .iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .map(|path| read_report(path))
        .collect::<Result<Vec<_>, _>>()?;
    let summary = SummaryReport::from_outcomes(&outcomes);
    assert_eq!(summary.total_reports, 2);
    assert_eq!(summary.approved_evaluations, 1);
    assert_eq!(summary.successful_executions, 1);
    assert_eq!(summary.distinct_titles, 1);
    assert!((summary.execution_success_rate - 1.0).abs() < f64::EPSILON);
    Ok(())
}
