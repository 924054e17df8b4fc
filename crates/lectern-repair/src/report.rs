//! Structured and narrative renderings of repair outcomes.
//!
//! # Design
//! - Rendering is pure; only [`write_report`] and [`read_report`] touch the filesystem.
//! - JSON output is wrapped in a `{ kind, generated_at, report }` envelope so
//!   written reports can be read back and summarized.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RepairError, RepairResult};
use crate::model::{
    AudioProperties, BatchResult, ExecutionResult, QualityComparison, ReplacementDecision,
};

/// Which renderings [`write_report`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// `<base>.json` only.
    #[default]
    Json,
    /// `<base>.md` only.
    Markdown,
    /// Both files.
    Both,
}

impl ReportFormat {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Both => "both",
        }
    }

    const fn writes_json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }

    const fn writes_markdown(self) -> bool {
        matches!(self, Self::Markdown | Self::Both)
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = RepairError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "both" => Ok(Self::Both),
            _ => Err(RepairError::InvalidInput {
                field: "report_format",
                reason: "must be json, markdown or both",
                value: Some(value.to_string()),
            }),
        }
    }
}

/// Discriminator stored in the JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// A single [`ReplacementDecision`].
    Decision,
    /// A single [`ExecutionResult`].
    Execution,
    /// A [`BatchResult`].
    Batch,
    /// A [`SummaryReport`].
    Summary,
}

/// Any outcome the reporter can render.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairReport {
    /// Evaluation of one replacement.
    Decision(ReplacementDecision),
    /// Execution of one replacement.
    Execution(ExecutionResult),
    /// Evaluation of several candidates.
    Batch(BatchResult),
    /// Aggregate of earlier outcomes.
    Summary(SummaryReport),
}

impl RepairReport {
    /// Envelope discriminator for this report.
    #[must_use]
    pub const fn kind(&self) -> ReportKind {
        match self {
            Self::Decision(_) => ReportKind::Decision,
            Self::Execution(_) => ReportKind::Execution,
            Self::Batch(_) => ReportKind::Batch,
            Self::Summary(_) => ReportKind::Summary,
        }
    }

    fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Decision(decision) => serde_json::to_value(decision),
            Self::Execution(result) => serde_json::to_value(result),
            Self::Batch(batch) => serde_json::to_value(batch),
            Self::Summary(summary) => serde_json::to_value(summary),
        }
    }
}

/// Serialized form of a report on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEnvelope {
    /// Kind of the wrapped report.
    pub kind: ReportKind,
    /// When the rendering was produced.
    pub generated_at: DateTime<Utc>,
    /// The report body.
    pub report: serde_json::Value,
}

impl ReportEnvelope {
    /// Decode the wrapped body according to `kind`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the body does not match its kind.
    pub fn into_report(self) -> serde_json::Result<RepairReport> {
        Ok(match self.kind {
            ReportKind::Decision => RepairReport::Decision(serde_json::from_value(self.report)?),
            ReportKind::Execution => RepairReport::Execution(serde_json::from_value(self.report)?),
            ReportKind::Batch => RepairReport::Batch(serde_json::from_value(self.report)?),
            ReportKind::Summary => RepairReport::Summary(serde_json::from_value(self.report)?),
        })
    }
}

/// Aggregate counts over earlier outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Outcomes aggregated.
    pub total_reports: usize,
    /// Executions that installed their replacement.
    pub successful_executions: usize,
    /// Executions that failed at any stage.
    pub failed_repairs: usize,
    /// Evaluations that approved a replacement, batches included.
    pub approved_evaluations: usize,
    /// Evaluations that rejected a replacement, batches included.
    pub rejected_evaluations: usize,
    /// Number of distinct titles seen.
    pub distinct_titles: usize,
    /// Distinct titles, sorted.
    pub titles: Vec<String>,
    /// Successful executions over all executions; `0.0` without executions.
    pub execution_success_rate: f64,
    /// Approved evaluations over all evaluations; `0.0` without evaluations.
    pub approval_rate: f64,
}

impl SummaryReport {
    /// Aggregate `outcomes`. Nested summaries are not re-counted.
    #[must_use]
    pub fn from_outcomes(outcomes: &[RepairReport]) -> Self {
        let mut successful_executions = 0;
        let mut failed_repairs = 0;
        let mut approved_evaluations = 0;
        let mut rejected_evaluations = 0;
        let mut titles = BTreeSet::new();

        let mut count_decision = |decision: &ReplacementDecision| {
            if decision.is_approved() {
                approved_evaluations += 1;
            } else {
                rejected_evaluations += 1;
            }
        };

        for outcome in outcomes {
            match outcome {
                RepairReport::Decision(decision) => {
                    count_decision(decision);
                    titles.insert(decision.title.clone());
                }
                RepairReport::Batch(batch) => {
                    batch.evaluated.iter().for_each(&mut count_decision);
                    titles.insert(batch.title.clone());
                }
                RepairReport::Execution(result) => {
                    if result.success {
                        successful_executions += 1;
                    } else {
                        failed_repairs += 1;
                    }
                    titles.insert(result.title.clone());
                }
                RepairReport::Summary(_) => {}
            }
        }

        let titles: Vec<String> = titles.into_iter().filter(|title| !title.is_empty()).collect();
        Self {
            total_reports: outcomes.len(),
            successful_executions,
            failed_repairs,
            approved_evaluations,
            rejected_evaluations,
            distinct_titles: titles.len(),
            titles,
            execution_success_rate: rate(
                successful_executions,
                successful_executions + failed_repairs,
            ),
            approval_rate: rate(
                approved_evaluations,
                approved_evaluations + rejected_evaluations,
            ),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Render the JSON envelope for `report`.
///
/// # Errors
///
/// Returns the serialization error, which only occurs for non-finite floats.
pub fn render_json(report: &RepairReport) -> serde_json::Result<String> {
    let envelope = ReportEnvelope {
        kind: report.kind(),
        generated_at: Utc::now(),
        report: report.body()?,
    };
    serde_json::to_string_pretty(&envelope)
}

/// Render a Markdown narrative for `report`.
#[must_use]
pub fn render_markdown(report: &RepairReport) -> String {
    let mut lines = Vec::new();
    match report {
        RepairReport::Decision(decision) => decision_markdown(&mut lines, decision, "#"),
        RepairReport::Execution(result) => execution_markdown(&mut lines, result),
        RepairReport::Batch(batch) => batch_markdown(&mut lines, batch),
        RepairReport::Summary(summary) => summary_markdown(&mut lines, summary),
    }
    lines.push(String::new());
    lines.join("\n")
}

fn decision_markdown(lines: &mut Vec<String>, decision: &ReplacementDecision, heading: &str) {
    lines.push(format!("{heading} Replacement evaluation: {}", decision.title));
    lines.push(String::new());
    if let Some(author) = &decision.author {
        lines.push(format!("- Author: {author}"));
    }
    lines.push(format!("- Decision: **{}**", decision.decision));
    lines.push(format!("- Reason: {}", decision.reason));
    lines.push(format!("- Original: `{}`", decision.original.display()));
    lines.push(format!("- Replacement: `{}`", decision.replacement.display()));
    lines.push(String::new());
    comparison_markdown(lines, &decision.comparison);
}

fn comparison_markdown(lines: &mut Vec<String>, comparison: &QualityComparison) {
    let original = comparison.original.as_ref();
    let replacement = comparison.replacement.as_ref();
    lines.push("| Property | Original | Replacement | Verdict |".to_string());
    lines.push("|---|---|---|---|".to_string());
    lines.push(format!(
        "| Codec | {} | {} | {} |",
        cell(original, |props| props.codec.clone()),
        cell(replacement, |props| props.codec.clone()),
        verdict(comparison.codec_match)
    ));
    lines.push(format!(
        "| Bitrate | {} | {} | {} |",
        cell(original, bitrate_cell),
        cell(replacement, bitrate_cell),
        verdict(comparison.bitrate_acceptable)
    ));
    lines.push(format!(
        "| Duration | {} | {} | {} |",
        cell(original, |props| format!("{:.1} s", props.duration_secs)),
        cell(replacement, |props| format!("{:.1} s", props.duration_secs)),
        verdict(comparison.duration_match)
    ));
    lines.push(format!(
        "| Sample rate | {} | {} | |",
        cell(original, |props| optional(props.sample_rate_hz, " Hz")),
        cell(replacement, |props| optional(props.sample_rate_hz, " Hz"))
    ));
    lines.push(format!(
        "| Channels | {} | {} | |",
        cell(original, |props| optional(props.channels, "")),
        cell(replacement, |props| optional(props.channels, ""))
    ));
    lines.push(format!(
        "| Size | {} | {} | |",
        cell(original, |props| format!("{} bytes", props.size_bytes)),
        cell(replacement, |props| format!("{} bytes", props.size_bytes))
    ));
    if !comparison.issues.is_empty() {
        lines.push(String::new());
        lines.push("Issues:".to_string());
        lines.push(String::new());
        lines.extend(comparison.issues.iter().map(|issue| format!("- {issue}")));
    }
}

fn execution_markdown(lines: &mut Vec<String>, result: &ExecutionResult) {
    lines.push(format!("# Replacement execution: {}", result.title));
    lines.push(String::new());
    let outcome = if result.success { "succeeded" } else { "failed" };
    lines.push(format!("- Outcome: **{outcome}**"));
    lines.push(format!("- Stage: {}", result.stage));
    if let Some(error) = &result.error {
        lines.push(format!("- Error: {error}"));
    }
    lines.push(format!("- Rollback: {}", result.rollback.as_str()));
    lines.push(format!("- Original: `{}`", result.original.display()));
    lines.push(format!("- Replacement: `{}`", result.replacement.display()));
    if let Some(backup) = &result.backup {
        lines.push(format!("- Backup: `{}`", backup.backup_path.display()));
        lines.push(format!("- Backup SHA-256: `{}`", backup.sha256));
    }
    lines.push(format!("- Executed at: {}", result.executed_at.to_rfc3339()));
}

fn batch_markdown(lines: &mut Vec<String>, batch: &BatchResult) {
    lines.push(format!("# Batch evaluation: {}", batch.title));
    lines.push(String::new());
    lines.push(format!("- Original: `{}`", batch.original.display()));
    lines.push(format!(
        "- Evaluated: {} ({} approved, {} skipped by cap)",
        batch.evaluated.len(),
        batch.approved.len(),
        batch.skipped
    ));
    match &batch.recommended {
        Some(path) => lines.push(format!("- Recommended: `{}`", path.display())),
        None => lines.push("- Recommended: none".to_string()),
    }
    for decision in &batch.evaluated {
        lines.push(String::new());
        decision_markdown(lines, decision, "##");
    }
}

fn summary_markdown(lines: &mut Vec<String>, summary: &SummaryReport) {
    lines.push("# Repair summary".to_string());
    lines.push(String::new());
    lines.push("| Metric | Value |".to_string());
    lines.push("|---|---|".to_string());
    lines.push(format!("| Reports | {} |", summary.total_reports));
    lines.push(format!("| Successful executions | {} |", summary.successful_executions));
    lines.push(format!("| Failed repairs | {} |", summary.failed_repairs));
    lines.push(format!("| Approved evaluations | {} |", summary.approved_evaluations));
    lines.push(format!("| Rejected evaluations | {} |", summary.rejected_evaluations));
    lines.push(format!("| Distinct titles | {} |", summary.distinct_titles));
    lines.push(format!(
        "| Execution success rate | {:.1}% |",
        summary.execution_success_rate * 100.0
    ));
    lines.push(format!("| Approval rate | {:.1}% |", summary.approval_rate * 100.0));
    if !summary.titles.is_empty() {
        lines.push(String::new());
        lines.extend(summary.titles.iter().map(|title| format!("- {title}")));
    }
}

fn cell(props: Option<&AudioProperties>, render: impl Fn(&AudioProperties) -> String) -> String {
    props.map_or_else(|| "n/a".to_string(), render)
}

fn bitrate_cell(props: &AudioProperties) -> String {
    props
        .bitrate_kbps()
        .map_or_else(|| "unknown".to_string(), |kbps| format!("{kbps} kbps"))
}

fn optional<T: fmt::Display>(value: Option<T>, unit: &str) -> String {
    value.map_or_else(|| "unknown".to_string(), |value| format!("{value}{unit}"))
}

const fn verdict(ok: bool) -> &'static str {
    if ok { "ok" } else { "fail" }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut raw = base.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Write `report` to `<base>.json` and/or `<base>.md`, creating parent directories.
///
/// # Errors
///
/// Returns an error when rendering or writing fails.
pub fn write_report(
    report: &RepairReport,
    base: &Path,
    format: ReportFormat,
) -> RepairResult<Vec<PathBuf>> {
    if let Some(parent) = base.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| RepairError::io("report.create_dir", parent, source))?;
    }

    let mut written = Vec::new();
    if format.writes_json() {
        let path = with_suffix(base, ".json");
        let body = render_json(report)
            .map_err(|source| RepairError::json("report.encode", &path, source))?;
        fs::write(&path, body).map_err(|source| RepairError::io("report.write", &path, source))?;
        written.push(path);
    }
    if format.writes_markdown() {
        let path = with_suffix(base, ".md");
        fs::write(&path, render_markdown(report))
            .map_err(|source| RepairError::io("report.write", &path, source))?;
        written.push(path);
    }
    info!(kind = ?report.kind(), files = written.len(), "report written");
    Ok(written)
}

/// Read a JSON report written by [`write_report`].
///
/// # Errors
///
/// Returns an error when the file is unreadable or not a report envelope.
pub fn read_report(path: &Path) -> RepairResult<RepairReport> {
    let raw = fs::read_to_string(path)
        .map_err(|source| RepairError::io("report.read", path, source))?;
    let envelope: ReportEnvelope = serde_json::from_str(&raw)
        .map_err(|source| RepairError::json("report.decode", path, source))?;
    envelope
        .into_report()
        .map_err(|source| RepairError::json("report.decode_body", path, source))
}
