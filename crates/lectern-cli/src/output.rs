//! Output renderers and formatting helpers for CLI commands.

use std::path::Path;

use anyhow::anyhow;
use lectern_dispatch::{DispatchReport, DrainReport, HealthReport, QueuePersistence, QueueRecord};
use lectern_repair::{RepairReport, render_json, render_markdown};
use serde::Serialize;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::context::{CliError, CliResult};

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_health(reports: &[HealthReport], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(reports),
        OutputFormat::Table => {
            print!("{}", health_table(reports));
            Ok(())
        }
    }
}

pub(crate) fn health_table(reports: &[HealthReport]) -> String {
    let mut out = format!("{:<20} {:<10} {:<16} CHECKED\n", "ENDPOINT", "ROLE", "STATUS");
    for report in reports {
        out.push_str(&format!(
            "{:<20} {:<10} {:<16} {}\n",
            report.endpoint,
            report.role.as_str(),
            report.status.label(),
            report.checked_at.format("%Y-%m-%dT%H:%M:%SZ")
        ));
    }
    out
}

pub(crate) fn render_dispatch(report: &DispatchReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            print!("{}", dispatch_summary(report));
            Ok(())
        }
    }
}

pub(crate) fn dispatch_summary(report: &DispatchReport) -> String {
    let mut out = health_table(&report.health);
    out.push_str(&format!(
        "submitted: {}  queued: {}\n",
        report.submitted.len(),
        report.queued.len()
    ));
    for submission in &report.submitted {
        out.push_str(&format!(
            "  sent   {} -> {}\n",
            submission.task.locator, submission.endpoint
        ));
    }
    for task in &report.queued {
        out.push_str(&format!("  queued {}\n", task.locator));
    }
    out.push_str(&format!("queue: {}\n", persistence_label(&report.queue)));
    out
}

fn persistence_label(queue: &QueuePersistence) -> String {
    match queue {
        QueuePersistence::NotNeeded => "untouched".to_string(),
        QueuePersistence::Persisted { path } => format!("written to {}", path.display()),
        QueuePersistence::Cleared { path } => format!("cleared ({})", path.display()),
        QueuePersistence::Failed { detail } => format!("NOT written: {detail}"),
    }
}

pub(crate) fn render_queue(
    path: &Path,
    record: Option<&QueueRecord>,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&json!({ "path": path, "record": record })),
        OutputFormat::Table => {
            print!("{}", queue_table(path, record));
            Ok(())
        }
    }
}

pub(crate) fn queue_table(path: &Path, record: Option<&QueueRecord>) -> String {
    let Some(record) = record else {
        return format!("queue empty ({})\n", path.display());
    };
    let tasks = record.pending_tasks();
    let mut out = format!(
        "queue: {} ({} task{})\nsaved: {}\nreason: {}\n",
        path.display(),
        tasks.len(),
        if tasks.len() == 1 { "" } else { "s" },
        record.saved_at.to_rfc3339(),
        record.reason
    );
    for task in &tasks {
        out.push_str(&format!("  {}", task.locator));
        if let Some(save_path) = &task.save_path {
            out.push_str(&format!("  save_path={save_path}"));
        }
        if let Some(category) = &task.category {
            out.push_str(&format!("  category={category}"));
        }
        if !task.tags.is_empty() {
            out.push_str(&format!("  tags={}", task.tags.join(",")));
        }
        out.push('\n');
    }
    if !record.instructions.is_empty() {
        out.push_str(&format!("{}\n", record.instructions));
    }
    out
}

pub(crate) fn render_drain(report: &DrainReport, format: OutputFormat) -> CliResult<()> {
    match (format, report) {
        (OutputFormat::Json, _) => print_json(report),
        (OutputFormat::Table, DrainReport::NothingQueued) => {
            println!("queue empty; nothing to drain");
            Ok(())
        }
        (OutputFormat::Table, DrainReport::Drained { report }) => {
            print!("{}", dispatch_summary(report));
            Ok(())
        }
    }
}

pub(crate) fn render_repair(report: &RepairReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let text = render_json(report)
                .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
            println!("{text}");
        }
        OutputFormat::Table => print!("{}", render_markdown(report)),
    }
    Ok(())
}
