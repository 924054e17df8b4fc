use lectern_repair::{
    RepairError, RepairOrchestrator, RepairReport, SummaryReport, read_report, write_report,
};
use tracing::info;

use crate::cli::{BatchArgs, EvaluateArgs, ExecuteArgs, OutputFormat, ReportArgs, SummarizeArgs};
use crate::context::{AppContext, CliError, CliResult, Completion, require_path};
use crate::output::render_repair;

fn orchestrator(ctx: &AppContext) -> RepairOrchestrator {
    RepairOrchestrator::from_settings(&ctx.config.repair).with_metrics(ctx.metrics.clone())
}

fn require_title(title: &str) -> CliResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CliError::validation("--title must not be blank"));
    }
    Ok(title.to_string())
}

fn repair_failure(context: &'static str) -> impl FnOnce(RepairError) -> CliError {
    move |err| {
        let detail = err.detail();
        CliError::failure(anyhow::Error::new(err).context(format!("{context}: {detail}")))
    }
}

fn emit(ctx: &AppContext, report: &RepairReport, args: &ReportArgs) -> CliResult<()> {
    render_repair(report, ctx.output)?;
    let Some(base) = &args.base else {
        return Ok(());
    };
    let written = write_report(report, base, args.report_format.into())
        .map_err(repair_failure("failed to write report"))?;
    for path in &written {
        info!(path = %path.display(), "report written");
        if ctx.output == OutputFormat::Table {
            println!("report: {}", path.display());
        }
    }
    Ok(())
}

pub(crate) fn handle_repair_evaluate(
    ctx: &AppContext,
    args: EvaluateArgs,
) -> CliResult<Completion> {
    let original = require_path("--original", &args.original)?;
    let replacement = require_path("--replacement", &args.replacement)?;
    let title = require_title(&args.title)?;

    let decision = orchestrator(ctx).evaluate_replacement(
        &original,
        &replacement,
        &title,
        args.author.as_deref(),
    );
    emit(ctx, &RepairReport::Decision(decision), &args.report)?;
    Ok(Completion::Done)
}

pub(crate) fn handle_repair_execute(ctx: &AppContext, args: ExecuteArgs) -> CliResult<Completion> {
    let original = require_path("--original", &args.original)?;
    let replacement = require_path("--replacement", &args.replacement)?;
    let title = require_title(&args.title)?;

    let result = orchestrator(ctx).execute_replacement(&original, &replacement, &title);
    let success = result.success;
    emit(ctx, &RepairReport::Execution(result), &args.report)?;
    Ok(Completion::from_flag(success))
}

pub(crate) fn handle_repair_batch(ctx: &AppContext, args: BatchArgs) -> CliResult<Completion> {
    let original = require_path("--original", &args.original)?;
    let title = require_title(&args.title)?;
    let candidates = args
        .candidates
        .iter()
        .map(|candidate| require_path("candidate", candidate))
        .collect::<CliResult<Vec<_>>>()?;

    let batch = orchestrator(ctx).batch_evaluate_replacements(
        &original,
        &candidates,
        &title,
        args.author.as_deref(),
    );
    emit(ctx, &RepairReport::Batch(batch), &args.report)?;
    Ok(Completion::Done)
}

pub(crate) fn handle_repair_summarize(
    ctx: &AppContext,
    args: SummarizeArgs,
) -> CliResult<Completion> {
    if args.reports.is_empty() {
        return Err(CliError::validation("at least one report is required"));
    }
    let outcomes = args
        .reports
        .iter()
        .map(|path| {
            read_report(path).map_err(|err| {
                CliError::validation(format!(
                    "{} is not a readable report: {}",
                    path.display(),
                    err.detail()
                ))
            })
        })
        .collect::<CliResult<Vec<_>>>()?;

    let summary = SummaryReport::from_outcomes(&outcomes);
    emit(ctx, &RepairReport::Summary(summary), &args.report)?;
    Ok(Completion::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ReportFormatArg;
    use lectern_config::LecternConfig;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn ctx(config: LecternConfig) -> anyhow::Result<AppContext> {
        AppContext::new(config, OutputFormat::Json)
            .map_err(|err| anyhow::anyhow!(err.display_message()))
    }

    fn report_args(base: Option<PathBuf>) -> ReportArgs {
        ReportArgs {
            base,
            report_format: ReportFormatArg::Json,
        }
    }

    fn library(dir: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
        let original = dir.join("book.mp3");
        let replacement = dir.join("incoming.mp3");
        fs::write(&original, b"original")?;
        fs::write(&replacement, b"replacement")?;
        Ok((original, replacement))
    }

    #[test]
    fn blank_title_is_validation_error() -> anyhow::Result<()> {
        let ctx = ctx(LecternConfig::default())?;
        let result = handle_repair_execute(
            &ctx,
            ExecuteArgs {
                original: PathBuf::from("a.mp3"),
                replacement: PathBuf::from("b.mp3"),
                title: "  ".into(),
                report: report_args(None),
            },
        );
        assert!(matches!(result, Err(CliError::Validation(_))));
        Ok(())
    }

    #[test]
    fn disabled_replacements_leave_work_and_write_report() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (original, replacement) = library(dir.path())?;
        let mut config = LecternConfig::default();
        config.repair.allow_replacements = false;
        let ctx = ctx(config)?;
        let base = dir.path().join("reports").join("execute");

        let completion = handle_repair_execute(
            &ctx,
            ExecuteArgs {
                original: original.clone(),
                replacement,
                title: "Book".into(),
                report: report_args(Some(base.clone())),
            },
        )
        .map_err(|err| anyhow::anyhow!(err.display_message()))?;

        assert_eq!(completion, Completion::WorkLeft);
        assert_eq!(fs::read(&original)?, b"original");
        assert_eq!(ctx.metrics.snapshot().repair_executions_failed_total, 1);

        let summary_completion = handle_repair_summarize(
            &ctx,
            SummarizeArgs {
                reports: vec![dir.path().join("reports").join("execute.json")],
                report: report_args(None),
            },
        )
        .map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert_eq!(summary_completion, Completion::Done);
        Ok(())
    }

    #[test]
    fn executing_with_defaults_swaps_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (original, replacement) = library(dir.path())?;
        let ctx = ctx(LecternConfig::default())?;
        let completion = handle_repair_execute(
            &ctx,
            ExecuteArgs {
                original: original.clone(),
                replacement,
                title: "Book".into(),
                report: report_args(None),
            },
        )
        .map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert_eq!(completion, Completion::Done);
        assert_eq!(fs::read(&original)?, b"replacement");
        assert!(dir.path().join(".lectern-backups").is_dir());
        Ok(())
    }

    #[test]
    fn summarize_rejects_non_report_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("notes.json");
        fs::write(&path, "{\"hello\": 1}")?;
        let result = handle_repair_summarize(
            &ctx(LecternConfig::default())?,
            SummarizeArgs {
                reports: vec![path],
                report: report_args(None),
            },
        );
        assert!(matches!(result, Err(CliError::Validation(_))));
        Ok(())
    }
}
