//! Argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lectern_repair::ReportFormat;
use lectern_telemetry::{LogFormat, LoggingConfig, init_logging};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::commands::dispatch::handle_dispatch;
use crate::commands::health::handle_health;
use crate::commands::queue::{handle_queue_drain, handle_queue_show};
use crate::commands::repair::{
    handle_repair_batch, handle_repair_evaluate, handle_repair_execute, handle_repair_summarize,
};
use crate::context::{AppContext, CliResult, Completion, load_config};

const BUILD_SHA: &str = match option_env!("LECTERN_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Parses CLI arguments, executes the requested command, and writes the
/// metrics textfile when asked. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let command_name = command_label(&cli.command);
    let trace_id = Uuid::new_v4();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };
    if let Err(err) = init_logging(&LoggingConfig {
        level: &config.logging.level,
        format: LogFormat::from_name(config.logging.format.as_deref()),
        build_sha: BUILD_SHA,
    }) {
        eprintln!("warning: logging unavailable: {err}");
    }

    let ctx = match AppContext::new(config, cli.output) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };

    let span = info_span!("command", name = command_name, trace_id = %trace_id);
    let result = dispatch(cli.command, &ctx).instrument(span).await;

    if let Some(path) = &cli.metrics_file {
        ctx.export_metrics(path);
    }

    match result {
        Ok(completion) => {
            let exit_code = completion.exit_code();
            info!(command = command_name, exit_code, "command finished");
            exit_code
        }
        Err(err) => {
            let exit_code = err.exit_code();
            eprintln!("error: {}", err.display_message());
            exit_code
        }
    }
}

async fn dispatch(command: Command, ctx: &AppContext) -> CliResult<Completion> {
    match command {
        Command::Health(_) => handle_health(ctx).await,
        Command::Dispatch(args) => handle_dispatch(ctx, args).await,
        Command::Queue(queue) => match queue {
            QueueCommand::Show(_) => handle_queue_show(ctx),
            QueueCommand::Drain(_) => handle_queue_drain(ctx).await,
        },
        Command::Repair(repair) => match repair {
            RepairCommand::Evaluate(args) => handle_repair_evaluate(ctx, args),
            RepairCommand::Execute(args) => handle_repair_execute(ctx, args),
            RepairCommand::Batch(args) => handle_repair_batch(ctx, args),
            RepairCommand::Summarize(args) => handle_repair_summarize(ctx, args),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "lectern",
    version,
    about = "Dispatch downloads across failover endpoints and repair audio libraries"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "LECTERN_CONFIG",
        help = "Configuration file (defaults to lectern.json)"
    )]
    pub(crate) config: Option<PathBuf>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[arg(
        long,
        global = true,
        env = "LECTERN_METRICS_FILE",
        help = "Write Prometheus metrics to this node-exporter textfile on exit"
    )]
    pub(crate) metrics_file: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Probe every configured endpoint.
    Health(HealthArgs),
    /// Submit tasks with failover, queueing what no endpoint accepts.
    Dispatch(DispatchArgs),
    /// Inspect or drain the durable queue.
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Evaluate and install replacement audio files.
    #[command(subcommand)]
    Repair(RepairCommand),
}

#[derive(Default, Args)]
pub(crate) struct HealthArgs {}

#[derive(Args)]
pub(crate) struct DispatchArgs {
    #[arg(required = true, help = "Magnet URIs to submit")]
    pub(crate) locators: Vec<String>,
    #[arg(long, help = "Destination directory hint for the endpoint")]
    pub(crate) save_path: Option<String>,
    #[arg(long, help = "Category label (defaults to dispatch.category)")]
    pub(crate) category: Option<String>,
    #[arg(long = "tag", value_delimiter = ',', help = "Tag labels")]
    pub(crate) tags: Vec<String>,
    #[arg(long, help = "Reason recorded if tasks end up queued")]
    pub(crate) reason: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum QueueCommand {
    /// Print the queued tasks.
    Show(QueueShowArgs),
    /// Re-dispatch queued tasks.
    Drain(QueueDrainArgs),
}

#[derive(Default, Args)]
pub(crate) struct QueueShowArgs {}

#[derive(Default, Args)]
pub(crate) struct QueueDrainArgs {}

#[derive(Subcommand)]
pub(crate) enum RepairCommand {
    /// Compare one replacement against the original.
    Evaluate(EvaluateArgs),
    /// Back up the original and swap in the replacement.
    Execute(ExecuteArgs),
    /// Evaluate several candidates and recommend one.
    Batch(BatchArgs),
    /// Aggregate previously written JSON reports.
    Summarize(SummarizeArgs),
}

#[derive(Args)]
pub(crate) struct EvaluateArgs {
    #[arg(long)]
    pub(crate) original: PathBuf,
    #[arg(long)]
    pub(crate) replacement: PathBuf,
    #[arg(long)]
    pub(crate) title: String,
    #[arg(long)]
    pub(crate) author: Option<String>,
    #[command(flatten)]
    pub(crate) report: ReportArgs,
}

#[derive(Args)]
pub(crate) struct ExecuteArgs {
    #[arg(long)]
    pub(crate) original: PathBuf,
    #[arg(long)]
    pub(crate) replacement: PathBuf,
    #[arg(long)]
    pub(crate) title: String,
    #[command(flatten)]
    pub(crate) report: ReportArgs,
}

#[derive(Args)]
pub(crate) struct BatchArgs {
    #[arg(long)]
    pub(crate) original: PathBuf,
    #[arg(required = true, help = "Candidate replacement files, in preference order")]
    pub(crate) candidates: Vec<PathBuf>,
    #[arg(long)]
    pub(crate) title: String,
    #[arg(long)]
    pub(crate) author: Option<String>,
    #[command(flatten)]
    pub(crate) report: ReportArgs,
}

#[derive(Args)]
pub(crate) struct SummarizeArgs {
    #[arg(required = true, help = "JSON reports written by earlier repair commands")]
    pub(crate) reports: Vec<PathBuf>,
    #[command(flatten)]
    pub(crate) report: ReportArgs,
}

#[derive(Args, Default)]
pub(crate) struct ReportArgs {
    #[arg(long = "report", help = "Write the outcome to <BASE>.json and/or <BASE>.md")]
    pub(crate) base: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ReportFormatArg::Json)]
    pub(crate) report_format: ReportFormatArg,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub(crate) enum ReportFormatArg {
    #[default]
    Json,
    Markdown,
    Both,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(value: ReportFormatArg) -> Self {
        match value {
            ReportFormatArg::Json => Self::Json,
            ReportFormatArg::Markdown => Self::Markdown,
            ReportFormatArg::Both => Self::Both,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Health(_) => "health",
        Command::Dispatch(_) => "dispatch",
        Command::Queue(QueueCommand::Show(_)) => "queue_show",
        Command::Queue(QueueCommand::Drain(_)) => "queue_drain",
        Command::Repair(RepairCommand::Evaluate(_)) => "repair_evaluate",
        Command::Repair(RepairCommand::Execute(_)) => "repair_execute",
        Command::Repair(RepairCommand::Batch(_)) => "repair_batch",
        Command::Repair(RepairCommand::Summarize(_)) => "repair_summarize",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};

    #[test]
    fn dispatch_accepts_repeated_and_delimited_tags() -> Result<()> {
        let cli = Cli::try_parse_from([
            "lectern",
            "--output",
            "json",
            "dispatch",
            "magnet:?xt=urn:btih:a",
            "magnet:?xt=urn:btih:b",
            "--tag",
            "audiobook,retry",
            "--tag",
            "late",
            "--category",
            "books",
        ])?;
        assert_eq!(cli.output, OutputFormat::Json);
        let Command::Dispatch(args) = cli.command else {
            return Err(anyhow!("expected dispatch command"));
        };
        assert_eq!(args.locators.len(), 2);
        assert_eq!(args.tags, vec!["audiobook", "retry", "late"]);
        assert_eq!(args.category.as_deref(), Some("books"));
        Ok(())
    }

    #[test]
    fn dispatch_requires_a_locator() {
        assert!(Cli::try_parse_from(["lectern", "dispatch"]).is_err());
    }

    #[test]
    fn repair_batch_parses_candidates_and_report() -> Result<()> {
        let cli = Cli::try_parse_from([
            "lectern",
            "repair",
            "batch",
            "--original",
            "/lib/book.m4b",
            "--title",
            "Book",
            "/in/a.m4b",
            "/in/b.m4b",
            "--report",
            "/tmp/report",
            "--report-format",
            "both",
        ])?;
        let Command::Repair(RepairCommand::Batch(args)) = cli.command else {
            return Err(anyhow!("expected repair batch command"));
        };
        assert_eq!(args.candidates.len(), 2);
        assert_eq!(args.report.base, Some(PathBuf::from("/tmp/report")));
        assert_eq!(
            ReportFormat::from(args.report.report_format),
            ReportFormat::Both
        );
        Ok(())
    }

    #[test]
    fn command_label_matches_variants() -> Result<()> {
        let cases = [
            (vec!["lectern", "health"], "health"),
            (vec!["lectern", "queue", "show"], "queue_show"),
            (vec!["lectern", "queue", "drain"], "queue_drain"),
            (vec!["lectern", "repair", "summarize", "a.json"], "repair_summarize"),
        ];
        for (argv, label) in cases {
            let cli = Cli::try_parse_from(argv)?;
            assert_eq!(command_label(&cli.command), label);
        }
        Ok(())
    }
}
