use anyhow::anyhow;
use lectern_dispatch::{DEFAULT_QUEUE_REASON, QueuePersistence, Task};

use crate::cli::DispatchArgs;
use crate::commands::{build_dispatcher, require_endpoints};
use crate::context::{AppContext, CliError, CliResult, Completion};
use crate::output::render_dispatch;

pub(crate) async fn handle_dispatch(ctx: &AppContext, args: DispatchArgs) -> CliResult<Completion> {
    require_endpoints(ctx)?;
    let reason = args
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .unwrap_or(DEFAULT_QUEUE_REASON)
        .to_string();
    let tasks = build_tasks(&args)?;

    let dispatcher = build_dispatcher(ctx)?;
    let report = dispatcher
        .dispatch_with_reason(tasks, &ctx.config.endpoints, &reason)
        .await;
    render_dispatch(&report, ctx.output)?;

    if let QueuePersistence::Failed { detail } = &report.queue {
        return Err(CliError::failure(anyhow!(
            "{} task(s) could not be queued: {detail}",
            report.queued.len()
        )));
    }
    Ok(Completion::from_flag(report.is_complete()))
}

fn build_tasks(args: &DispatchArgs) -> CliResult<Vec<Task>> {
    let tags: Vec<String> = args
        .tags
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect();

    args.locators
        .iter()
        .map(|locator| {
            let locator = locator.trim();
            if locator.is_empty() {
                return Err(CliError::validation("locators must not be blank"));
            }
            let mut task = Task::new(locator).with_tags(tags.clone());
            if let Some(save_path) = args
                .save_path
                .as_deref()
                .filter(|path| !path.trim().is_empty())
            {
                task = task.with_save_path(save_path);
            }
            if let Some(category) = args
                .category
                .as_deref()
                .filter(|value| !value.trim().is_empty())
            {
                task = task.with_category(category);
            }
            Ok(task)
        })
        .collect()
}
