use lectern_dispatch::{DrainReport, DurableQueue};

use crate::commands::{build_dispatcher, failure, require_endpoints};
use crate::context::{AppContext, CliResult, Completion};
use crate::output::{render_drain, render_queue};

pub(crate) fn handle_queue_show(ctx: &AppContext) -> CliResult<Completion> {
    let queue = DurableQueue::new(ctx.config.dispatch.queue_path.clone());
    let record = queue.load().map_err(failure("failed to read queue"))?;
    ctx.metrics
        .set_queued_tasks(record.as_ref().map_or(0, |record| record.pending_tasks().len()));
    render_queue(queue.path(), record.as_ref(), ctx.output)?;
    Ok(Completion::Done)
}

pub(crate) async fn handle_queue_drain(ctx: &AppContext) -> CliResult<Completion> {
    require_endpoints(ctx)?;
    let dispatcher = build_dispatcher(ctx)?;
    let report = dispatcher
        .drain(&ctx.config.endpoints)
        .await
        .map_err(failure("failed to drain queue"))?;
    render_drain(&report, ctx.output)?;
    Ok(match &report {
        DrainReport::NothingQueued => Completion::Done,
        DrainReport::Drained { report } => Completion::from_flag(report.is_complete()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::context::CliError;
    use httpmock::prelude::*;
    use lectern_config::{EndpointDescriptor, EndpointRole, LecternConfig};
    use lectern_dispatch::Task;

    fn ctx(
        queue_path: &std::path::Path,
        endpoint_url: Option<String>,
    ) -> anyhow::Result<AppContext> {
        let mut config = LecternConfig::default();
        config.dispatch.queue_path = queue_path.to_path_buf();
        if let Some(base_url) = endpoint_url {
            config.endpoints.push(EndpointDescriptor {
                name: "primary".into(),
                base_url: Some(base_url),
                username: Some("admin".into()),
                password: Some("secret".into()),
                role: EndpointRole::Primary,
                vpn_gateway: None,
            });
        }
        AppContext::new(config, OutputFormat::Json)
            .map_err(|err| anyhow::anyhow!(err.display_message()))
    }

    #[test]
    fn show_reports_depth_without_touching_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let queue_path = dir.path().join("queue.json");
        DurableQueue::new(&queue_path).persist(
            &[Task::new("magnet:?a"), Task::new("magnet:?b")],
            "all endpoints unavailable",
        )?;
        let before = std::fs::read(&queue_path)?;

        let ctx = ctx(&queue_path, None)?;
        let completion =
            handle_queue_show(&ctx).map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert_eq!(completion, Completion::Done);
        assert_eq!(ctx.metrics.snapshot().queued_tasks, 2);
        assert_eq!(std::fs::read(&queue_path)?, before);
        Ok(())
    }

    #[tokio::test]
    async fn drain_without_endpoints_is_validation_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let ctx = ctx(&dir.path().join("queue.json"), None)?;
        assert!(matches!(
            handle_queue_drain(&ctx).await,
            Err(CliError::Validation(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn drain_submits_and_clears() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let queue_path = dir.path().join("queue.json");
        DurableQueue::new(&queue_path).persist(&[Task::new("magnet:?a")], "offline")?;

        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(200)
                .header("set-cookie", "SID=drain; path=/")
                .body("Ok.");
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/app/version");
            then.status(200).body("v4.6.2");
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/logout");
            then.status(200);
        });
        let add = server.mock(|when, then| {
            when.method(POST).path("/api/v2/torrents/add");
            then.status(200).body("Ok.");
        });

        let ctx = ctx(&queue_path, Some(server.base_url()))?;
        let completion = handle_queue_drain(&ctx)
            .await
            .map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert_eq!(completion, Completion::Done);
        add.assert_hits(1);
        assert!(!queue_path.exists());
        Ok(())
    }
}
