//! Command handlers grouped by concern.

pub(crate) mod dispatch;
pub(crate) mod health;
pub(crate) mod queue;
pub(crate) mod repair;

use lectern_dispatch::{DispatchError, FailoverDispatcher};

use crate::context::{AppContext, CliError, CliResult};

pub(crate) fn build_dispatcher(ctx: &AppContext) -> CliResult<FailoverDispatcher> {
    let dispatcher = FailoverDispatcher::from_config(&ctx.config)
        .map_err(failure("failed to build HTTP client"))?;
    Ok(dispatcher.with_metrics(ctx.metrics.clone()))
}

pub(crate) fn require_endpoints(ctx: &AppContext) -> CliResult<()> {
    if ctx.config.endpoints.is_empty() {
        return Err(CliError::validation(
            "no endpoints configured (add an `endpoints` section to the configuration file)",
        ));
    }
    Ok(())
}

pub(crate) fn failure(context: &'static str) -> impl FnOnce(DispatchError) -> CliError {
    move |err| CliError::failure(anyhow::Error::new(err).context(context))
}
