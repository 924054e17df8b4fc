use crate::commands::{build_dispatcher, require_endpoints};
use crate::context::{AppContext, CliResult, Completion};
use crate::output::render_health;

pub(crate) async fn handle_health(ctx: &AppContext) -> CliResult<Completion> {
    require_endpoints(ctx)?;
    let dispatcher = build_dispatcher(ctx)?;
    let reports = dispatcher.prober().probe_all(&ctx.config.endpoints).await;
    render_health(&reports, ctx.output)?;
    Ok(Completion::Done)
}
