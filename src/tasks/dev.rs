use crate::TaskContext;

/// Serves the intermediate output, the sources and the vendor packages, in
/// that order of precedence. The server outlives the run.
#[cfg(feature = "server")]
pub(super) fn statics(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    use crate::core::Service;
    use crate::engine::http;

    let project = ctx.project();
    let paths = project.paths();

    let roots = [
        paths.tmp.clone(),
        paths.tmp.join(&paths.src),
        paths.src.clone(),
        paths.vendor.clone(),
    ]
    .into_iter()
    .map(|root| project.path(root))
    .collect();

    let handle = http::start(roots, project.config.server.port);
    ctx.env.add_service(Service::Http(handle));

    Ok(())
}

#[cfg(not(feature = "server"))]
pub(super) fn statics(_: &TaskContext<'_>) -> anyhow::Result<()> {
    anyhow::bail!("tsumiki was built without the `server` feature, no static file server available")
}

/// Starts the live reload server and arms the file watcher. Both keep
/// working once the run is over.
#[cfg(feature = "live")]
pub(super) fn watch(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    use anyhow::Context;

    use crate::core::{Mode, Service};
    use crate::engine::Watcher;

    if ctx.env.mode != Mode::Watch {
        tracing::warn!("the watch task runs outside of watch mode, live reload is disabled");
    }

    ctx.env
        .reload
        .listen()
        .context("Couldn't start the live reload server")?;

    let project = ctx.project();
    let rules = super::watch_rules(&project.paths().src);
    let watcher = Watcher::arm(&project.root, rules)?;
    ctx.env.add_service(Service::Watch(watcher));

    Ok(())
}

#[cfg(not(feature = "live"))]
pub(super) fn watch(_: &TaskContext<'_>) -> anyhow::Result<()> {
    anyhow::bail!("tsumiki was built without the `live` feature, watching is not available")
}
