use std::fs;

use anyhow::Context;

use crate::inject::{self, Injection};
use crate::tools;
use crate::TaskContext;

use super::{test_files, write};

const KARMA_CONF: &str = "karma.conf.js";

/// Rewrites the `files` array of the karma configuration with the current
/// vendor, application and test scripts.
pub(super) fn karma_conf(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let project = ctx.project();
    let path = project.path(KARMA_CONF);

    let conf = fs::read_to_string(&path).with_context(|| format!("Couldn't read {path}"))?;
    let files = test_files(project)?;
    let conf = inject::inject(&conf, &Injection::karma(), &files);

    write(ctx, KARMA_CONF, conf)?;
    tracing::info!(files = files.len(), "updated {KARMA_CONF}");
    Ok(())
}

pub(super) fn test(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    karma_conf(ctx)?;

    tracing::info!("running karma");
    tools::run(&ctx.env.tools.karma, "karma", &ctx.project().root)?;
    Ok(())
}
