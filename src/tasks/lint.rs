use camino::Utf8PathBuf;

use crate::fileset::FileSet;
use crate::tools::{self, LintReport};
use crate::TaskContext;

/// Extra arguments pointing a linter at its configuration file, when the
/// project has one.
fn config_args(ctx: &TaskContext<'_>, file: &str, args: impl FnOnce(&str) -> Vec<String>) -> Vec<String> {
    if ctx.project().path(file).is_file() {
        args(file)
    } else {
        Vec::new()
    }
}

fn run(
    ctx: &TaskContext<'_>,
    linter: &str,
    argv: &[String],
    extra: &[String],
    files: &FileSet,
) -> anyhow::Result<LintReport> {
    let root = &ctx.project().root;
    let changed: Vec<Utf8PathBuf> = ctx.env.lints.changed(linter, root, files.files());

    if changed.is_empty() {
        tracing::debug!(linter, "nothing changed since the last lint");
        return Ok(LintReport::default());
    }

    Ok(tools::lint(argv, root, extra, &changed)?)
}

pub(super) fn jshint(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let src = &ctx.project().paths().src;
    let files = FileSet::resolve(&ctx.project().root, [format!("{src}/**/*.js")])?;
    let extra = config_args(ctx, ".jshintrc", |file| vec!["--config".into(), file.into()]);

    run(ctx, "jshint", &ctx.env.tools.jshint, &extra, &files)?;
    Ok(())
}

pub(super) fn csslint(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let files = super::css_files(ctx.project())?;
    let extra = config_args(ctx, ".csslintrc", |file| vec![format!("--config={file}")]);

    run(ctx, "csslint", &ctx.env.tools.csslint, &extra, &files)?;
    Ok(())
}
