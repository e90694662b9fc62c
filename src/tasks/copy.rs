use std::fs;

use anyhow::Context;
use camino::Utf8PathBuf;
use rayon::prelude::*;

use crate::fileset::FileSet;
use crate::TaskContext;

use super::{below, write};

/// Copies every file in `files` to the root-relative destination chosen by
/// `target`.
fn copy_all<F>(ctx: &TaskContext<'_>, files: &FileSet, target: F) -> anyhow::Result<()>
where
    F: Fn(&Utf8PathBuf) -> Utf8PathBuf + Sync,
{
    files
        .files()
        .par_iter()
        .map(|file| {
            let data = fs::read(ctx.project().path(file))
                .with_context(|| format!("Couldn't read {file}"))?;
            write(ctx, target(file), data)?;
            Ok(())
        })
        .collect::<anyhow::Result<()>>()?;

    tracing::info!(files = files.len(), "copied");
    Ok(())
}

/// Vendor fonts, flattened into `dist/fonts`.
pub(super) fn fonts(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let paths = ctx.project().paths();
    let vendor = &paths.vendor;
    let out = paths.dist.join("fonts");

    let files = FileSet::resolve(&ctx.project().root, [format!("{vendor}/**/fonts/*")])?;

    copy_all(ctx, &files, |file| {
        out.join(file.file_name().unwrap_or(file.as_str()))
    })
}

pub(super) fn assets(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let paths = ctx.project().paths();
    let source = &paths.assets;
    let out = paths.dist.join("assets");

    let files = FileSet::resolve(&ctx.project().root, [format!("{source}/**/*")])?;

    copy_all(ctx, &files, |file| out.join(below(file, source)))
}
