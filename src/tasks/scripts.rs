use std::fs;

use anyhow::Context;
use rayon::prelude::*;

use crate::angular;
use crate::html::{self, HtmlMinOptions};
use crate::pipeline::{self, DistOptions};
use crate::TaskContext;

use super::{app_files, below, template_files, templates_file, vendor_files, write};

pub(super) fn templates(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    build_templates(ctx, false)
}

pub(super) fn templates_dist(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    build_templates(ctx, true)
}

/// Registers every partial in the `$templateCache` of the application
/// module, bundled into a single script.
fn build_templates(ctx: &TaskContext<'_>, minify: bool) -> anyhow::Result<()> {
    let project = ctx.project();
    let src = &project.paths().src;
    let partials = template_files(project)?;

    let blocks = partials
        .files()
        .par_iter()
        .map(|file| {
            let mut html = fs::read_to_string(project.path(file))
                .with_context(|| format!("Couldn't read partial {file}"))?;
            if minify {
                html = html::minify_html(&html, &HtmlMinOptions::default());
            }

            let url = angular::template_url(&project.name, below(file, src).as_str());
            Ok(angular::template_module(&project.name, &url, &html))
        })
        .collect::<anyhow::Result<Vec<String>>>()?;

    let out = templates_file(project);
    write(ctx, &out, blocks.join("\n"))?;
    ctx.env.notify_changed(out.as_str());

    tracing::info!(partials = blocks.len(), "wrote {out}");
    Ok(())
}

pub(super) fn scripts_dist(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let project = ctx.project();
    let scripts = app_files(project)?;

    pipeline::dist(
        "js",
        &project.name,
        DistOptions { annotate: true },
        &project.paths().dist,
    )
    .run(&ctx.env.tools, &ctx.token, &project.root, &scripts)
    .context("Couldn't build the distribution scripts")?;

    Ok(())
}

/// Bundles the main files of the vendor packages. Scripts and stylesheets are
/// built side by side, a kind with no files produces no output.
pub(super) fn vendors(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let project = ctx.project();
    let files = vendor_files(project)?;
    let dist = &project.paths().dist;

    let bundle = |ext: &str| -> anyhow::Result<()> {
        let input = files.by_extension(ext);
        if input.is_empty() {
            tracing::debug!(ext, "no vendor files");
            return Ok(());
        }

        pipeline::dist(ext, "vendors", DistOptions::default(), dist)
            .run(&ctx.env.tools, &ctx.token, &project.root, &input)
            .with_context(|| format!("Couldn't bundle vendor {ext} files"))?;
        Ok(())
    };

    let (js, css) = rayon::join(|| bundle("js"), || bundle("css"));
    js?;
    css?;

    Ok(())
}
