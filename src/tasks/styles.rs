use std::fs;

use anyhow::Context;
use rayon::prelude::*;

use crate::fileset::FileSet;
use crate::pipeline::{self, DistOptions, Pipeline, Rewrite, Step};
use crate::tools;
use crate::TaskContext;

use super::{below, css_files, write};

pub(super) fn clean_css(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let dir = ctx.project().path(ctx.project().paths().tmp.join("css"));

    match fs::remove_dir_all(&dir) {
        Ok(()) => tracing::debug!(%dir, "removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Couldn't remove {dir}")),
    }

    Ok(())
}

/// Compiles every stylesheet which isn't a partial to `.tmp/css`, keeping the
/// directory structure below the sources.
pub(super) fn styles(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let project = ctx.project();
    let paths = project.paths();
    let src = &paths.src;

    let sources = FileSet::resolve(
        &project.root,
        [format!("{src}/**/*.scss"), format!("!{src}/**/_*.scss")],
    )?;
    let load_paths = [project.path(&paths.vendor), project.path(src)];

    sources
        .files()
        .par_iter()
        .map(|file| {
            let css = tools::compile_scss(&project.path(file), &load_paths)
                .with_context(|| format!("Couldn't compile {file}"))?;

            let out = paths.tmp.join("css").join(below(file, src)).with_extension("css");
            write(ctx, &out, css)?;
            ctx.env.notify_changed(out.as_str());

            Ok(())
        })
        .collect::<anyhow::Result<()>>()?;

    tracing::info!(stylesheets = sources.len(), "compiled styles");
    Ok(())
}

pub(super) fn styles_dist(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let project = ctx.project();

    let pipeline = Pipeline::builder()
        .step(Step::Rewrite(Rewrite::StripParentRefs))
        .chain(pipeline::dist(
            "css",
            &project.name,
            DistOptions::default(),
            &project.paths().dist,
        ))
        .build();

    pipeline
        .run(&ctx.env.tools, &ctx.token, &project.root, &css_files(project)?)
        .context("Couldn't build the distribution stylesheet")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixture::{self, Fixture};
    use super::*;

    fn project() -> Fixture {
        Fixture::new(&[
            ("bower.json", r#"{"name": "cv"}"#),
            ("bower_components/theme/_colors.scss", "$primary: #336699;"),
            ("src/app/_mixins.scss", "@mixin pad { padding: 1px; }"),
            (
                "src/app/main.scss",
                "@import 'theme/colors';\n@import 'mixins';\n.a { color: $primary; @include pad; }\n",
            ),
            (
                "src/app/users/users.scss",
                ".u { background: url(../img/u.png); }\n",
            ),
        ])
    }

    #[test]
    fn test_styles_compiles_into_tmp() {
        let fixture = project();
        let env = fixture.env(None);

        fixture::run(&env, "styles", styles).unwrap();

        let main = fixture.read(".tmp/css/main.css");
        assert!(main.contains("#336699"));
        assert!(main.contains("padding: 1px"));
        assert!(fixture.exists(".tmp/css/users/users.css"));
        assert!(!fixture.exists(".tmp/css/_mixins.css"));
    }

    #[test]
    fn test_clean_css() {
        let fixture = Fixture::new(&[(".tmp/css/old.css", "")]);
        let env = fixture.env(None);

        fixture::run(&env, "clean-css", clean_css).unwrap();
        assert!(!fixture.exists(".tmp/css"));

        // nothing left to remove
        fixture::run(&env, "clean-css", clean_css).unwrap();
    }

    #[test]
    fn test_broken_stylesheet_fails() {
        let fixture = Fixture::new(&[("src/app/main.scss", ".a { color: $undefined; }")]);
        let env = fixture.env(None);

        let err = fixture::run(&env, "styles", styles).unwrap_err();
        assert!(format!("{err:#}").contains("src/app/main.scss"));
    }

    #[test]
    fn test_styles_dist_flattens_references() {
        let fixture = project();
        let env = fixture.env(None);

        fixture::run(&env, "styles", styles).unwrap();
        fixture::run(&env, "styles-dist", styles_dist).unwrap();

        let full = fixture.read("dist/cv.css");
        let min = fixture.read("dist/cv.min.css");
        assert!(full.contains("url(img/u.png)"));
        assert!(min.contains("url(img/u.png)"));
        assert!(min.len() < full.len());
    }
}
