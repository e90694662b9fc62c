use std::fs;

use anyhow::Context;

use crate::fileset::FileSet;
use crate::html::{self, HtmlMinOptions};
use crate::inject::{self, Injection};
use crate::TaskContext;

use super::{app_files, css_files, vendor_files, write};

fn read_shell(ctx: &TaskContext<'_>) -> anyhow::Result<String> {
    let shell = ctx.project().paths().src.join("index.html");
    fs::read_to_string(ctx.project().path(&shell))
        .with_context(|| format!("Couldn't read the HTML shell {shell}"))
}

/// Refreshes the references in the HTML shell, then writes the served copy
/// to `.tmp/index.html`. While watching, the served copy also loads the live
/// reload client.
pub(super) fn index(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let project = ctx.project();
    let paths = project.paths();

    let vendor = Injection::vendor()
        .ignore_path([paths.vendor.as_str()])
        .add_root_slash(false);
    let app = Injection::default()
        .ignore_path([paths.tmp.as_str(), paths.src.as_str()])
        .add_root_slash(false);

    let shell = read_shell(ctx)?;
    let shell = inject::inject(&shell, &vendor, &vendor_files(project)?);
    let shell = inject::inject(&shell, &app, &app_files(project)?.chain(css_files(project)?));

    write(ctx, paths.src.join("index.html"), &shell)?;

    let served = match ctx.env.get_refresh_script() {
        Some(script) => html::embed_before_body_end(&shell, &script),
        None => shell,
    };
    let out = paths.tmp.join("index.html");
    write(ctx, &out, served)?;
    ctx.env.notify_changed(out.as_str());

    tracing::info!("injected {}", paths.src.join("index.html"));
    Ok(())
}

/// Points the shell at the minified bundles and writes the minified result
/// to `dist/index.html`.
pub(super) fn dist(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let project = ctx.project();
    let dist = &project.paths().dist;
    let name = &project.name;

    let vendors = FileSet::resolve(
        &project.root,
        [format!("{dist}/vendors.min.js"), format!("{dist}/vendors.min.css")],
    )?;
    let own = FileSet::resolve(
        &project.root,
        [format!("{dist}/{name}.min.js"), format!("{dist}/{name}.min.css")],
    )?;

    let vendor = Injection::vendor()
        .ignore_path([dist.as_str()])
        .add_root_slash(false);
    let app = Injection::default()
        .ignore_path([dist.as_str()])
        .add_root_slash(false);

    let shell = read_shell(ctx)?;
    let shell = inject::inject(&shell, &vendor, &vendors);
    let shell = inject::inject(&shell, &app, &own);
    let shell = html::minify_html(&shell, &HtmlMinOptions::default());

    let out = write(ctx, dist.join("index.html"), shell)?;
    tracing::info!("wrote {out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixture::{self, Fixture};
    use super::*;

    const SHELL: &str = "<!doctype html>\n<html>\n<head>\n  <!-- inject:vendor:css -->\n  <!-- endinject -->\n  <!-- inject:css -->\n  <!-- endinject -->\n</head>\n<body>\n  <div ng-view></div>\n  <!-- inject:vendor:js -->\n  <!-- endinject -->\n  <!-- inject:js -->\n  <!-- endinject -->\n</body>\n</html>\n";

    fn project() -> Fixture {
        Fixture::new(&[
            (
                "bower.json",
                r#"{"name": "cv", "dependencies": {"angular": "*", "theme": "*"}}"#,
            ),
            ("bower_components/angular/.bower.json", r#"{"main": "angular.js"}"#),
            ("bower_components/angular/angular.js", ""),
            ("bower_components/theme/.bower.json", r#"{"main": ["theme.css"]}"#),
            ("bower_components/theme/theme.css", ""),
            ("src/app/index.html", SHELL),
            ("src/app/app.js", "angular.module('cv', []);"),
            ("src/app/app_test.js", ""),
            (".tmp/css/main.css", ""),
            (".tmp/cv-templates.js", "angular.module('cv');"),
        ])
    }

    #[test]
    fn test_index_injects_references() {
        let fixture = project();
        let env = fixture.env(None);

        fixture::run(&env, "index", index).unwrap();

        let shell = fixture.read("src/app/index.html");
        assert!(shell.contains(
            "  <!-- inject:vendor:css -->\n  <link rel=\"stylesheet\" href=\"theme/theme.css\">\n  <!-- endinject -->"
        ));
        assert!(shell.contains("<link rel=\"stylesheet\" href=\"css/main.css\">"));
        assert!(shell.contains("<script src=\"angular/angular.js\"></script>"));
        assert!(shell.contains(
            "  <!-- inject:js -->\n  <script src=\"app.js\"></script>\n  <script src=\"cv-templates.js\"></script>\n  <!-- endinject -->"
        ));
        assert!(!shell.contains("app_test.js"));

        // outside of watch mode the served copy is the shell itself
        assert_eq!(fixture.read(".tmp/index.html"), shell);
    }

    #[test]
    fn test_index_is_stable() {
        let fixture = project();
        let env = fixture.env(None);

        fixture::run(&env, "index", index).unwrap();
        let first = fixture.read("src/app/index.html");
        fixture::run(&env, "index", index).unwrap();

        assert_eq!(fixture.read("src/app/index.html"), first);
    }

    #[test]
    fn test_index_rerun_leaves_shell_untouched() {
        let fixture = project();
        let env = fixture.env(None);

        fixture::run(&env, "index", index).unwrap();

        let shell = fixture.root.join("src/app/index.html");
        let past = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fs::File::options().write(true).open(&shell).unwrap().set_modified(past).unwrap();

        fixture::run(&env, "index", index).unwrap();

        // an unmodified shell raises no event for the watcher to rerun `index` on
        assert_eq!(fs::metadata(&shell).unwrap().modified().unwrap(), past);
    }

    #[test]
    fn test_dist_shell() {
        let fixture = project();
        fixture.write("dist/vendors.min.js", "");
        fixture.write("dist/cv.min.js", "");
        fixture.write("dist/cv.min.css", "");
        let env = fixture.env(None);

        fixture::run(&env, "dist", dist).unwrap();

        let shell = fixture.read("dist/index.html");
        // relative references keep the bundle deployable below any path
        assert!(shell.contains("<script src=\"vendors.min.js\"></script>"));
        assert!(shell.contains("<script src=\"cv.min.js\"></script>"));
        assert!(shell.contains("<link rel=\"stylesheet\" href=\"cv.min.css\">"));
        assert!(!shell.contains("\"/"));
        assert!(!shell.contains("inject:vendor:css -->\n"));
        assert!(!shell.contains('\n'));
        assert!(!shell.contains("main.css"));
    }

    #[test]
    fn test_missing_shell_fails() {
        let fixture = Fixture::new(&[]);
        let env = fixture.env(None);

        let err = fixture::run(&env, "index", index).unwrap_err();
        assert!(format!("{err:#}").contains("index.html"));
    }
}
