//! The standard task set of an AngularJS front end.
//!
//! [`standard`] declares every task on a [`Blueprint`] and returns the
//! validated [`Taskfile`]. The actions live in the submodules, grouped by the
//! kind of output they produce.

mod config;
mod copy;
mod dev;
mod index;
mod karma;
mod lint;
mod scripts;
mod styles;

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::blueprint::{Blueprint, Taskfile};
use crate::config::Project;
use crate::error::{GraphError, PipelineError, ResolveError, VendorError};
use crate::fileset::FileSet;
use crate::vendor;
use crate::TaskContext;

#[cfg(feature = "live")]
use crate::engine::{Policy, WatchRule};

/// Builds the task graph used by the command line.
pub fn standard() -> Result<Taskfile, GraphError> {
    let mut blueprint = Blueprint::new();

    blueprint.task("config").run(config::config);
    blueprint.task("jshint").run(lint::jshint);
    blueprint.task("fonts").run(copy::fonts);
    blueprint.task("assets").run(copy::assets);

    blueprint.task("clean-css").run(styles::clean_css);
    blueprint
        .task("styles")
        .depends_on(["clean-css"])
        .run(styles::styles);
    blueprint
        .task("styles-dist")
        .depends_on(["styles"])
        .run(styles::styles_dist);
    blueprint
        .task("csslint")
        .depends_on(["styles"])
        .run(lint::csslint);

    blueprint.task("templates").run(scripts::templates);
    blueprint
        .task("templates-dist")
        .run(scripts::templates_dist);
    blueprint
        .task("scripts-dist")
        .depends_on(["config", "templates-dist"])
        .run(scripts::scripts_dist);
    blueprint.task("vendors").run(scripts::vendors);

    blueprint.task("index").run(index::index);
    blueprint
        .task("build-all")
        .depends_on(["styles", "templates"])
        .run(index::index);
    blueprint
        .task("dist")
        .depends_on([
            "config",
            "vendors",
            "assets",
            "styles-dist",
            "scripts-dist",
            "fonts",
        ])
        .run(index::dist);

    blueprint.task("statics").run(dev::statics);
    blueprint
        .task("watch")
        .depends_on(["config", "statics", "default"])
        .run(dev::watch);
    blueprint.task("serve").depends_on(["watch"]).group();

    blueprint
        .task("default")
        .depends_on(["lint", "build-all"])
        .group();
    blueprint
        .task("lint")
        .depends_on(["jshint", "csslint"])
        .group();

    blueprint
        .task("test")
        .depends_on(["templates"])
        .run(karma::test);
    blueprint
        .task("karma-conf")
        .depends_on(["templates"])
        .run(karma::karma_conf);

    blueprint.finish()
}

/// What the watcher reacts to, for sources living in `src`.
#[cfg(feature = "live")]
pub(crate) fn watch_rules(src: &Utf8Path) -> Vec<WatchRule> {
    vec![
        WatchRule::new([format!("{src}/**/*.js")], ["jshint"], Policy::ReloadOrReindex),
        WatchRule::new([format!("{src}/index.html")], ["index"], Policy::Rerun),
        WatchRule::new(
            [format!("{src}/**/*.html"), format!("!{src}/index.html")],
            ["templates"],
            Policy::Rerun,
        ),
        WatchRule::new([format!("{src}/**/*.scss")], ["csslint"], Policy::ReloadOrReindex),
    ]
}

/// Writes `contents` to the root-relative `path`, unless this run was
/// superseded in the meantime. A file already holding `contents` is left
/// alone, so the watcher never sees an event for it.
fn write(
    ctx: &TaskContext<'_>,
    path: impl AsRef<Utf8Path>,
    contents: impl AsRef<[u8]>,
) -> Result<Utf8PathBuf, PipelineError> {
    if !ctx.token.is_current() {
        return Err(PipelineError::Superseded(ctx.name.to_string()));
    }

    let path = ctx.project().path(path);
    let contents = contents.as_ref();
    if fs::read(&path).is_ok_and(|current| current == contents) {
        tracing::trace!(%path, "unchanged");
        return Ok(path);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::Write(parent.to_owned(), e))?;
    }
    fs::write(&path, contents).map_err(|e| PipelineError::Write(path.clone(), e))?;

    tracing::debug!(%path, "wrote");
    Ok(path)
}

/// `path` relative to `base`, or `path` itself when it isn't below `base`.
fn below<'a>(path: &'a Utf8Path, base: &Utf8Path) -> &'a Utf8Path {
    path.strip_prefix(base).unwrap_or(path)
}

fn templates_file(project: &Project) -> Utf8PathBuf {
    project
        .paths()
        .tmp
        .join(format!("{}-templates.js", project.name))
}

/// Application scripts in load order: the compiled templates, generated and
/// hand written scripts without tests, sorted by module dependencies.
fn app_files(project: &Project) -> Result<FileSet, ResolveError> {
    let paths = project.paths();
    let (src, tmp) = (&paths.src, &paths.tmp);

    let files = FileSet::resolve(
        &project.root,
        [
            templates_file(project).to_string(),
            format!("{tmp}/{src}/**/*.js"),
            format!("!{tmp}/{src}/**/*_test.js"),
            format!("{src}/**/*.js"),
            format!("!{src}/**/*_test.js"),
        ],
    )?;

    Ok(files.sort_modules(&project.root))
}

fn css_files(project: &Project) -> Result<FileSet, ResolveError> {
    let tmp = &project.paths().tmp;
    FileSet::resolve(&project.root, [format!("{tmp}/css/**/*.css")])
}

/// HTML partials, everything but the shell.
fn template_files(project: &Project) -> Result<FileSet, ResolveError> {
    let src = &project.paths().src;
    FileSet::resolve(
        &project.root,
        [format!("{src}/**/*.html"), format!("!{src}/index.html")],
    )
}

fn vendor_files(project: &Project) -> Result<FileSet, VendorError> {
    vendor::main_files(&project.root, &project.paths().vendor)
}

/// Everything karma loads: vendor scripts, mocks, the application and the
/// tests.
fn test_files(project: &Project) -> anyhow::Result<FileSet> {
    let paths = project.paths();
    let (src, tmp, vendor) = (&paths.src, &paths.tmp, &paths.vendor);

    let mocks = FileSet::from_files([vendor.join("angular-mocks/angular-mocks.js")]);
    let tests = FileSet::resolve(
        &project.root,
        [
            format!("{src}/**/*_test.js"),
            format!("{tmp}/{src}/**/*_test.js"),
        ],
    )?;

    Ok(vendor_files(project)?
        .by_extension("js")
        .chain(mocks)
        .chain(app_files(project)?)
        .chain(tests))
}

#[cfg(test)]
pub(crate) mod fixture {
    use std::fs;

    use camino::{Utf8Path, Utf8PathBuf};

    use crate::config::Project;
    use crate::core::{Environment, Mode};
    use crate::engine::RunToken;
    use crate::tools::Toolchain;
    use crate::TaskContext;

    /// A throwaway project directory.
    pub struct Fixture {
        _dir: tempfile::TempDir,
        pub root: Utf8PathBuf,
    }

    impl Fixture {
        pub fn new(files: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
            let fixture = Self { _dir: dir, root };
            for (path, text) in files {
                fixture.write(path, text);
            }
            fixture
        }

        pub fn write(&self, path: &str, text: &str) {
            let path = self.root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }

        pub fn read(&self, path: impl AsRef<Utf8Path>) -> String {
            fs::read_to_string(self.root.join(path)).unwrap()
        }

        pub fn exists(&self, path: &str) -> bool {
            self.root.join(path).exists()
        }

        pub fn env(&self, environment: Option<&str>) -> Environment {
            let project = Project::open_with(&self.root, environment.map(String::from)).unwrap();
            let mut env = Environment::new(project, Mode::Build).unwrap();
            env.tools = substitutes();
            env
        }
    }

    /// POSIX stand-ins for the external tools.
    pub fn substitutes() -> Toolchain {
        Toolchain {
            js_minifier: vec!["tr".into(), "-d".into(), "\n ".into()],
            annotate: vec!["cat".into()],
            ..Toolchain::default()
        }
    }

    /// Runs a single action outside of any graph.
    pub fn run(
        env: &Environment,
        name: &str,
        action: fn(&TaskContext<'_>) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let ctx = TaskContext {
            env,
            name,
            token: RunToken::detached(),
            span: tracing::Span::none(),
        };
        action(&ctx)
    }
}
