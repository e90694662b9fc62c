//! Project layout and settings.
//!
//! Every project works without a configuration file: the defaults reproduce
//! the conventional AngularJS layout (`src/app`, `.tmp`, `dist`,
//! `bower_components`). An optional `tsumiki.toml` at the project root can
//! override any of them:
//!
//! ```toml
//! name = "xyz-cv-ui"
//!
//! [paths]
//! src = "app"
//!
//! [server]
//! port = 8000
//!
//! [tools]
//! js_minifier = ["uglifyjs", "-c", "-m"]
//! ```

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the optional configuration file at the project root.
pub const CONFIG_FILE: &str = "tsumiki.toml";

/// Environment selected when `NODE_ENV` is missing.
pub const DEFAULT_ENVIRONMENT: &str = "development";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: Option<String>,
    pub paths: Paths,
    pub server: Server,
    pub tools: Tools,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    /// Application sources, partials and the HTML shell.
    pub src: Utf8PathBuf,
    /// Intermediate build output.
    pub tmp: Utf8PathBuf,
    /// Distribution output.
    pub dist: Utf8PathBuf,
    /// Installed vendor packages.
    pub vendor: Utf8PathBuf,
    /// Directory with per-environment JSON settings.
    pub config: Utf8PathBuf,
    /// Static files copied as they are into the distribution.
    pub assets: Utf8PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            src: "src/app".into(),
            tmp: ".tmp".into(),
            dist: "dist".into(),
            vendor: "bower_components".into(),
            config: "config".into(),
            assets: "src/app/assets".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Server {
    pub port: u16,
    pub reload_port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            port: 9292,
            reload_port: 35729,
        }
    }
}

/// Command lines of the external tools, as argv arrays.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tools {
    pub js_minifier: Vec<String>,
    pub annotate: Vec<String>,
    pub jshint: Vec<String>,
    pub csslint: Vec<String>,
    pub karma: Vec<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            js_minifier: argv(&["esbuild", "--minify", "--loader=js"]),
            annotate: argv(&["ng-annotate", "-a", "-"]),
            jshint: argv(&["jshint"]),
            csslint: argv(&["csslint", "--format=compact"]),
            karma: argv(&["karma", "start", "karma.conf.js", "--single-run"]),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BowerName {
    name: Option<String>,
}

/// A project on disk: its root, its resolved name and the selected environment.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: Utf8PathBuf,
    pub name: String,
    /// Value of `NODE_ENV`, or [`DEFAULT_ENVIRONMENT`].
    pub environment: String,
    pub config: ProjectConfig,
}

impl Project {
    /// Opens the project at `root`, taking the environment from `NODE_ENV`.
    pub fn open(root: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::open_with(root, std::env::var("NODE_ENV").ok())
    }

    pub fn open_with(
        root: impl AsRef<std::path::Path>,
        environment: Option<String>,
    ) -> Result<Self, ConfigError> {
        let root = Utf8Path::from_path(root.as_ref())
            .ok_or_else(|| ConfigError::Root(root.as_ref().to_path_buf()))?
            .to_path_buf();

        let config = load_config(&root)?;

        let name = match &config.name {
            Some(name) => name.clone(),
            None => bower_name(&root)?.unwrap_or_else(|| fallback_name(&root)),
        };

        let environment = environment
            .filter(|env| !env.is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        tracing::debug!(%root, %name, %environment, "opened project");

        Ok(Self {
            root,
            name,
            environment,
            config,
        })
    }

    /// Joins a root-relative path onto the project root.
    pub fn path(&self, relative: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(relative)
    }

    pub fn paths(&self) -> &Paths {
        &self.config.paths
    }

    /// Settings file of the selected environment, relative to the root.
    pub fn environment_file(&self) -> Utf8PathBuf {
        self.paths()
            .config
            .join(&self.environment)
            .with_extension("json")
    }
}

fn load_config(root: &Utf8Path) -> Result<ProjectConfig, ConfigError> {
    let path = root.join(CONFIG_FILE);

    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let text = fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
    toml::from_str(&text).map_err(|e| ConfigError::Toml(path, e))
}

fn bower_name(root: &Utf8Path) -> Result<Option<String>, ConfigError> {
    let path = root.join("bower.json");

    if !path.exists() {
        return Ok(None);
    }

    let text = fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
    let bower: BowerName = serde_json::from_str(&text).map_err(|e| ConfigError::Json(path, e))?;

    Ok(bower.name)
}

fn fallback_name(root: &Utf8Path) -> String {
    root.canonicalize_utf8()
        .ok()
        .and_then(|path| path.file_name().map(str::to_string))
        .unwrap_or_else(|| String::from("app"))
}
