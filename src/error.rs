use std::process::ExitStatus;

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Couldn't compile glob pattern '{0}'.\n{1}")]
    Pattern(String, glob::PatternError),
}

/// Failures of the external transforms a pipeline delegates to.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Couldn't run '{0}', is it installed?\n{1}")]
    Spawn(String, std::io::Error),

    #[error("'{tool}' exited with {status}:\n{stderr}")]
    Failed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("No command configured for {0}")]
    Unconfigured(&'static str),

    #[error("Stylesheet compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    #[error("Couldn't decode '{0}' as UTF-8")]
    Utf8(Utf8PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Step {step} failed on '{path}':\n{source}")]
    Tool {
        step: &'static str,
        path: Utf8PathBuf,
        source: ToolError,
    },

    #[error("Couldn't write '{0}':\n{1}")]
    Write(Utf8PathBuf, std::io::Error),

    #[error("Run of '{0}' was superseded by a newer run")]
    Superseded(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task '{0}' is defined more than once")]
    Duplicate(String),

    #[error("Task '{task}' depends on unknown task '{prerequisite}'")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("Task '{0}' is not defined")]
    UnknownTask(String),

    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Task '{0}':\n{1:#}")]
    Task(String, anyhow::Error),

    #[error("Run of '{0}' was superseded by a newer run")]
    Superseded(String),
}

impl BuildError {
    /// Superseded runs are expected in watch mode and aren't reported as failures.
    pub fn is_superseded(&self) -> bool {
        matches!(self, BuildError::Superseded(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read '{0}':\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse '{0}':\n{1}")]
    Toml(Utf8PathBuf, toml::de::Error),

    #[error("Couldn't parse '{0}':\n{1}")]
    Json(Utf8PathBuf, serde_json::Error),

    #[error("Expected a JSON object in '{0}'")]
    NotAnObject(Utf8PathBuf),

    #[error("Project root '{0}' is not valid UTF-8")]
    Root(std::path::PathBuf),
}

/// Errors raised while resolving vendor files.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Couldn't resolve watch root for '{0}':\n{1}")]
    Root(String, anyhow::Error),
}
