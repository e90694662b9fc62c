//! Linear chains of file transforms.
//!
//! A [`Pipeline`] is a list of [`Step`]s built once and run over a
//! [`FileSet`]. Steps operate on in-memory [`Artifact`]s; only `Write` touches
//! the disk, so one chain can emit several outputs by writing at different
//! points.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::engine::RunToken;
use crate::error::{PipelineError, ToolError};
use crate::fileset::FileSet;
use crate::tools::{self, Toolchain};

/// A file flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: Utf8PathBuf,
    pub contents: Vec<u8>,
}

impl Artifact {
    pub fn new(path: impl Into<Utf8PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Text rewrites applied to artifact contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// Drops every `../`, flattening relative references for the dist layout.
    StripParentRefs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Joins all artifacts with `\n` into one artifact called `name`.
    Concatenate { name: String },
    /// Adds explicit dependency injection annotations to scripts.
    Annotate,
    /// Minifies scripts and stylesheets, anything else passes through.
    Minify,
    /// Changes the file name, keeping the directory.
    Rename { name: String },
    /// Writes every artifact into `dir`, relative to the project root.
    Write { dir: Utf8PathBuf },
    Rewrite(Rewrite),
    Noop,
}

impl Step {
    fn label(&self) -> &'static str {
        match self {
            Step::Concatenate { .. } => "concatenate",
            Step::Annotate => "annotate",
            Step::Minify => "minify",
            Step::Rename { .. } => "rename",
            Step::Write { .. } => "write",
            Step::Rewrite(_) => "rewrite",
            Step::Noop => "noop",
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineBuilder {
    steps: Vec<Step>,
}

impl PipelineBuilder {
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Adds `step` when `flag` is set, a [`Step::Noop`] otherwise.
    pub fn step_if(self, flag: bool, step: Step) -> Self {
        self.step(if flag { step } else { Step::Noop })
    }

    /// Appends every step of `pipeline`.
    pub fn chain(mut self, pipeline: Pipeline) -> Self {
        self.steps.extend(pipeline.steps);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline { steps: self.steps }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Runs the chain over `input`, read from below `root`, and returns the
    /// artifacts left after the last step.
    ///
    /// The run token is checked before every write; once a newer run of the
    /// same task exists this run stops with [`PipelineError::Superseded`].
    pub fn run(
        &self,
        tools: &Toolchain,
        token: &RunToken,
        root: &Utf8Path,
        input: &FileSet,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let mut artifacts = input
            .iter()
            .map(|path| {
                fs::read(root.join(path))
                    .map(|contents| Artifact::new(path.clone(), contents))
                    .map_err(|e| PipelineError::Tool {
                        step: "read",
                        path: path.clone(),
                        source: ToolError::Io(e),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for step in &self.steps {
            artifacts = apply(step, tools, token, root, artifacts)?;
        }

        Ok(artifacts)
    }
}

fn apply(
    step: &Step,
    tools: &Toolchain,
    token: &RunToken,
    root: &Utf8Path,
    artifacts: Vec<Artifact>,
) -> Result<Vec<Artifact>, PipelineError> {
    let failed = |path: &Utf8Path, source: ToolError| PipelineError::Tool {
        step: step.label(),
        path: path.to_owned(),
        source,
    };

    match step {
        Step::Concatenate { name } => {
            let contents = artifacts
                .iter()
                .map(|artifact| artifact.contents.as_slice())
                .collect::<Vec<_>>()
                .join(&b'\n');

            Ok(vec![Artifact::new(name.as_str(), contents)])
        }
        Step::Annotate => artifacts
            .into_iter()
            .map(|mut artifact| {
                if artifact.path.extension() == Some("js") {
                    artifact.contents = tools
                        .annotate(&artifact.contents)
                        .map_err(|e| failed(&artifact.path, e))?;
                }
                Ok(artifact)
            })
            .collect(),
        Step::Minify => artifacts
            .into_iter()
            .map(|mut artifact| {
                match artifact.path.extension() {
                    Some("js") => {
                        artifact.contents = tools
                            .minify_js(&artifact.contents)
                            .map_err(|e| failed(&artifact.path, e))?;
                    }
                    Some("css") => {
                        let text = std::str::from_utf8(&artifact.contents).map_err(|_| {
                            failed(&artifact.path, ToolError::Utf8(artifact.path.clone()))
                        })?;
                        artifact.contents = tools::minify_css(text)
                            .map_err(|e| failed(&artifact.path, e))?
                            .into_bytes();
                    }
                    _ => {}
                }
                Ok(artifact)
            })
            .collect(),
        Step::Rename { name } => Ok(artifacts
            .into_iter()
            .map(|mut artifact| {
                artifact.path.set_file_name(name);
                artifact
            })
            .collect()),
        Step::Write { dir } => {
            if !token.is_current() {
                return Err(PipelineError::Superseded(token.name().to_string()));
            }

            let dir = root.join(dir);
            fs::create_dir_all(&dir).map_err(|e| PipelineError::Write(dir.clone(), e))?;

            for artifact in &artifacts {
                let file = artifact.path.file_name().unwrap_or(artifact.path.as_str());
                let path = dir.join(file);
                fs::write(&path, &artifact.contents).map_err(|e| PipelineError::Write(path.clone(), e))?;
                tracing::debug!(%path, bytes = artifact.contents.len(), "wrote artifact");
            }

            Ok(artifacts)
        }
        Step::Rewrite(Rewrite::StripParentRefs) => Ok(artifacts
            .into_iter()
            .map(|mut artifact| {
                if let Ok(text) = std::str::from_utf8(&artifact.contents) {
                    artifact.contents = text.replace("../", "").into_bytes();
                }
                artifact
            })
            .collect()),
        Step::Noop => Ok(artifacts),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DistOptions {
    /// Also emit `<name>.annotated.<ext>` and minify the annotated source.
    pub annotate: bool,
}

/// The distribution chain: `<name>.<ext>`, optionally
/// `<name>.annotated.<ext>`, and `<name>.min.<ext>`, all written to `dir`.
pub fn dist(ext: &str, name: &str, opts: DistOptions, dir: impl Into<Utf8PathBuf>) -> Pipeline {
    let dir = dir.into();

    Pipeline::builder()
        .step(Step::Concatenate {
            name: format!("{name}.{ext}"),
        })
        .step(Step::Write { dir: dir.clone() })
        .step_if(opts.annotate, Step::Annotate)
        .step_if(
            opts.annotate,
            Step::Rename {
                name: format!("{name}.annotated.{ext}"),
            },
        )
        .step_if(opts.annotate, Step::Write { dir: dir.clone() })
        .step(Step::Minify)
        .step(Step::Rename {
            name: format!("{name}.min.{ext}"),
        })
        .step(Step::Rewrite(Rewrite::StripParentRefs))
        .step(Step::Write { dir })
        .build()
}
