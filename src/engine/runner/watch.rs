//! Watch mode is implemented as a three-part system:
//!
//! 1. **File watcher**: Uses the `notify` crate to monitor the static roots of
//!    every [`WatchRule`] recursively, debounced so that rapid saves trigger
//!    one rebuild.
//! 2. **Rules**: each filesystem change is matched against the rules; a match
//!    re-runs the rule's tasks through the same [`Taskfile`] that ran the
//!    initial build.
//! 3. **Live reload**: rules with [`Policy::ReloadOrReindex`] notify
//!    connected browsers of edits, and re-inject the HTML shell when files
//!    appear or disappear.
//!
//! ## The Loop
//!
//! The watcher runs on the main thread once the initial run is over. Each
//! batch of events starts a new run on its own thread, so a long rebuild
//! never delays the next batch. When two runs of the same task overlap, the
//! older one is superseded and stops before its next write.

use std::collections::HashSet;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};

use crate::error::WatchError;
use crate::{Environment, Taskfile};

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

const DEBOUNCE: Duration = Duration::from_millis(250);

/// The task re-run when a watched file appears or disappears under
/// [`Policy::ReloadOrReindex`].
const REINDEX_TASK: &str = "index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

/// What a matching change does besides running the rule's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Nothing else.
    Rerun,
    /// Edits notify live-reload clients, additions and removals re-run the
    /// `index` task.
    ReloadOrReindex,
}

/// Maps changes of files matching `patterns` to `tasks`.
#[derive(Debug, Clone)]
pub struct WatchRule {
    /// Root-relative glob patterns, `!` marks an exclusion.
    pub patterns: Vec<String>,
    pub tasks: Vec<String>,
    pub policy: Policy,
}

impl WatchRule {
    pub fn new<P, T>(patterns: P, tasks: T, policy: Policy) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            tasks: tasks.into_iter().map(Into::into).collect(),
            policy,
        }
    }

    fn includes(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .filter(|p| !p.starts_with('!'))
            .map(|p| p.trim_start_matches("./"))
    }

    /// Whether the root-relative `path` is covered by this rule.
    pub fn matches(&self, path: &str) -> bool {
        let compile = |pattern: &str| Pattern::new(pattern).ok();

        let included = self
            .includes()
            .filter_map(compile)
            .any(|pattern| pattern.matches_with(path, OPTIONS));

        included
            && !self
                .patterns
                .iter()
                .filter_map(|p| p.strip_prefix('!'))
                .map(|p| p.trim_start_matches("./"))
                .filter_map(compile)
                .any(|pattern| pattern.matches_with(path, OPTIONS))
    }
}

/// The reaction to one batch of changes.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Plan {
    pub tasks: Vec<String>,
    pub reload: Vec<String>,
}

impl Plan {
    fn add_task(&mut self, task: &str) {
        if !self.tasks.iter().any(|t| t == task) {
            self.tasks.push(task.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.reload.is_empty()
    }
}

pub(crate) fn plan(rules: &[WatchRule], changes: &[(String, ChangeKind)]) -> Plan {
    let mut plan = Plan::default();

    for (path, kind) in changes {
        for rule in rules.iter().filter(|rule| rule.matches(path)) {
            for task in &rule.tasks {
                plan.add_task(task);
            }

            if rule.policy == Policy::ReloadOrReindex {
                match kind {
                    ChangeKind::Changed => {
                        if !plan.reload.contains(path) {
                            plan.reload.push(path.clone());
                        }
                    }
                    ChangeKind::Added | ChangeKind::Removed => plan.add_task(REINDEX_TASK),
                }
            }
        }
    }

    plan
}

fn change_kind(kind: &EventKind, path: &std::path::Path) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Added),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(_)) => Some(if path.exists() {
            ChangeKind::Added
        } else {
            ChangeKind::Removed
        }),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => Some(ChangeKind::Changed),
        EventKind::Access(_) => None,
    }
}

/// An armed file watcher, waiting to be served once the initial run is over.
pub(crate) struct Watcher {
    root: Utf8PathBuf,
    rules: Vec<WatchRule>,
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    rx: Receiver<DebounceEventResult>,
}

impl Watcher {
    /// Registers recursive watches on the static roots of every rule below
    /// `root`. Roots which don't exist are skipped with an error message.
    pub(crate) fn arm(root: &Utf8Path, rules: Vec<WatchRule>) -> Result<Self, WatchError> {
        let root = root.canonicalize_utf8()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(DEBOUNCE, None, tx)?;

        let mut watched = HashSet::new();
        for rule in &rules {
            for pattern in rule.includes() {
                match resolve_watch_path(root.join(pattern)) {
                    Ok(path) => {
                        watched.insert(path);
                    }
                    Err(e) => tracing::error!("failed to resolve path {pattern}: {e}"),
                }
            }
        }

        // Collapse watched paths to reduce the number of watches
        for path in collapse_watch_paths(watched) {
            tracing::info!("watching {}", path);
            debouncer.watch(&path, RecursiveMode::Recursive)?;
        }

        Ok(Self {
            root,
            rules,
            _debouncer: debouncer,
            rx,
        })
    }

    /// Reacts to filesystem events until the watcher shuts down. Failing runs
    /// are logged, they never stop the loop.
    pub(crate) fn serve(self, taskfile: &Taskfile, env: &Environment) -> anyhow::Result<()> {
        tracing::info!("watching for changes...");

        std::thread::scope(|scope| {
            loop {
                let events = match self.rx.recv() {
                    Ok(Ok(events)) => events,
                    Ok(Err(errors)) => {
                        for error in errors {
                            tracing::error!("watch error: {error:?}");
                        }
                        continue;
                    }
                    Err(_) => break,
                };

                let changes: Vec<(String, ChangeKind)> = events
                    .iter()
                    .flat_map(|de| {
                        de.event.paths.iter().filter_map(|path| {
                            let kind = change_kind(&de.event.kind, path)?;
                            let path = Utf8Path::from_path(path)?;
                            let relative = path.strip_prefix(&self.root).ok()?;
                            Some((relative.as_str().replace('\\', "/"), kind))
                        })
                    })
                    .collect();

                let plan = plan(&self.rules, &changes);
                if plan.is_empty() {
                    continue;
                }

                for path in &plan.reload {
                    tracing::info!(%path, "reloading");
                    env.notify_changed(path);
                }

                if plan.tasks.is_empty() {
                    continue;
                }

                tracing::info!(tasks = ?plan.tasks, "change detected, re-running tasks...");

                scope.spawn(move || match taskfile.run_all(&plan.tasks, env) {
                    Ok(diagnostics) => {
                        tracing::info!("rebuilt {} tasks, watching for changes...", diagnostics.len())
                    }
                    Err(e) if e.is_superseded() => tracing::debug!("{e}"),
                    Err(e) => tracing::error!("{e:#}"),
                });
            }
        });

        Ok(())
    }
}

/// Canonical static root of a glob, the directory to watch recursively.
/// A concrete file is watched through its parent, so that atomic writes
/// replacing the file are caught.
pub(crate) fn resolve_watch_path(glob_str: impl AsRef<str>) -> anyhow::Result<Utf8PathBuf> {
    let path = Utf8Path::new(glob_str.as_ref());

    // Split path into static root and dynamic suffix (containing wildcards)
    let components: Vec<_> = path.components().collect();
    let split_idx = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let root_part: Utf8PathBuf = components.iter().take(split_idx).collect();
    let absolute_root = root_part.canonicalize_utf8()?;

    if split_idx == components.len() && absolute_root.is_file() {
        return Ok(absolute_root
            .parent()
            .unwrap_or(&absolute_root)
            .to_path_buf());
    }

    Ok(absolute_root)
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}
