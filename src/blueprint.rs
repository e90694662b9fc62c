use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};

use crate::core::{Environment, Mode};
use crate::engine::{Diagnostics, Task, run_tasks_parallel};
use crate::error::{BuildError, GraphError};
use crate::TaskContext;

/// The blueprint of a build.
///
/// `Blueprint` is used to declare named tasks and the tasks they depend on.
/// Once every task is declared, [`finish`](Blueprint::finish) validates the
/// graph and turns it into a runnable [`Taskfile`].
///
/// # Example
///
/// ```rust,no_run
/// use tsumiki::Blueprint;
///
/// let mut blueprint = Blueprint::new();
///
/// blueprint.task("clean").run(|_| Ok(()));
/// blueprint
///     .task("build")
///     .depends_on(["clean"])
///     .run(|ctx| {
///         tracing::info!("building {}", ctx.project().name);
///         Ok(())
///     });
///
/// let taskfile = blueprint.finish().unwrap();
/// ```
#[derive(Default)]
pub struct Blueprint {
    tasks: Vec<Task>,
}

impl Blueprint {
    /// Creates a new, empty blueprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the declaration of the task `name`.
    pub fn task(&mut self, name: impl Into<String>) -> TaskDef<'_> {
        TaskDef {
            blueprint: self,
            name: name.into(),
            prerequisites: Vec::new(),
        }
    }

    /// Builds the task graph. Edges point from a prerequisite to the task
    /// depending on it.
    pub fn finish(self) -> Result<Taskfile, GraphError> {
        let mut graph = Graph::new();
        let mut index = HashMap::new();

        for task in self.tasks {
            let name = task.name.clone();
            if index.contains_key(&name) {
                return Err(GraphError::Duplicate(name));
            }
            index.insert(name, graph.add_node(task));
        }

        for target in graph.node_indices().collect::<Vec<_>>() {
            for prerequisite in graph[target].prerequisites.clone() {
                let Some(&source) = index.get(&prerequisite) else {
                    return Err(GraphError::UnknownPrerequisite {
                        task: graph[target].name.clone(),
                        prerequisite,
                    });
                };
                graph.update_edge(source, target, ());
            }
        }

        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            return Err(GraphError::Cycle(graph[cycle.node_id()].name.clone()));
        }

        Ok(Taskfile { graph, index })
    }
}

pub struct TaskDef<'a> {
    blueprint: &'a mut Blueprint,
    name: String,
    prerequisites: Vec<String>,
}

impl TaskDef<'_> {
    /// Tasks which must complete successfully before this one starts.
    pub fn depends_on<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    pub fn run<F>(self, action: F)
    where
        F: Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.blueprint.tasks.push(Task {
            name: self.name,
            prerequisites: self.prerequisites,
            action: Some(Arc::new(action)),
        });
    }

    /// Declares a task with no action of its own, which only runs its
    /// prerequisites.
    pub fn group(self) {
        self.blueprint.tasks.push(Task {
            name: self.name,
            prerequisites: self.prerequisites,
            action: None,
        });
    }
}

/// A validated, runnable task graph.
pub struct Taskfile {
    graph: Graph<Task, ()>,
    index: HashMap<String, NodeIndex>,
}

impl Taskfile {
    /// Runs `name` after everything it transitively depends on.
    pub fn run(&self, name: &str, env: &Environment) -> Result<Diagnostics, BuildError> {
        self.run_all(&[name], env)
    }

    /// Runs several tasks in one go. Prerequisites shared between them run
    /// once.
    pub fn run_all<S>(&self, names: &[S], env: &Environment) -> Result<Diagnostics, BuildError>
    where
        S: AsRef<str>,
    {
        let nodes = self.closure(names)?;
        tracing::debug!(tasks = nodes.len(), "scheduling");
        run_tasks_parallel(&self.graph, env, &nodes)
    }

    /// The requested tasks together with all of their prerequisites.
    fn closure<S: AsRef<str>>(&self, names: &[S]) -> Result<HashSet<NodeIndex>, GraphError> {
        let reversed = Reversed(&self.graph);
        let mut nodes = HashSet::new();

        for name in names {
            let name = name.as_ref();
            let &start = self
                .index
                .get(name)
                .ok_or_else(|| GraphError::UnknownTask(name.to_string()))?;

            let mut dfs = Dfs::new(reversed, start);
            while let Some(node) = dfs.next(reversed) {
                nodes.insert(node);
            }
        }

        Ok(nodes)
    }

    /// Blocks while services started by the last run are alive: the file
    /// watcher, re-running tasks on changes, or the static file server.
    /// Returns right away when no task started one.
    pub fn idle(&self, env: &Environment) -> anyhow::Result<()> {
        crate::engine::idle(self, env)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Whether running `target` also runs `name`. A task requires itself.
    pub fn requires(&self, target: &str, name: &str) -> bool {
        let Some(&wanted) = self.index.get(name) else {
            return false;
        };

        self.closure(&[target])
            .map(|nodes| nodes.contains(&wanted))
            .unwrap_or(false)
    }

    /// The mode a run of `names` needs: watching when any of them leads to
    /// the `watch` task.
    pub fn mode_for<S: AsRef<str>>(&self, names: &[S]) -> Mode {
        if names.iter().any(|name| self.requires(name.as_ref(), "watch")) {
            Mode::Watch
        } else {
            Mode::Build
        }
    }

    /// Every task with its direct prerequisites, in declaration order.
    pub fn describe(&self) -> Vec<(&str, &[String])> {
        self.graph
            .node_weights()
            .map(|task| (task.name.as_str(), task.prerequisites.as_slice()))
            .collect()
    }
}

impl std::fmt::Display for Taskfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let name = self.graph[index].name.replace('"', "\\\"");
            writeln!(f, "    {:?}[\"{}\"]", index.index(), name)?;
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                f,
                "    {:?} --> {:?}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::Project;

    fn env() -> (tempfile::TempDir, Environment) {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::open_with(dir.path(), None).unwrap();
        let env = Environment::new(project, Mode::Build).unwrap();
        (dir, env)
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging(blueprint: &mut Blueprint, log: &Log, name: &str, deps: &[&str]) {
        let log = log.clone();
        blueprint
            .task(name)
            .depends_on(deps.iter().copied())
            .run(move |ctx| {
                log.lock().unwrap().push(ctx.name.to_string());
                Ok(())
            });
    }

    fn diamond(log: &Log) -> Taskfile {
        let mut blueprint = Blueprint::new();
        logging(&mut blueprint, log, "base", &[]);
        logging(&mut blueprint, log, "left", &["base"]);
        logging(&mut blueprint, log, "right", &["base"]);
        logging(&mut blueprint, log, "top", &["left", "right"]);
        logging(&mut blueprint, log, "unrelated", &[]);
        blueprint.finish().unwrap()
    }

    #[test]
    fn test_shared_prerequisite_runs_once() {
        let (_dir, env) = env();
        let log = Log::default();
        let taskfile = diamond(&log);

        let diagnostics = taskfile.run("top", &env).unwrap();
        let log = log.lock().unwrap();

        assert_eq!(log.len(), 4);
        assert_eq!(log.iter().filter(|name| *name == "base").count(), 1);
        assert_eq!(log.first().map(String::as_str), Some("base"));
        assert_eq!(log.last().map(String::as_str), Some("top"));
        assert!(!diagnostics.ran("unrelated"));
        assert!(diagnostics.position("base") < diagnostics.position("left"));
        assert!(diagnostics.position("right") < diagnostics.position("top"));
    }

    #[test]
    fn test_run_all_shares_one_memo() {
        let (_dir, env) = env();
        let log = Log::default();
        let taskfile = diamond(&log);

        taskfile.run_all(&["left", "right"], &env).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0], "base");
    }

    #[test]
    fn test_failure_stops_dependents() {
        let (_dir, env) = env();
        let ran = Arc::new(AtomicUsize::new(0));

        let mut blueprint = Blueprint::new();
        blueprint
            .task("broken")
            .run(|_| Err(anyhow::anyhow!("compiler exploded")));
        let counter = ran.clone();
        blueprint
            .task("after")
            .depends_on(["broken"])
            .run(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let err = blueprint.finish().unwrap().run("after", &env).unwrap_err();

        assert!(matches!(&err, BuildError::Task(name, _) if name == "broken"));
        assert!(err.to_string().contains("compiler exploded"));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_becomes_error() {
        let (_dir, env) = env();

        let mut blueprint = Blueprint::new();
        blueprint.task("boom").run(|_| panic!("kaboom"));

        let err = blueprint.finish().unwrap().run("boom", &env).unwrap_err();
        assert!(err.to_string().contains("Task panicked: kaboom"));
    }

    #[test]
    fn test_group_runs_prerequisites() {
        let (_dir, env) = env();
        let log = Log::default();

        let mut blueprint = Blueprint::new();
        logging(&mut blueprint, &log, "a", &[]);
        logging(&mut blueprint, &log, "b", &[]);
        blueprint.task("all").depends_on(["a", "b"]).group();

        let diagnostics = blueprint.finish().unwrap().run("all", &env).unwrap();

        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(diagnostics.position("all"), Some(2));
    }

    #[test]
    fn test_invalid_graphs() {
        let mut blueprint = Blueprint::new();
        blueprint.task("a").group();
        blueprint.task("a").group();
        assert!(matches!(blueprint.finish(), Err(GraphError::Duplicate(name)) if name == "a"));

        let mut blueprint = Blueprint::new();
        blueprint.task("a").depends_on(["ghost"]).group();
        assert!(matches!(
            blueprint.finish(),
            Err(GraphError::UnknownPrerequisite { task, prerequisite })
                if task == "a" && prerequisite == "ghost"
        ));

        let mut blueprint = Blueprint::new();
        blueprint.task("a").depends_on(["b"]).group();
        blueprint.task("b").depends_on(["a"]).group();
        assert!(matches!(blueprint.finish(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_unknown_task() {
        let (_dir, env) = env();
        let taskfile = diamond(&Log::default());

        let err = taskfile.run("nope", &env).unwrap_err();
        assert!(matches!(err, BuildError::Graph(GraphError::UnknownTask(name)) if name == "nope"));
    }

    #[test]
    fn test_requires_and_mode() {
        let mut blueprint = Blueprint::new();
        blueprint.task("build").group();
        blueprint.task("watch").depends_on(["build"]).group();
        blueprint.task("serve").depends_on(["watch"]).group();
        let taskfile = blueprint.finish().unwrap();

        assert!(taskfile.requires("serve", "build"));
        assert!(taskfile.requires("build", "build"));
        assert!(!taskfile.requires("build", "watch"));
        assert_eq!(taskfile.mode_for(&["build"]), Mode::Build);
        assert_eq!(taskfile.mode_for(&["build", "serve"]), Mode::Watch);
        assert_eq!(
            taskfile.describe(),
            vec![
                ("build", &[][..]),
                ("watch", &["build".to_string()][..]),
                ("serve", &["watch".to_string()][..]),
            ]
        );
    }
}
