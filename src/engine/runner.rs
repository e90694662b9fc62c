mod diagnostics;
#[cfg(feature = "server")]
pub(crate) mod http;
#[cfg(feature = "live")]
pub(crate) mod watch;

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use petgraph::Graph;
use petgraph::graph::NodeIndex;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::Service;
use crate::engine::Task;
use crate::error::{BuildError, PipelineError};
use crate::{Environment, TaskContext, Taskfile};

pub use diagnostics::Diagnostics;

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Executes `nodes_to_run` on the rayon pool, each task once, every task
/// after all of its prerequisites within the set.
///
/// The calling thread runs the scheduler:
/// 1. Tasks with no pending prerequisite are spawned on the pool.
/// 2. Each finished task reports back over a channel.
/// 3. The dependency counts of its dependents are decremented, and any
///    dependent reaching zero is spawned right away.
///
/// After the first failure nothing new is spawned; tasks already running are
/// waited for, then the failure is returned.
pub(crate) fn run_tasks_parallel(
    graph: &Graph<Task, ()>,
    env: &Environment,
    nodes_to_run: &HashSet<NodeIndex>,
) -> Result<Diagnostics, BuildError> {
    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    // A prerequisite only counts if it's also part of this run.
    let mut dependency_counts: HashMap<NodeIndex, usize> = nodes_to_run
        .iter()
        .map(|&i| {
            (
                i,
                graph
                    .neighbors_directed(i, petgraph::Direction::Incoming)
                    .filter(|dep| nodes_to_run.contains(dep))
                    .count(),
            )
        })
        .collect();

    let total_tasks = nodes_to_run.len() as u64;
    if total_tasks == 0 {
        return Ok(Diagnostics::default());
    }

    let root_span = tracing::span!(Level::INFO, "running_tasks");
    root_span.pb_set_length(total_tasks);
    root_span.pb_set_style(&crate::utils::get_style_bar());
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    let pb_style = crate::utils::get_style_task();

    let mut diagnostics = Diagnostics::default();
    let mut failure: Option<BuildError> = None;

    rayon::in_place_scope(|s| {
        let (result_sender, result_receiver) =
            channel::<(NodeIndex, anyhow::Result<()>, Instant, Duration)>();

        let spawn_task = |index: NodeIndex| {
            let task = graph[index].clone();
            let sender = result_sender.clone();
            let pb_style = pb_style.clone();

            s.spawn(move |_| {
                let span = tracing::span!(Level::INFO, "task", name = %task.name);
                span.pb_set_style(&pb_style);
                span.pb_set_message(&format!("Running {}", task.name));
                let _enter = span.enter();

                let context = TaskContext {
                    env,
                    name: &task.name,
                    token: env.tokens.issue(&task.name),
                    span: span.clone(),
                };

                let start_time = Instant::now();

                // A panicking action only owns its own data, the shared state
                // it can reach is behind locks which recover from poisoning.
                let result = match &task.action {
                    None => Ok(()),
                    Some(action) => match std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                        || action(&context),
                    )) {
                        Ok(result) => result,
                        Err(panic) => {
                            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                                format!("Task panicked: {s}")
                            } else if let Some(s) = panic.downcast_ref::<String>() {
                                format!("Task panicked: {s}")
                            } else {
                                String::from("Task panicked with unknown payload")
                            };

                            Err(anyhow::anyhow!(msg))
                        }
                    },
                };

                let elapsed = start_time.elapsed();

                // the scheduler outlives every task, a failed send can't happen
                let _ = sender.send((index, result, start_time, elapsed));
            });
        };

        let mut in_flight = 0usize;

        for &node_index in nodes_to_run {
            if dependency_counts.get(&node_index).copied().unwrap_or(0) == 0 {
                spawn_task(node_index);
                in_flight += 1;
            }
        }

        while in_flight > 0 {
            let Ok((completed_index, result, start, duration)) = result_receiver.recv() else {
                break;
            };
            in_flight -= 1;

            let name = graph[completed_index].name.clone();
            root_span.pb_inc(1);

            if let Err(error) = result {
                if failure.is_none() {
                    failure = Some(classify(name, error));
                }
                continue;
            }

            tracing::debug!(task = %name, ?duration, "finished");
            diagnostics.record(name, TaskExecution { start, duration });

            if failure.is_some() {
                continue;
            }

            if let Some(dependents_of_completed) = dependents.get(&completed_index) {
                for &index in dependents_of_completed {
                    if let Some(count) = dependency_counts.get_mut(&index) {
                        *count -= 1;
                        if *count == 0 {
                            spawn_task(index);
                            in_flight += 1;
                        }
                    }
                }
            }
        }
    });

    match failure {
        Some(error) => Err(error),
        None => {
            tracing::info!("Finished {} tasks", diagnostics.len());
            Ok(diagnostics)
        }
    }
}

fn classify(name: String, error: anyhow::Error) -> BuildError {
    let superseded = error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<PipelineError>(), Some(PipelineError::Superseded(_))));

    if superseded {
        BuildError::Superseded(name)
    } else {
        BuildError::Task(name, error)
    }
}

/// Keeps the process alive while tasks left services behind: runs the file
/// watcher on this thread if one was armed, otherwise waits for the static
/// file server to exit. Returns right away when there is nothing to wait for.
pub(crate) fn idle(taskfile: &Taskfile, env: &Environment) -> anyhow::Result<()> {
    let services = env.take_services();

    #[cfg(feature = "server")]
    let mut servers = Vec::new();
    #[cfg(feature = "live")]
    let mut watcher = None;

    for service in services {
        match service {
            #[cfg(feature = "server")]
            Service::Http(handle) => servers.push(handle),
            #[cfg(feature = "live")]
            Service::Watch(armed) => watcher = Some(armed),
        }
    }

    #[cfg(feature = "live")]
    if let Some(watcher) = watcher {
        return watcher.serve(taskfile, env);
    }

    #[cfg(feature = "server")]
    for handle in servers {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("HTTP server thread panicked"),
        }
    }

    let _ = taskfile;
    Ok(())
}
