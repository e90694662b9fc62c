mod runner;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::TaskContext;

pub use runner::{Diagnostics, TaskExecution};
pub(crate) use runner::{idle, run_tasks_parallel};

#[cfg(feature = "live")]
pub use runner::watch::{ChangeKind, Policy, WatchRule};
#[cfg(feature = "live")]
pub(crate) use runner::watch::Watcher;
#[cfg(feature = "server")]
pub(crate) use runner::http;

pub(crate) type Action = Arc<dyn Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// A node of the task graph.
#[derive(Clone)]
pub(crate) struct Task {
    pub name: String,
    pub prerequisites: Vec<String>,
    pub action: Option<Action>,
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Identifies one run of a task. A newer run of a task with the same name
/// makes all older tokens stale.
#[derive(Debug, Clone)]
pub struct RunToken {
    name: Arc<str>,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl RunToken {
    /// A token no other run can ever supersede.
    pub fn detached() -> Self {
        Self {
            name: Arc::from(""),
            generation: 0,
            current: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

/// Generation counters of every task name, shared by all runs within one
/// [`Environment`](crate::Environment).
#[derive(Debug, Default)]
pub(crate) struct RunTokens {
    table: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

impl RunTokens {
    /// Starts a new generation for `name`, superseding every earlier token.
    pub(crate) fn issue(&self, name: &str) -> RunToken {
        let current = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(name.to_string())
            .or_default()
            .clone();

        let generation = current.fetch_add(1, Ordering::AcqRel) + 1;

        RunToken {
            name: Arc::from(name),
            generation,
            current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_token_supersedes() {
        let tokens = RunTokens::default();

        let first = tokens.issue("styles");
        assert!(first.is_current());

        let second = tokens.issue("styles");
        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(second.name(), "styles");

        // other names are independent
        let other = tokens.issue("templates");
        assert!(second.is_current());
        assert!(other.is_current());
    }

    #[test]
    fn test_detached_is_always_current() {
        assert!(RunToken::detached().is_current());
    }
}
