use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::engine::TaskExecution;

/// Execution metrics of one run, returned by
/// [`Taskfile::run`](crate::Taskfile::run).
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Start and duration of every task which completed successfully.
    pub execution_times: HashMap<String, TaskExecution>,
    /// Names of the completed tasks, in completion order.
    pub order: Vec<String>,
}

impl Diagnostics {
    pub(crate) fn record(&mut self, name: String, execution: TaskExecution) {
        self.order.push(name.clone());
        self.execution_times.insert(name, execution);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ran(&self, name: &str) -> bool {
        self.execution_times.contains_key(name)
    }

    /// Position of `name` in completion order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|done| done == name)
    }

    /// Wall time from the first task start to the last task end.
    pub fn total(&self) -> Duration {
        let start = self.execution_times.values().map(|t| t.start).min();
        let end = self.execution_times.values().map(|t| t.start + t.duration).max();

        match (start, end) {
            (Some(start), Some(end)) => end.duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Renders a plain text table of the tasks ordered by start time, with a
    /// bar showing when each task ran relative to the whole run.
    pub fn render_summary(&self) -> String {
        const WIDTH: usize = 40;

        let mut rows: Vec<(&String, &TaskExecution)> = self.execution_times.iter().collect();
        rows.sort_by_key(|(_, t)| t.start);

        let Some(global_start) = rows.first().map(|(_, t)| t.start) else {
            return String::from("No tasks ran\n");
        };

        let total_micros = self.total().as_micros().max(1) as f64;
        let name_width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

        let mut out = String::new();
        for (name, exec) in rows {
            let (offset, length) = bar(global_start, exec, total_micros, WIDTH);

            let _ = writeln!(
                out,
                "{name:<name_width$}  {:>10}  |{}{}{}|",
                format_duration(exec.duration),
                " ".repeat(offset),
                "#".repeat(length),
                " ".repeat(WIDTH - offset - length),
            );
        }

        let _ = writeln!(out, "{:<name_width$}  {:>10}", "total", format_duration(self.total()));
        out
    }
}

fn bar(global_start: Instant, exec: &TaskExecution, total_micros: f64, width: usize) -> (usize, usize) {
    let offset_micros = exec.start.duration_since(global_start).as_micros() as f64;
    let duration_micros = exec.duration.as_micros() as f64;

    let offset = ((offset_micros / total_micros) * width as f64) as usize;
    let offset = offset.min(width - 1);
    let length = (((duration_micros / total_micros) * width as f64).round() as usize)
        .max(1)
        .min(width - offset);

    (offset, length)
}

fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros() as f64;
    if micros < 1000.0 {
        format!("{:.0}µs", micros)
    } else {
        format!("{:.2}ms", micros / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let start = Instant::now();
        let mut diagnostics = Diagnostics::default();

        diagnostics.record(
            "clean-css".into(),
            TaskExecution {
                start,
                duration: Duration::from_millis(10),
            },
        );
        diagnostics.record(
            "styles".into(),
            TaskExecution {
                start: start + Duration::from_millis(10),
                duration: Duration::from_millis(30),
            },
        );

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.position("styles"), Some(1));
        assert_eq!(diagnostics.total(), Duration::from_millis(40));

        let summary = diagnostics.render_summary();
        let lines: Vec<&str> = summary.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("clean-css"));
        assert!(lines[0].contains("10.00ms"));
        assert!(lines[1].starts_with("styles   "));
        assert!(lines[2].contains("40.00ms"));
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(Diagnostics::default().render_summary(), "No tasks ran\n");
    }
}
