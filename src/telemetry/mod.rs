//! Metrics collaborator for the lifecycle tracker.
//!
//! The tracker never talks to a metrics backend directly. The event
//! dispatcher translates domain events into parameter, metric, and artifact
//! calls on a [`MetricsSink`], scoped by a run name (the request id).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Experiment-tracking style sink: string parameters, numeric metrics, and
/// references to stored artifacts, grouped into named runs.
pub trait MetricsSink: Send + Sync {
    fn log_param(&self, run: &str, key: &str, value: &str) -> anyhow::Result<()>;

    fn log_metric(&self, run: &str, key: &str, value: f64) -> anyhow::Result<()>;

    fn log_artifact(&self, run: &str, path: &Path) -> anyhow::Result<()>;

    /// Log each `(name, value)` under `task.{scope}.{name}`.
    fn log_task_metrics(&self, run: &str, scope: &str, metrics: &[(&str, f64)]) -> anyhow::Result<()> {
        for (name, value) in metrics {
            self.log_metric(run, &task_metric_key(scope, name), *value)?;
        }
        Ok(())
    }

    /// Log each `(name, value)` under `workflow.{name}`.
    fn log_workflow_metrics(&self, run: &str, metrics: &[(&str, f64)]) -> anyhow::Result<()> {
        for (name, value) in metrics {
            self.log_metric(run, &format!("workflow.{name}"), *value)?;
        }
        Ok(())
    }
}

/// Key a task or subtask metric is logged under.
pub fn task_metric_key(scope: &str, name: &str) -> String {
    format!("task.{scope}.{name}")
}

// ---------------------------------------------------------------------------
// LogMetricsSink
// ---------------------------------------------------------------------------

/// Writes every call as a `log` record under the `taskmaster::metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn log_param(&self, run: &str, key: &str, value: &str) -> anyhow::Result<()> {
        log::info!(target: "taskmaster::metrics", "[{}] param {} = {}", run, key, value);
        Ok(())
    }

    fn log_metric(&self, run: &str, key: &str, value: f64) -> anyhow::Result<()> {
        log::info!(target: "taskmaster::metrics", "[{}] metric {} = {}", run, key, value);
        Ok(())
    }

    fn log_artifact(&self, run: &str, path: &Path) -> anyhow::Result<()> {
        log::info!(target: "taskmaster::metrics", "[{}] artifact {}", run, path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryMetricsSink
// ---------------------------------------------------------------------------

/// Everything recorded for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRecord {
    pub params: HashMap<String, String>,
    /// Every value logged per key, in order.
    pub metrics: HashMap<String, Vec<f64>>,
    pub artifacts: Vec<PathBuf>,
}

impl RunRecord {
    /// Most recent value logged for `key`.
    pub fn last_metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(|values| values.last().copied())
    }
}

/// Records every call in memory, keyed by run name.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one run, if anything was logged to it.
    pub fn run(&self, run: &str) -> Option<RunRecord> {
        self.runs.lock().get(run).cloned()
    }

}

impl MetricsSink for InMemoryMetricsSink {
    fn log_param(&self, run: &str, key: &str, value: &str) -> anyhow::Result<()> {
        self.runs
            .lock()
            .entry(run.to_string())
            .or_default()
            .params
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn log_metric(&self, run: &str, key: &str, value: f64) -> anyhow::Result<()> {
        self.runs
            .lock()
            .entry(run.to_string())
            .or_default()
            .metrics
            .entry(key.to_string())
            .or_default()
            .push(value);
        Ok(())
    }

    fn log_artifact(&self, run: &str, path: &Path) -> anyhow::Result<()> {
        self.runs
            .lock()
            .entry(run.to_string())
            .or_default()
            .artifacts
            .push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_sink_groups_by_run() {
        let sink = InMemoryMetricsSink::new();
        sink.log_param("req-1", "priority", "HIGH").unwrap();
        sink.log_metric("req-1", "context.pending_task_count", 2.0).unwrap();
        sink.log_metric("req-1", "context.pending_task_count", 1.0).unwrap();
        sink.log_artifact("req-2", Path::new("/tmp/request_req-2.json")).unwrap();

        let run = sink.run("req-1").unwrap();
        assert_eq!(run.params["priority"], "HIGH");
        assert_eq!(run.metrics["context.pending_task_count"], vec![2.0, 1.0]);
        assert_eq!(run.last_metric("context.pending_task_count"), Some(1.0));
        assert!(run.artifacts.is_empty());
        assert_eq!(sink.run("req-2").unwrap().artifacts.len(), 1);
        assert!(sink.run("req-3").is_none());
    }

    #[test]
    fn test_task_and_workflow_metric_keys() {
        let sink = InMemoryMetricsSink::new();
        sink.log_task_metrics("req-1", "task-a.subtask-b", &[("status", 1.0)])
            .unwrap();
        sink.log_workflow_metrics("req-1", &[("error_rate", 0.0)]).unwrap();

        let run = sink.run("req-1").unwrap();
        assert_eq!(run.last_metric("task.task-a.subtask-b.status"), Some(1.0));
        assert_eq!(run.last_metric("workflow.error_rate"), Some(0.0));
    }

    #[test]
    fn test_log_sink_never_fails() {
        let sink = LogMetricsSink;
        assert!(sink.log_param("r", "k", "v").is_ok());
        assert!(sink.log_metric("r", "k", 1.5).is_ok());
        assert!(sink.log_artifact("r", Path::new("x")).is_ok());
    }
}
