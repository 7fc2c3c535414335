//! Drives the metrics and artifact collaborators from drained domain events.
//!
//! Collaborator failures are logged and swallowed: the tracker has already
//! committed the state change by the time an event reaches this point.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc::UnboundedReceiver;

use super::{DomainEvent, EventEnvelope};
use crate::telemetry::MetricsSink;
use crate::tracker::{ApprovalRole, Event, Status};
use crate::utilities::ArtifactStore;

pub struct EventDispatcher {
    metrics: Arc<dyn MetricsSink>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl EventDispatcher {
    pub fn new(metrics: Arc<dyn MetricsSink>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { metrics, artifacts }
    }

    /// Consume envelopes until every sender is dropped.
    ///
    /// Collaborators do blocking I/O, so each envelope is dispatched on the
    /// blocking pool. Envelopes are still handled one at a time, in order.
    pub async fn run(self, mut receiver: UnboundedReceiver<EventEnvelope>) {
        log::debug!("Event dispatcher started");
        let dispatcher = Arc::new(self);
        while let Some(envelope) = receiver.recv().await {
            let dispatcher = Arc::clone(&dispatcher);
            let handle =
                tokio::task::spawn_blocking(move || dispatcher.dispatch_logged(&envelope));
            if let Err(e) = handle.await {
                log::error!("Event dispatch task failed: {}", e);
            }
        }
        log::debug!("Event dispatcher stopped");
    }

    /// Dispatch each envelope in order, logging failures and continuing.
    pub fn dispatch_all(&self, envelopes: &[EventEnvelope]) {
        for envelope in envelopes {
            self.dispatch_logged(envelope);
        }
    }

    fn dispatch_logged(&self, envelope: &EventEnvelope) {
        if let Err(e) = self.dispatch(envelope) {
            log::warn!(
                "Failed to record {} #{} for {}: {:#}",
                envelope.event.name(),
                envelope.sequence,
                envelope.request_id,
                e
            );
        }
    }

    /// Translate one envelope into collaborator calls.
    pub fn dispatch(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let run = envelope.request_id.as_str();
        let at = envelope.occurred_at.to_rfc3339();
        let epoch = envelope.occurred_at.timestamp_millis() as f64 / 1000.0;

        match &envelope.event {
            DomainEvent::RequestPlanned { request } => {
                self.param(run, "request_id", &request.id)?;
                self.param(run, "original_request", &request.original_request)?;
                self.param(run, "num_tasks", &request.tasks.len().to_string())?;
                self.param(run, "priority", request.priority.as_str())?;
                if let Some(due) = request.due_date {
                    self.param(run, "due_date", &due.to_string())?;
                }
                let snapshot = serde_json::to_value(request).context("serializing request")?;
                self.artifact_json(run, &format!("request_{}.json", request.id), &snapshot)?;
            }

            DomainEvent::TaskStarted {
                task_id,
                pending_task_count,
                in_progress_task_count,
            } => {
                self.param(run, &format!("task_{task_id}_started_at"), &at)?;
                self.metrics.log_metric(
                    run,
                    "context.pending_task_count",
                    *pending_task_count as f64,
                )?;
                self.metrics.log_metric(
                    run,
                    "context.in_progress_task_count",
                    *in_progress_task_count as f64,
                )?;
            }

            DomainEvent::ItemResolved {
                item,
                status,
                execution_time,
                details,
            } => {
                let succeeded = if *status == Status::Completed { 1.0 } else { 0.0 };
                self.metrics.log_task_metrics(
                    run,
                    &item.metric_scope(),
                    &[("execution_time", *execution_time), ("status", succeeded)],
                )?;
                if let Some(details) = details {
                    self.artifact_text(run, &format!("{}_details.txt", item.file_stem()), details)?;
                }
            }

            DomainEvent::ItemApproved {
                item,
                confidence_score,
                approval_role,
                ..
            } => {
                let auto = if *approval_role == ApprovalRole::Auto { 1.0 } else { 0.0 };
                self.metrics.log_task_metrics(
                    run,
                    &item.metric_scope(),
                    &[
                        ("approval_time", epoch),
                        ("confidence_score", *confidence_score),
                        ("auto_approved", auto),
                    ],
                )?;
            }

            DomainEvent::RequestCompleted { request, metrics } => {
                self.metrics.log_workflow_metrics(
                    run,
                    &[
                        ("total_execution_time", metrics.total_execution_time),
                        ("task_count", metrics.task_count as f64),
                        ("auto_approval_rate", metrics.auto_approval_rate),
                        ("error_rate", metrics.error_rate),
                        ("avg_task_time", metrics.avg_task_time),
                        ("success_rate", metrics.success_rate),
                    ],
                )?;
                self.param(run, "request_status", request.status.as_str())?;
                if let Some(completed_at) = request.completed_at {
                    self.param(run, "completed_at", &completed_at.to_rfc3339())?;
                }
                let snapshot = serde_json::to_value(request).context("serializing request")?;
                self.artifact_json(run, &format!("request_{}_final.json", request.id), &snapshot)?;
            }

            DomainEvent::TasksAdded { task_ids, .. } => {
                self.param(run, "tasks_added_at", &at)?;
                self.param(run, "tasks_added_count", &task_ids.len().to_string())?;
            }

            DomainEvent::SubtasksCreated {
                task_id,
                subtask_ids,
                ..
            } => {
                self.param(run, &format!("task_{task_id}_subtasks_created_at"), &at)?;
                self.param(
                    run,
                    &format!("task_{task_id}_subtasks_count"),
                    &subtask_ids.len().to_string(),
                )?;
            }

            DomainEvent::ItemUpdated { item } => {
                self.param(run, &format!("{}_updated_at", item.file_stem()), &at)?;
            }

            DomainEvent::ItemDeleted { item, .. } => {
                self.param(run, &format!("{}_deleted_at", item.file_stem()), &at)?;
            }

            DomainEvent::EventNotified {
                item,
                event,
                details,
                ..
            } => {
                let success = if *event == Event::Completed { 1.0 } else { 0.0 };
                self.metrics.log_task_metrics(
                    run,
                    &item.metric_scope(),
                    &[("event_time", epoch), ("event_success", success)],
                )?;
                if let Some(details) = details {
                    self.artifact_text(
                        run,
                        &format!("{}_event_details.txt", item.file_stem()),
                        details,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn param(&self, run: &str, key: &str, value: &str) -> anyhow::Result<()> {
        self.metrics.log_param(run, key, value)
    }

    fn artifact_text(&self, run: &str, name: &str, contents: &str) -> anyhow::Result<()> {
        let path = self.artifacts.write_text(name, contents)?;
        self.metrics.log_artifact(run, &path)
    }

    fn artifact_json(&self, run: &str, name: &str, data: &serde_json::Value) -> anyhow::Result<()> {
        let path = self.artifacts.write_json(name, data)?;
        self.metrics.log_artifact(run, &path)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}
