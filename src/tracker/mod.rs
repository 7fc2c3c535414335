//! In-memory request → task → subtask lifecycle tracker.
//!
//! [`TaskMaster`] owns three keyed maps (requests, tasks, subtasks) that are
//! the entire mutable state. Operations are plain `&mut self` methods; wrap
//! the tracker in [`shared::SharedTaskMaster`] when more than one caller can
//! reach it.
//!
//! # Lifecycle
//!
//! 1. `request_planning` creates a request and its PENDING tasks.
//! 2. `get_next_task` moves the highest-priority PENDING task to IN_PROGRESS.
//! 3. `mark_task_done` (or `notify_task_event`) records COMPLETED/FAILED.
//! 4. `approve_task_completion` scores the result and records approval.
//! 5. `approve_request_completion` closes the request once every task is
//!    COMPLETED and approved.

pub mod error;
pub mod lifecycle;
pub mod progress;
pub mod responses;
pub mod scoring;
pub mod shared;
pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{DomainEvent, EventEnvelope, Outbox};

pub use error::{TrackerError, TrackerResult};
pub use responses::*;
pub use shared::SharedTaskMaster;
pub use types::{
    ApprovalRole, Event, Priority, Request, Resolution, Status, Subtask, Task, TaskPatch, TaskSpec,
    WorkflowMetrics,
};

/// What `notify_task_event` does when its target is already COMPLETED or FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOverwritePolicy {
    /// Apply the event regardless of the current status.
    #[default]
    Overwrite,
    /// Answer `event_rejected` and leave the target untouched.
    RejectTerminal,
}

impl fmt::Display for EventOverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => f.write_str("overwrite"),
            Self::RejectTerminal => f.write_str("reject_terminal"),
        }
    }
}

impl FromStr for EventOverwritePolicy {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "reject_terminal" => Ok(Self::RejectTerminal),
            other => Err(TrackerError::validation(format!(
                "Invalid event policy: {other}. Must be one of: overwrite, reject_terminal"
            ))),
        }
    }
}

/// Owner of all request, task, and subtask records.
#[derive(Debug)]
pub struct TaskMaster {
    pub(crate) requests: HashMap<String, Request>,
    pub(crate) tasks: HashMap<String, Task>,
    pub(crate) subtasks: HashMap<String, Subtask>,
    /// Confidence at or above which approvals are recorded as AUTO.
    auto_decision_threshold: f64,
    event_policy: EventOverwritePolicy,
    outbox: Outbox,
    next_request_sequence: u64,
}

impl TaskMaster {
    /// Create an empty tracker with the default threshold and event policy.
    pub fn new() -> Self {
        Self {
            requests: HashMap::new(),
            tasks: HashMap::new(),
            subtasks: HashMap::new(),
            auto_decision_threshold: scoring::DEFAULT_AUTO_DECISION_THRESHOLD,
            event_policy: EventOverwritePolicy::default(),
            outbox: Outbox::new(),
            next_request_sequence: 0,
        }
    }

    pub fn with_auto_decision_threshold(mut self, threshold: f64) -> Self {
        self.auto_decision_threshold = threshold;
        self
    }

    pub fn with_event_policy(mut self, policy: EventOverwritePolicy) -> Self {
        self.event_policy = policy;
        self
    }

    pub fn auto_decision_threshold(&self) -> f64 {
        self.auto_decision_threshold
    }

    pub fn event_policy(&self) -> EventOverwritePolicy {
        self.event_policy
    }

    pub fn request(&self, request_id: &str) -> Option<&Request> {
        self.requests.get(request_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn subtask(&self, subtask_id: &str) -> Option<&Subtask> {
        self.subtasks.get(subtask_id)
    }

    /// Take the domain events queued since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<EventEnvelope> {
        self.outbox.drain()
    }

    /// Markdown progress table for a request.
    pub fn progress_table(&self, request_id: &str) -> TrackerResult<String> {
        let request = self.request_ref(request_id)?;
        Ok(progress::render_progress_table(request, &self.tasks))
    }

    /// Full task record plus its subtasks.
    pub fn open_task_details(&self, task_id: &str) -> TrackerResult<TaskDetails> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| TrackerError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        let subtasks_data = task
            .subtasks
            .iter()
            .filter_map(|id| self.subtasks.get(id))
            .cloned()
            .collect();

        Ok(TaskDetails {
            task: task.clone(),
            subtasks_data,
        })
    }

    /// Every request with per-status task counts, newest first.
    pub fn list_requests(&self) -> RequestList {
        let mut ordered: Vec<&Request> = self.requests.values().collect();
        ordered.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        let requests: Vec<RequestSummary> = ordered
            .into_iter()
            .map(|request| {
                let mut task_summary = StatusCounts::default();
                for task in request.tasks.iter().filter_map(|id| self.tasks.get(id)) {
                    task_summary.record(task.status);
                }
                RequestSummary {
                    id: request.id.clone(),
                    status: request.status,
                    created_at: request.created_at,
                    completed_at: request.completed_at,
                    priority: request.priority,
                    due_date: request.due_date,
                    task_summary,
                    total_tasks: request.tasks.len(),
                }
            })
            .collect();

        RequestList {
            total_requests: requests.len(),
            requests,
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn request_ref(&self, request_id: &str) -> TrackerResult<&Request> {
        self.requests
            .get(request_id)
            .ok_or_else(|| TrackerError::RequestNotFound {
                request_id: request_id.to_string(),
            })
    }

    /// Check that the request exists, that it owns the task, and that the
    /// task owns the subtask when one is given.
    fn ensure_owned(
        &self,
        request_id: &str,
        task_id: &str,
        subtask_id: Option<&str>,
    ) -> TrackerResult<()> {
        self.request_ref(request_id)?;

        let task_missing = || TrackerError::TaskNotFound {
            task_id: task_id.to_string(),
        };
        let task = self.tasks.get(task_id).ok_or_else(task_missing)?;
        if task.request_id != request_id {
            return Err(task_missing());
        }

        if let Some(subtask_id) = subtask_id {
            let subtask_missing = || TrackerError::SubtaskNotFound {
                subtask_id: subtask_id.to_string(),
            };
            let subtask = self.subtasks.get(subtask_id).ok_or_else(subtask_missing)?;
            if subtask.task_id != task_id {
                return Err(subtask_missing());
            }
        }
        Ok(())
    }

    fn progress(&self, request_id: &str) -> String {
        match self.requests.get(request_id) {
            Some(request) => progress::render_progress_table(request, &self.tasks),
            None => "Request not found".to_string(),
        }
    }

    fn emit(&mut self, request_id: &str, at: DateTime<Utc>, event: DomainEvent) {
        self.outbox.push(request_id, at, event);
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_request_sequence;
        self.next_request_sequence += 1;
        sequence
    }
}

impl Default for TaskMaster {
    fn default() -> Self {
        Self::new()
    }
}

/// `{prefix}-` followed by the first 8 hex digits of a v4 UUID, regenerated
/// until it is not a key of `taken`.
pub(crate) fn fresh_id<V>(prefix: &str, taken: &HashMap<String, V>) -> String {
    fresh_id_from(prefix, taken, Uuid::new_v4)
}

fn fresh_id_from<V>(
    prefix: &str,
    taken: &HashMap<String, V>,
    mut next_uuid: impl FnMut() -> Uuid,
) -> String {
    loop {
        let uuid = next_uuid().simple().to_string();
        let id = format!("{prefix}-{}", &uuid[..8]);
        if !taken.contains_key(&id) {
            return id;
        }
        log::debug!("Id {} already taken; regenerating", id);
    }
}

/// Reject empty spec lists and specs with a blank title or description.
pub(crate) fn validate_specs(specs: &[TaskSpec], what: &str) -> TrackerResult<()> {
    if specs.is_empty() {
        return Err(TrackerError::validation(format!(
            "At least one {what} is required"
        )));
    }
    for (index, spec) in specs.iter().enumerate() {
        if spec.title.trim().is_empty() {
            return Err(TrackerError::validation(format!(
                "{what} #{} is missing a title",
                index + 1
            )));
        }
        if spec.description.trim().is_empty() {
            return Err(TrackerError::validation(format!(
                "{what} #{} is missing a description",
                index + 1
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_id_shape() {
        let taken: HashMap<String, ()> = HashMap::new();
        let id = fresh_id("req", &taken);
        assert!(id.starts_with("req-"));
        assert_eq!(id.len(), "req-".len() + 8);
        assert_ne!(fresh_id("req", &taken), fresh_id("req", &taken));
    }

    #[test]
    fn test_fresh_id_skips_taken_keys() {
        let mut uuids = vec![
            Uuid::from_u128(0x2222_2222_0000_0000_0000_0000_0000_0002),
            Uuid::from_u128(0x1111_1111_0000_0000_0000_0000_0000_0001),
            Uuid::from_u128(0x1111_1111_ffff_0000_0000_0000_0000_0000),
        ];
        let mut taken = HashMap::new();
        taken.insert("task-11111111".to_string(), ());

        let id = fresh_id_from("task", &taken, || uuids.pop().unwrap());
        assert_eq!(id, "task-22222222");
        assert!(uuids.is_empty());
    }

    #[test]
    fn test_validate_specs() {
        assert!(validate_specs(&[TaskSpec::new("T", "D")], "task").is_ok());
        assert!(validate_specs(&[], "task").is_err());
        let err = validate_specs(&[TaskSpec::new("T", "D"), TaskSpec::new(" ", "D")], "task")
            .unwrap_err();
        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn test_event_policy_parse() {
        assert_eq!(
            "reject_terminal".parse::<EventOverwritePolicy>().unwrap(),
            EventOverwritePolicy::RejectTerminal
        );
        assert!("sometimes".parse::<EventOverwritePolicy>().is_err());
        assert_eq!(EventOverwritePolicy::default().to_string(), "overwrite");
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let tracker = TaskMaster::new();
        assert!(tracker.open_task_details("task-missing").unwrap_err().is_not_found());
        assert!(matches!(
            tracker.progress_table("req-missing"),
            Err(TrackerError::RequestNotFound { .. })
        ));
        assert_eq!(tracker.list_requests().total_requests, 0);
    }
}
