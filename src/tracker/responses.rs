//! Response shapes returned by tracker operations.
//!
//! Every response serializes with a `status` tag. Workflow conflicts such as
//! `cannot_update` or `not_completed` are variants here, not errors.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{ApprovalRole, Event, Priority, Status, Subtask, Task, WorkflowMetrics};

/// Display summary of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub subtasks_count: usize,
    pub approved: bool,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            subtasks_count: task.subtasks.len(),
            approved: task.resolution.approved,
        }
    }
}

/// Display summary of a subtask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub approved: bool,
}

impl From<&Subtask> for SubtaskSummary {
    fn from(subtask: &Subtask) -> Self {
        Self {
            id: subtask.id.clone(),
            title: subtask.title.clone(),
            description: subtask.description.clone(),
            status: subtask.status,
            approved: subtask.resolution.approved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanResponse {
    Planned {
        request_id: String,
        total_tasks: usize,
        tasks: Vec<TaskSummary>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NextTaskResponse {
    /// Every task is COMPLETED; the caller should finalize the request.
    AllTasksDone { message: String },
    /// A PENDING task was selected and moved to IN_PROGRESS.
    NextTask { task: TaskSummary, message: String },
    /// Nothing pending, but work is still running.
    TasksInProgress { in_progress: usize, message: String },
    /// Nothing pending or running, yet not everything is COMPLETED.
    /// Reached when the remaining tasks are FAILED.
    NoPendingTasks { failed: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarkDoneResponse {
    TaskDone {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtask_id: Option<String>,
        message: String,
    },
    AlreadyDone { current: Status, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApprovalResponse {
    Approved {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtask_id: Option<String>,
        approval_role: ApprovalRole,
        confidence_score: f64,
        /// Set when this approval completed the parent task.
        parent_completed: bool,
        message: String,
    },
    NotCompleted { current: Status, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestApprovalResponse {
    Completed {
        request_id: String,
        workflow_metrics: WorkflowMetrics,
        message: String,
    },
    Incomplete { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddTasksResponse {
    TasksAdded {
        request_id: String,
        added_tasks: usize,
        total_tasks: usize,
        tasks: Vec<TaskSummary>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubtasksResponse {
    SubtasksCreated {
        task_id: String,
        subtasks: Vec<SubtaskSummary>,
        total_subtasks: usize,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateResponse {
    Updated {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtask_id: Option<String>,
        message: String,
    },
    CannotUpdate { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteResponse {
    Deleted {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtask_id: Option<String>,
        message: String,
    },
    CannotDelete { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventResponse {
    EventProcessed {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtask_id: Option<String>,
        event: Event,
        message: String,
    },
    /// Only produced under `EventOverwritePolicy::RejectTerminal`.
    EventRejected { current: Status, message: String },
}

/// Full task record plus its subtask records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    #[serde(flatten)]
    pub task: Task,
    pub subtasks_data: Vec<Subtask>,
}

/// Per-status task counts for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pending => self.pending += 1,
            Status::InProgress => self.in_progress += 1,
            Status::Completed => self.completed += 1,
            Status::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub id: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub task_summary: StatusCounts,
    pub total_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestList {
    /// Newest first.
    pub requests: Vec<RequestSummary>,
    pub total_requests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_serializes_with_status_tag() {
        let resp = UpdateResponse::CannotUpdate {
            message: "Cannot update completed or failed task task-1.".into(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "cannot_update");
    }

    #[test]
    fn test_subtask_id_omitted_for_tasks() {
        let resp = MarkDoneResponse::TaskDone {
            task_id: "task-1".into(),
            subtask_id: None,
            message: String::new(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "task_done");
        assert!(json.get("subtask_id").is_none());
    }

    #[test]
    fn test_status_counts_wire_keys() {
        let mut counts = StatusCounts::default();
        counts.record(Status::InProgress);
        counts.record(Status::Failed);
        let json = serde_json::to_value(counts).unwrap();
        assert_eq!(json["IN_PROGRESS"], 1);
        assert_eq!(json["FAILED"], 1);
        assert_eq!(json["PENDING"], 0);
    }
}
