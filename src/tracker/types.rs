//! Record types owned by the lifecycle tracker.
//!
//! A [`Request`] owns an ordered list of [`Task`] ids and each task owns an
//! ordered list of [`Subtask`] ids. The hierarchy is fixed at two levels.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::TrackerError;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Scheduling priority of a request, task, or subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Numeric rank used by next-task selection. Higher runs first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Priority::High),
            "MEDIUM" => Ok(Priority::Medium),
            "LOW" => Ok(Priority::Low),
            other => Err(TrackerError::validation(format!(
                "Invalid priority: {other}. Must be one of: HIGH, MEDIUM, LOW"
            ))),
        }
    }
}

/// Lifecycle status shared by requests, tasks, and subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Status {
    /// COMPLETED and FAILED records reject update and delete.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
        }
    }

    /// Label used in the progress table.
    pub fn label(self) -> &'static str {
        match self {
            Status::Pending => "⏳ Pending",
            Status::InProgress => "🔄 In Progress",
            Status::Completed => "✅ Completed",
            Status::Failed => "❌ Failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Status::Pending),
            "IN_PROGRESS" => Ok(Status::InProgress),
            "COMPLETED" => Ok(Status::Completed),
            "FAILED" => Ok(Status::Failed),
            other => Err(TrackerError::validation(format!("Invalid status: {other}"))),
        }
    }
}

/// Out-of-band completion signal accepted by `notify_task_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Event {
    Completed,
    Failed,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Completed => "COMPLETED",
            Event::Failed => "FAILED",
        }
    }

    /// Status a target takes when this event is applied.
    pub fn status(self) -> Status {
        match self {
            Event::Completed => Status::Completed,
            Event::Failed => Status::Failed,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(Event::Completed),
            "FAILED" => Ok(Event::Failed),
            other => Err(TrackerError::validation(format!(
                "Invalid event: {other}. Must be one of: COMPLETED, FAILED"
            ))),
        }
    }
}

/// Who signed off on a completed task or subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalRole {
    Auto,
    Agent,
    Manager,
}

impl ApprovalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalRole::Auto => "AUTO",
            ApprovalRole::Agent => "AGENT",
            ApprovalRole::Manager => "MANAGER",
        }
    }
}

impl fmt::Display for ApprovalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Title and description for one task or subtask to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
}

impl TaskSpec {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Fields to overwrite on a task or subtask. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Workflow statistics computed when a request is finalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    /// Seconds between request creation and finalization.
    pub total_execution_time: f64,
    pub task_count: usize,
    /// Fraction of tasks approved with role AUTO.
    pub auto_approval_rate: f64,
    /// Fraction of tasks with status FAILED.
    pub error_rate: f64,
    /// Mean execution time over tasks with a positive execution time.
    pub avg_task_time: f64,
    pub success_rate: f64,
}

/// Top-level unit of work submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub original_request: String,
    pub split_details: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    /// Owned task ids in creation order.
    pub tasks: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub workflow_metrics: Option<WorkflowMetrics>,
    /// Creation order across the tracker, used to break timestamp ties.
    #[serde(skip)]
    pub(crate) sequence: u64,
}

/// Completion, failure, and approval bookkeeping shared by tasks and subtasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_details: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_details: Option<String>,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_role: Option<ApprovalRole>,
    pub confidence_score: Option<f64>,
}

/// A unit of work under a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub request_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub resolution: Resolution,
    /// Owned subtask ids in creation order.
    pub subtasks: Vec<String>,
}

/// Leaf unit of work under a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub task_id: String,
    pub request_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub resolution: Resolution,
}

/// Shared view over tasks and subtasks so transitions are written once.
pub(crate) trait WorkItem {
    fn status(&self) -> Status;
    fn set_status(&mut self, status: Status);
    fn created_at(&self) -> DateTime<Utc>;
    fn description(&self) -> &str;
    fn resolution(&self) -> &Resolution;
    fn resolution_mut(&mut self) -> &mut Resolution;
    fn apply_patch(&mut self, patch: &TaskPatch);

    /// Records a COMPLETED or FAILED outcome with its timestamp and details.
    fn resolve(&mut self, status: Status, details: Option<String>, at: DateTime<Utc>) {
        self.set_status(status);
        let resolution = self.resolution_mut();
        match status {
            Status::Failed => {
                resolution.failed_at = Some(at);
                resolution.failure_details = details;
            }
            _ => {
                resolution.completed_at = Some(at);
                resolution.completed_details = details;
            }
        }
    }

    /// Seconds from creation to completion, or 0 when not completed.
    fn execution_time(&self) -> f64 {
        match self.resolution().completed_at {
            Some(done) => (done - self.created_at()).num_milliseconds() as f64 / 1000.0,
            None => 0.0,
        }
    }
}

macro_rules! impl_work_item {
    ($ty:ty) => {
        impl WorkItem for $ty {
            fn status(&self) -> Status {
                self.status
            }

            fn set_status(&mut self, status: Status) {
                self.status = status;
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }

            fn description(&self) -> &str {
                &self.description
            }

            fn resolution(&self) -> &Resolution {
                &self.resolution
            }

            fn resolution_mut(&mut self) -> &mut Resolution {
                &mut self.resolution
            }

            fn apply_patch(&mut self, patch: &TaskPatch) {
                // Empty strings are treated as "not supplied".
                if let Some(title) = patch.title.as_deref().filter(|t| !t.is_empty()) {
                    self.title = title.to_string();
                }
                if let Some(description) = patch
                    .description
                    .as_deref()
                    .filter(|d| !d.is_empty())
                {
                    self.description = description.to_string();
                }
                if let Some(priority) = patch.priority {
                    self.priority = priority;
                }
                if let Some(due_date) = patch.due_date {
                    self.due_date = Some(due_date);
                }
            }
        }
    };
}

impl_work_item!(Task);
impl_work_item!(Subtask);

/// Parse a `YYYY-MM-DD` due date.
pub fn parse_due_date(raw: &str) -> Result<NaiveDate, TrackerError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        TrackerError::validation(format!("Invalid due date '{raw}': expected YYYY-MM-DD ({e})"))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let parsed: Status = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(parsed, Status::Failed);
        assert!(Status::Completed.is_terminal());
        assert!(!Status::InProgress.is_terminal());
    }

    #[test]
    fn test_event_parse_rejects_unknown() {
        assert_eq!("COMPLETED".parse::<Event>().unwrap(), Event::Completed);
        let err = "CANCELLED".parse::<Event>().unwrap_err();
        assert!(matches!(err, TrackerError::Validation { .. }));
        assert!(err.to_string().contains("CANCELLED"));
    }

    #[test]
    fn test_priority_parse_is_case_insensitive() {
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert!("URGENT".parse::<Priority>().is_err());
    }

    #[test]
    fn test_parse_due_date() {
        let date = parse_due_date("2024-01-01").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(parse_due_date("next tuesday").is_err());
    }
}
