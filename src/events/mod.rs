//! Domain events emitted by the lifecycle tracker.
//!
//! Every mutating tracker operation appends one [`EventEnvelope`] to an
//! [`Outbox`] instead of calling the metrics and artifact collaborators
//! inline. The [`dispatcher::EventDispatcher`] drains those envelopes and
//! drives the collaborators, so a slow or failing sink never affects
//! in-memory state.

pub mod dispatcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::types::{ApprovalRole, Event, Priority, Request, Status, WorkflowMetrics};

pub use dispatcher::EventDispatcher;

/// Identifies the task or subtask an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemRef {
    Task { task_id: String },
    Subtask { task_id: String, subtask_id: String },
}

impl ItemRef {
    pub fn new(task_id: &str, subtask_id: Option<&str>) -> Self {
        match subtask_id {
            Some(subtask_id) => Self::Subtask {
                task_id: task_id.to_string(),
                subtask_id: subtask_id.to_string(),
            },
            None => Self::Task {
                task_id: task_id.to_string(),
            },
        }
    }

    /// Prefix for per-item metric keys: `task-x` or `task-x.subtask-y`.
    pub fn metric_scope(&self) -> String {
        match self {
            Self::Task { task_id } => task_id.clone(),
            Self::Subtask {
                task_id,
                subtask_id,
            } => format!("{task_id}.{subtask_id}"),
        }
    }

    /// Stem for per-item parameter and artifact names: `task_x` or `subtask_y`.
    pub fn file_stem(&self) -> String {
        match self {
            Self::Task { task_id } => format!("task_{task_id}"),
            Self::Subtask { subtask_id, .. } => format!("subtask_{subtask_id}"),
        }
    }
}

/// What happened, with enough captured state for the collaborators to log it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    RequestPlanned {
        /// Snapshot taken at creation.
        request: Request,
    },
    TaskStarted {
        task_id: String,
        pending_task_count: usize,
        in_progress_task_count: usize,
    },
    ItemResolved {
        item: ItemRef,
        status: Status,
        execution_time: f64,
        details: Option<String>,
    },
    ItemApproved {
        item: ItemRef,
        confidence_score: f64,
        approval_role: ApprovalRole,
        parent_completed: bool,
    },
    RequestCompleted {
        /// Snapshot taken at finalization.
        request: Request,
        metrics: WorkflowMetrics,
    },
    TasksAdded {
        task_ids: Vec<String>,
        total_tasks: usize,
    },
    SubtasksCreated {
        task_id: String,
        subtask_ids: Vec<String>,
        priority: Priority,
    },
    ItemUpdated {
        item: ItemRef,
    },
    ItemDeleted {
        item: ItemRef,
        removed_subtasks: usize,
    },
    EventNotified {
        item: ItemRef,
        event: Event,
        details: Option<String>,
        /// The target had already been approved before this event landed.
        overwrote_approved: bool,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestPlanned { .. } => "request_planned",
            Self::TaskStarted { .. } => "task_started",
            Self::ItemResolved { .. } => "item_resolved",
            Self::ItemApproved { .. } => "item_approved",
            Self::RequestCompleted { .. } => "request_completed",
            Self::TasksAdded { .. } => "tasks_added",
            Self::SubtasksCreated { .. } => "subtasks_created",
            Self::ItemUpdated { .. } => "item_updated",
            Self::ItemDeleted { .. } => "item_deleted",
            Self::EventNotified { .. } => "event_notified",
        }
    }
}

/// A domain event stamped with its request scope and emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Monotonic per-tracker sequence number.
    pub sequence: u64,
    /// Run scope for the metrics sink.
    pub request_id: String,
    pub occurred_at: DateTime<Utc>,
    pub event: DomainEvent,
}

/// Queue of events not yet handed to the dispatcher.
#[derive(Debug, Default)]
pub struct Outbox {
    next_sequence: u64,
    pending: Vec<EventEnvelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request_id: &str, occurred_at: DateTime<Utc>, event: DomainEvent) {
        log::debug!("outbox: {} for {}", event.name(), request_id);
        self.pending.push(EventEnvelope {
            sequence: self.next_sequence,
            request_id: request_id.to_string(),
            occurred_at,
            event,
        });
        self.next_sequence += 1;
    }

    /// Take every queued envelope, oldest first.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ref_naming() {
        let task = ItemRef::new("task-1", None);
        assert_eq!(task.metric_scope(), "task-1");
        assert_eq!(task.file_stem(), "task_task-1");

        let sub = ItemRef::new("task-1", Some("subtask-2"));
        assert_eq!(sub.metric_scope(), "task-1.subtask-2");
        assert_eq!(sub.file_stem(), "subtask_subtask-2");
    }

    #[test]
    fn test_outbox_sequences_and_drains() {
        let mut outbox = Outbox::new();
        let now = Utc::now();
        outbox.push("req-1", now, DomainEvent::ItemUpdated { item: ItemRef::new("t", None) });
        outbox.push("req-1", now, DomainEvent::ItemUpdated { item: ItemRef::new("u", None) });
        assert_eq!(outbox.len(), 2);

        let drained = outbox.drain();
        assert!(outbox.is_empty());
        assert_eq!(drained[0].sequence, 0);
        assert_eq!(drained[1].sequence, 1);

        outbox.push("req-2", now, DomainEvent::ItemUpdated { item: ItemRef::new("v", None) });
        assert_eq!(outbox.drain()[0].sequence, 2);
    }
}
