//! Auto-approval confidence and end-of-workflow statistics.

use super::types::{ApprovalRole, Status, Task, WorkItem, WorkflowMetrics};

/// Default confidence at or above which approval is recorded as AUTO.
pub const DEFAULT_AUTO_DECISION_THRESHOLD: f64 = 0.75;

// Adjustments are kept in hundredths so that 0.70 + 0.10 - 0.05 lands on
// exactly 0.75 instead of drifting below the threshold.
const BASE_CONFIDENCE: i32 = 70;
const FAST_EXECUTION_SECS: f64 = 30.0;
const SLOW_EXECUTION_SECS: f64 = 300.0;
const SHORT_DESCRIPTION: usize = 50;
const LONG_DESCRIPTION: usize = 1000;

/// Confidence in `[0, 1]` that a completed item can be approved without review.
///
/// `execution_secs` is completion time minus creation time and
/// `description_len` is measured in characters.
pub fn approval_confidence(execution_secs: f64, description_len: usize) -> f64 {
    let time_factor = if execution_secs < FAST_EXECUTION_SECS {
        10
    } else if execution_secs > SLOW_EXECUTION_SECS {
        -10
    } else {
        0
    };

    let complexity_factor = if description_len < SHORT_DESCRIPTION {
        -5
    } else if description_len > LONG_DESCRIPTION {
        -10
    } else {
        5
    };

    // No history-based adjustment yet.
    let history_factor = 0;

    let hundredths = (BASE_CONFIDENCE + time_factor + complexity_factor + history_factor).clamp(0, 100);
    f64::from(hundredths) / 100.0
}

/// Confidence for a task or subtask record.
pub(crate) fn item_confidence<T: WorkItem>(item: &T) -> f64 {
    approval_confidence(item.execution_time(), item.description().chars().count())
}

/// AUTO when `confidence` reaches `threshold`, AGENT otherwise.
pub fn approval_role(confidence: f64, threshold: f64) -> ApprovalRole {
    if confidence >= threshold {
        ApprovalRole::Auto
    } else {
        ApprovalRole::Agent
    }
}

/// Statistics over a request's tasks, given its total wall-clock time.
pub(crate) fn workflow_metrics<'a>(
    total_execution_time: f64,
    tasks: impl IntoIterator<Item = &'a Task>,
) -> WorkflowMetrics {
    let mut task_count = 0usize;
    let mut auto_approved = 0usize;
    let mut errors = 0usize;
    let mut task_times = Vec::new();

    for task in tasks {
        task_count += 1;
        if task.resolution.approval_role == Some(ApprovalRole::Auto) {
            auto_approved += 1;
        }
        if task.status == Status::Failed {
            errors += 1;
        }
        let elapsed = task.execution_time();
        if elapsed > 0.0 {
            task_times.push(elapsed);
        }
    }

    let rate = |count: usize| {
        if task_count > 0 {
            count as f64 / task_count as f64
        } else {
            0.0
        }
    };
    let error_rate = rate(errors);
    let avg_task_time = if task_times.is_empty() {
        0.0
    } else {
        task_times.iter().sum::<f64>() / task_times.len() as f64
    };

    WorkflowMetrics {
        total_execution_time,
        task_count,
        auto_approval_rate: rate(auto_approved),
        error_rate,
        avg_task_time,
        success_rate: 1.0 - error_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, Utc};

    use crate::tracker::types::{Priority, Resolution};

    fn task(status: Status, elapsed_secs: Option<i64>, role: Option<ApprovalRole>) -> Task {
        let created_at = Utc::now();
        Task {
            id: "task-1".into(),
            request_id: "req-1".into(),
            title: "t".into(),
            description: "d".into(),
            priority: Priority::Medium,
            due_date: None,
            status,
            created_at,
            resolution: Resolution {
                completed_at: elapsed_secs.map(|s| created_at + Duration::seconds(s)),
                approved: role.is_some(),
                approval_role: role,
                ..Default::default()
            },
            subtasks: Vec::new(),
        }
    }

    #[test]
    fn test_fast_short_task_hits_threshold() {
        let confidence = approval_confidence(1.0, 2);
        assert_eq!(confidence, 0.75);
        assert_eq!(
            approval_role(confidence, DEFAULT_AUTO_DECISION_THRESHOLD),
            ApprovalRole::Auto
        );
    }

    #[test]
    fn test_confidence_adjustments() {
        // fast, mid-length description
        assert_eq!(approval_confidence(5.0, 200), 0.85);
        // middle band leaves time factor at zero
        assert_eq!(approval_confidence(120.0, 200), 0.75);
        // slow and very long description
        assert_eq!(approval_confidence(301.0, 1001), 0.5);
        // boundaries are inclusive on the neutral side
        assert_eq!(approval_confidence(30.0, 50), 0.75);
        assert_eq!(approval_confidence(300.0, 1000), 0.75);
        assert_eq!(
            approval_role(approval_confidence(400.0, 10), DEFAULT_AUTO_DECISION_THRESHOLD),
            ApprovalRole::Agent
        );
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        for secs in [-5.0, 0.0, 29.9, 30.0, 150.0, 300.0, 300.1, 1e9] {
            for len in [0usize, 49, 50, 500, 1000, 1001, 100_000] {
                let c = approval_confidence(secs, len);
                assert!((0.0..=1.0).contains(&c), "{c} out of range for {secs}s/{len}");
            }
        }
    }

    #[test]
    fn test_workflow_metrics() {
        let tasks = vec![
            task(Status::Completed, Some(10), Some(ApprovalRole::Auto)),
            task(Status::Completed, Some(30), Some(ApprovalRole::Agent)),
            task(Status::Failed, None, None),
            task(Status::Completed, Some(20), Some(ApprovalRole::Auto)),
        ];
        let metrics = workflow_metrics(100.0, &tasks);
        assert_eq!(metrics.task_count, 4);
        assert_eq!(metrics.total_execution_time, 100.0);
        assert_eq!(metrics.auto_approval_rate, 0.5);
        assert_eq!(metrics.error_rate, 0.25);
        assert_eq!(metrics.success_rate, 0.75);
        assert_eq!(metrics.avg_task_time, 20.0);
    }

    #[test]
    fn test_workflow_metrics_empty() {
        let metrics = workflow_metrics(0.0, Vec::<Task>::new().iter());
        assert_eq!(metrics.task_count, 0);
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(metrics.avg_task_time, 0.0);
    }
}
