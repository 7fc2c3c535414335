//! Mutating tracker operations: planning, scheduling, completion, approval,
//! editing, and out-of-band event notification.

use chrono::{NaiveDate, Utc};

use super::scoring::{approval_role, item_confidence, workflow_metrics};
use super::types::WorkItem;
use super::{
    fresh_id, validate_specs, AddTasksResponse, ApprovalResponse, DeleteResponse, Event,
    EventOverwritePolicy, EventResponse, MarkDoneResponse, NextTaskResponse, PlanResponse,
    Priority, Request, RequestApprovalResponse, Resolution, Status, Subtask, SubtaskSummary,
    SubtasksResponse, Task, TaskMaster, TaskPatch, TaskSpec, TaskSummary, TrackerError,
    TrackerResult, UpdateResponse,
};
use crate::events::{DomainEvent, ItemRef};

impl TaskMaster {
    /// Register a new request and create one PENDING task per spec.
    ///
    /// Tasks inherit the request's priority (default MEDIUM) and due date.
    pub fn request_planning(
        &mut self,
        original_request: &str,
        tasks: Vec<TaskSpec>,
        split_details: Option<String>,
        priority: Option<Priority>,
        due_date: Option<NaiveDate>,
    ) -> TrackerResult<PlanResponse> {
        if original_request.trim().is_empty() {
            return Err(TrackerError::validation("original_request must not be empty"));
        }
        validate_specs(&tasks, "task")?;

        let priority = priority.unwrap_or_default();
        let now = Utc::now();
        let request_id = fresh_id("req", &self.requests);
        let sequence = self.next_sequence();

        let mut request = Request {
            id: request_id.clone(),
            original_request: original_request.to_string(),
            split_details,
            priority,
            due_date,
            created_at: now,
            status: Status::Pending,
            tasks: Vec::with_capacity(tasks.len()),
            completed_at: None,
            workflow_metrics: None,
            sequence,
        };

        for spec in tasks {
            let task_id = self.insert_task(&request_id, spec, priority, due_date, now);
            request.tasks.push(task_id);
        }

        log::info!(
            "Planned request {} with {} tasks ({})",
            request_id,
            request.tasks.len(),
            priority
        );

        let snapshot = request.clone();
        let total_tasks = request.tasks.len();
        self.requests.insert(request_id.clone(), request);
        self.emit(&request_id, now, DomainEvent::RequestPlanned { request: snapshot });

        Ok(PlanResponse::Planned {
            tasks: self.task_summaries(&request_id),
            total_tasks,
            message: format!(
                "Tasks have been successfully added. Please use 'get_next_task' to retrieve the first task.\n\n{}",
                self.progress(&request_id)
            ),
            request_id,
        })
    }

    /// Pick the next PENDING task by priority, then due date, then creation
    /// order, and move it to IN_PROGRESS.
    pub fn get_next_task(&mut self, request_id: &str) -> TrackerResult<NextTaskResponse> {
        let request = self.request_ref(request_id)?;
        let owned: Vec<&Task> = request
            .tasks
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect();

        if owned.iter().all(|task| task.status == Status::Completed) {
            return Ok(NextTaskResponse::AllTasksDone {
                message: format!(
                    "All tasks for request {request_id} have been completed. Please use 'approve_request_completion' to finalize.\n\n{}",
                    self.progress(request_id)
                ),
            });
        }

        // `min_by_key` keeps the first of equal keys, so ties fall back to
        // creation order.
        let next_id = owned
            .iter()
            .filter(|task| task.status == Status::Pending)
            .min_by_key(|task| {
                (
                    std::cmp::Reverse(task.priority.rank()),
                    task.due_date.unwrap_or(NaiveDate::MAX),
                )
            })
            .map(|task| task.id.clone());

        let in_progress = owned
            .iter()
            .filter(|task| task.status == Status::InProgress)
            .count();
        let failed = owned
            .iter()
            .filter(|task| task.status == Status::Failed)
            .count();

        let Some(task_id) = next_id else {
            if in_progress > 0 {
                return Ok(NextTaskResponse::TasksInProgress {
                    in_progress,
                    message: format!(
                        "There are {in_progress} tasks in progress. Please await their completion or use 'mark_task_done'.\n\n{}",
                        self.progress(request_id)
                    ),
                });
            }
            log::warn!(
                "Request {} has no pending or running tasks but {} failed",
                request_id,
                failed
            );
            return Ok(NextTaskResponse::NoPendingTasks {
                failed,
                message: format!(
                    "No pending tasks found for request {request_id}; {failed} task(s) failed.\n\n{}",
                    self.progress(request_id)
                ),
            });
        };

        let now = Utc::now();
        let summary = match self.tasks.get_mut(&task_id) {
            Some(task) => {
                task.status = Status::InProgress;
                TaskSummary::from(&*task)
            }
            None => {
                return Err(TrackerError::TaskNotFound { task_id });
            }
        };

        let pending_task_count = self.count_status(Status::Pending);
        let in_progress_task_count = self.count_status(Status::InProgress);
        log::debug!("Request {} started task {}", request_id, task_id);
        self.emit(
            request_id,
            now,
            DomainEvent::TaskStarted {
                task_id,
                pending_task_count,
                in_progress_task_count,
            },
        );

        Ok(NextTaskResponse::NextTask {
            task: summary,
            message: format!(
                "Next task is ready. Task approval will be required after completion.\n\n{}",
                self.progress(request_id)
            ),
        })
    }

    /// Record a task or subtask as COMPLETED (default) or FAILED.
    ///
    /// Tasks that are already COMPLETED or FAILED answer `already_done` and
    /// are left untouched. Subtasks are overwritten unconditionally.
    pub fn mark_task_done(
        &mut self,
        request_id: &str,
        task_id: &str,
        subtask_id: Option<&str>,
        status: Option<Status>,
        completed_details: Option<String>,
    ) -> TrackerResult<MarkDoneResponse> {
        self.ensure_owned(request_id, task_id, subtask_id)?;

        let status = status.unwrap_or(Status::Completed);
        if !status.is_terminal() {
            return Err(TrackerError::validation(format!(
                "Invalid completion status: {status}. Must be one of: COMPLETED, FAILED"
            )));
        }

        let now = Utc::now();
        let execution_time = match subtask_id {
            Some(subtask_id) => {
                let subtask = self.subtask_mut(subtask_id)?;
                subtask.resolve(status, completed_details.clone(), now);
                subtask.execution_time()
            }
            None => {
                let task = self.task_mut(task_id)?;
                if task.status.is_terminal() {
                    return Ok(MarkDoneResponse::AlreadyDone {
                        current: task.status,
                        message: format!("Task is already marked {}.", task.status),
                    });
                }
                task.resolve(status, completed_details.clone(), now);
                task.execution_time()
            }
        };

        let item = ItemRef::new(task_id, subtask_id);
        log::info!("Marked {} as {}", item.metric_scope(), status);
        self.emit(
            request_id,
            now,
            DomainEvent::ItemResolved {
                item,
                status,
                execution_time,
                details: completed_details,
            },
        );

        let noun = if subtask_id.is_some() { "Subtask" } else { "Task" };
        Ok(MarkDoneResponse::TaskDone {
            task_id: task_id.to_string(),
            subtask_id: subtask_id.map(str::to_string),
            message: format!(
                "{noun} marked as {status}. Approval is required.\n\n{}",
                self.progress(request_id)
            ),
        })
    }

    /// Approve a COMPLETED task or subtask, scoring it for auto-approval.
    ///
    /// Approving the last unapproved subtask of a task also moves that task
    /// to COMPLETED.
    pub fn approve_task_completion(
        &mut self,
        request_id: &str,
        task_id: &str,
        subtask_id: Option<&str>,
    ) -> TrackerResult<ApprovalResponse> {
        self.ensure_owned(request_id, task_id, subtask_id)?;

        let threshold = self.auto_decision_threshold;
        let now = Utc::now();

        let (confidence_score, role) = match subtask_id {
            Some(subtask_id) => {
                let subtask = self.subtask_mut(subtask_id)?;
                if subtask.status != Status::Completed {
                    return Ok(not_completed("Subtask", subtask_id, subtask.status));
                }
                approve(subtask, threshold, now)
            }
            None => {
                let task = self.task_mut(task_id)?;
                if task.status != Status::Completed {
                    return Ok(not_completed("Task", task_id, task.status));
                }
                approve(task, threshold, now)
            }
        };

        let parent_completed = subtask_id.is_some() && self.complete_if_subtasks_approved(task_id)?;

        let item = ItemRef::new(task_id, subtask_id);
        log::info!(
            "Approved {} as {} (confidence {:.2})",
            item.metric_scope(),
            role,
            confidence_score
        );
        self.emit(
            request_id,
            now,
            DomainEvent::ItemApproved {
                item,
                confidence_score,
                approval_role: role,
                parent_completed,
            },
        );

        let noun = if subtask_id.is_some() { "Subtask" } else { "Task" };
        Ok(ApprovalResponse::Approved {
            task_id: task_id.to_string(),
            subtask_id: subtask_id.map(str::to_string),
            approval_role: role,
            confidence_score,
            parent_completed,
            message: format!(
                "{noun} approval completed with role {role}.\n\n{}",
                self.progress(request_id)
            ),
        })
    }

    /// Close a request once every task is COMPLETED and approved.
    pub fn approve_request_completion(
        &mut self,
        request_id: &str,
    ) -> TrackerResult<RequestApprovalResponse> {
        let request = self.request_ref(request_id)?;

        // Tasks may be added or re-notified after finalization, so the gate
        // is checked even for a COMPLETED request.
        let ready = request
            .tasks
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .all(|task| task.status == Status::Completed && task.resolution.approved);

        if !ready {
            return Ok(RequestApprovalResponse::Incomplete {
                message: format!(
                    "Not all tasks are completed and approved for request {request_id}.\n\n{}",
                    self.progress(request_id)
                ),
            });
        }

        if request.status == Status::Completed {
            if let Some(metrics) = request.workflow_metrics.clone() {
                return Ok(RequestApprovalResponse::Completed {
                    request_id: request_id.to_string(),
                    workflow_metrics: metrics,
                    message: format!(
                        "Request {request_id} was already completed.\n\n{}",
                        self.progress(request_id)
                    ),
                });
            }
        }

        let now = Utc::now();
        let total_execution_time =
            (now - request.created_at).num_milliseconds() as f64 / 1000.0;
        let metrics = workflow_metrics(
            total_execution_time,
            request.tasks.iter().filter_map(|id| self.tasks.get(id)),
        );

        let snapshot = match self.requests.get_mut(request_id) {
            Some(request) => {
                request.status = Status::Completed;
                request.completed_at = Some(now);
                request.workflow_metrics = Some(metrics.clone());
                request.clone()
            }
            None => {
                return Err(TrackerError::RequestNotFound {
                    request_id: request_id.to_string(),
                });
            }
        };

        log::info!(
            "Request {} completed: {} tasks, auto-approval rate {:.2}",
            request_id,
            metrics.task_count,
            metrics.auto_approval_rate
        );
        self.emit(
            request_id,
            now,
            DomainEvent::RequestCompleted {
                request: snapshot,
                metrics: metrics.clone(),
            },
        );

        Ok(RequestApprovalResponse::Completed {
            request_id: request_id.to_string(),
            workflow_metrics: metrics,
            message: format!(
                "Request {request_id} has been successfully completed and approved.\n\n{}",
                self.progress(request_id)
            ),
        })
    }

    /// Append PENDING tasks to an existing request. Priority and due date
    /// default to the request's own.
    pub fn add_tasks_to_request(
        &mut self,
        request_id: &str,
        tasks: Vec<TaskSpec>,
        priority: Option<Priority>,
        due_date: Option<NaiveDate>,
    ) -> TrackerResult<AddTasksResponse> {
        let request = self.request_ref(request_id)?;
        validate_specs(&tasks, "task")?;

        let priority = priority.unwrap_or(request.priority);
        let due_date = due_date.or(request.due_date);
        let now = Utc::now();

        let task_ids: Vec<String> = tasks
            .into_iter()
            .map(|spec| self.insert_task(request_id, spec, priority, due_date, now))
            .collect();
        let summaries: Vec<TaskSummary> = task_ids
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .map(TaskSummary::from)
            .collect();
        let total_tasks = match self.requests.get_mut(request_id) {
            Some(request) => {
                request.tasks.extend(task_ids.iter().cloned());
                request.tasks.len()
            }
            None => {
                return Err(TrackerError::RequestNotFound {
                    request_id: request_id.to_string(),
                });
            }
        };

        let added_tasks = task_ids.len();
        log::info!("Added {} tasks to request {}", added_tasks, request_id);
        self.emit(
            request_id,
            now,
            DomainEvent::TasksAdded {
                task_ids,
                total_tasks,
            },
        );

        Ok(AddTasksResponse::TasksAdded {
            request_id: request_id.to_string(),
            added_tasks,
            total_tasks,
            tasks: summaries,
            message: format!(
                "Added {added_tasks} new tasks to request {request_id}.\n\n{}",
                self.progress(request_id)
            ),
        })
    }

    /// Create PENDING subtasks under a task. Priority and due date default
    /// to the task's own.
    pub fn create_subtasks(
        &mut self,
        request_id: &str,
        task_id: &str,
        subtasks: Vec<TaskSpec>,
        priority: Option<Priority>,
        due_date: Option<NaiveDate>,
    ) -> TrackerResult<SubtasksResponse> {
        self.ensure_owned(request_id, task_id, None)?;
        validate_specs(&subtasks, "subtask")?;

        let now = Utc::now();
        let task = self.task_mut(task_id)?;
        let priority = priority.unwrap_or(task.priority);
        let due_date = due_date.or(task.due_date);

        let mut subtask_ids = Vec::with_capacity(subtasks.len());
        let mut summaries = Vec::with_capacity(subtasks.len());
        for spec in subtasks {
            let subtask = Subtask {
                id: fresh_id("subtask", &self.subtasks),
                task_id: task_id.to_string(),
                request_id: request_id.to_string(),
                title: spec.title,
                description: spec.description,
                priority,
                due_date,
                status: Status::Pending,
                created_at: now,
                resolution: Resolution::default(),
            };
            subtask_ids.push(subtask.id.clone());
            summaries.push(SubtaskSummary::from(&subtask));
            self.subtasks.insert(subtask.id.clone(), subtask);
        }

        let task = self.task_mut(task_id)?;
        task.subtasks.extend(subtask_ids.iter().cloned());
        let total_subtasks = task.subtasks.len();

        let count = subtask_ids.len();
        log::info!("Created {} subtasks for task {}", count, task_id);
        self.emit(
            request_id,
            now,
            DomainEvent::SubtasksCreated {
                task_id: task_id.to_string(),
                subtask_ids,
                priority,
            },
        );

        Ok(SubtasksResponse::SubtasksCreated {
            task_id: task_id.to_string(),
            subtasks: summaries,
            total_subtasks,
            message: format!(
                "Created {count} subtasks for task {task_id}.\n\n{}",
                self.progress(request_id)
            ),
        })
    }

    /// Overwrite the supplied fields of a task or subtask that is not yet
    /// COMPLETED or FAILED.
    pub fn update_task(
        &mut self,
        request_id: &str,
        task_id: &str,
        subtask_id: Option<&str>,
        patch: TaskPatch,
    ) -> TrackerResult<UpdateResponse> {
        self.ensure_owned(request_id, task_id, subtask_id)?;

        let target: &mut dyn WorkItem = match subtask_id {
            Some(subtask_id) => self.subtask_mut(subtask_id)?,
            None => self.task_mut(task_id)?,
        };
        let (noun, id) = describe(task_id, subtask_id);
        if target.status().is_terminal() {
            return Ok(UpdateResponse::CannotUpdate {
                message: format!("Cannot update completed or failed {noun} {id}."),
            });
        }
        target.apply_patch(&patch);

        let item = ItemRef::new(task_id, subtask_id);
        log::debug!("Updated {}", item.metric_scope());
        self.emit(request_id, Utc::now(), DomainEvent::ItemUpdated { item });

        Ok(UpdateResponse::Updated {
            task_id: task_id.to_string(),
            subtask_id: subtask_id.map(str::to_string),
            message: format!(
                "{} {id} updated successfully.\n\n{}",
                capitalize(noun),
                self.progress(request_id)
            ),
        })
    }

    /// Delete a task (with all of its subtasks) or a single subtask, unless
    /// it is COMPLETED or FAILED.
    pub fn delete_task(
        &mut self,
        request_id: &str,
        task_id: &str,
        subtask_id: Option<&str>,
    ) -> TrackerResult<DeleteResponse> {
        self.ensure_owned(request_id, task_id, subtask_id)?;

        let (noun, id) = describe(task_id, subtask_id);
        let status = match subtask_id {
            Some(subtask_id) => self.subtask_mut(subtask_id)?.status,
            None => self.task_mut(task_id)?.status,
        };
        if status.is_terminal() {
            return Ok(DeleteResponse::CannotDelete {
                message: format!("Cannot delete completed or failed {noun} {id}."),
            });
        }

        let removed_subtasks = match subtask_id {
            Some(subtask_id) => {
                self.task_mut(task_id)?.subtasks.retain(|s| s != subtask_id);
                self.subtasks.remove(subtask_id);
                0
            }
            None => {
                let task = self.tasks.remove(task_id).ok_or_else(|| {
                    TrackerError::TaskNotFound {
                        task_id: task_id.to_string(),
                    }
                })?;
                if let Some(request) = self.requests.get_mut(request_id) {
                    request.tasks.retain(|t| t != task_id);
                }
                task.subtasks
                    .iter()
                    .filter(|id| self.subtasks.remove(*id).is_some())
                    .count()
            }
        };

        let item = ItemRef::new(task_id, subtask_id);
        log::info!(
            "Deleted {} ({} subtasks cascaded)",
            item.metric_scope(),
            removed_subtasks
        );
        self.emit(
            request_id,
            Utc::now(),
            DomainEvent::ItemDeleted {
                item,
                removed_subtasks,
            },
        );

        let message = match subtask_id {
            Some(_) => format!("Subtask {id} deleted successfully."),
            None => format!("Task {id} and its subtasks deleted successfully."),
        };
        Ok(DeleteResponse::Deleted {
            task_id: task_id.to_string(),
            subtask_id: subtask_id.map(str::to_string),
            message: format!("{message}\n\n{}", self.progress(request_id)),
        })
    }

    /// Apply an asynchronous COMPLETED/FAILED signal to a task or subtask.
    ///
    /// Under the default [`EventOverwritePolicy::Overwrite`] the status is set
    /// regardless of what it was, including over an approved result.
    pub fn notify_task_event(
        &mut self,
        request_id: &str,
        task_id: &str,
        event: Event,
        subtask_id: Option<&str>,
        completed_details: Option<String>,
    ) -> TrackerResult<EventResponse> {
        self.ensure_owned(request_id, task_id, subtask_id)?;

        let policy = self.event_policy;
        let now = Utc::now();
        let (noun, id) = describe(task_id, subtask_id);

        let target: &mut dyn WorkItem = match subtask_id {
            Some(subtask_id) => self.subtask_mut(subtask_id)?,
            None => self.task_mut(task_id)?,
        };
        let current = target.status();
        if policy == EventOverwritePolicy::RejectTerminal && current.is_terminal() {
            return Ok(EventResponse::EventRejected {
                current,
                message: format!("Event {event} rejected: {noun} {id} is already {current}."),
            });
        }

        let overwrote_approved = target.resolution().approved;
        target.resolve(event.status(), completed_details.clone(), now);

        if overwrote_approved {
            log::warn!(
                "Event {} overwrote approved {} {} (was {})",
                event,
                noun,
                id,
                current
            );
        }

        self.emit(
            request_id,
            now,
            DomainEvent::EventNotified {
                item: ItemRef::new(task_id, subtask_id),
                event,
                details: completed_details,
                overwrote_approved,
            },
        );

        Ok(EventResponse::EventProcessed {
            task_id: task_id.to_string(),
            subtask_id: subtask_id.map(str::to_string),
            event,
            message: format!(
                "Event {event} processed for {noun} {id}.\n\n{}",
                self.progress(request_id)
            ),
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn task_mut(&mut self, task_id: &str) -> TrackerResult<&mut Task> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| TrackerError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    fn subtask_mut(&mut self, subtask_id: &str) -> TrackerResult<&mut Subtask> {
        self.subtasks
            .get_mut(subtask_id)
            .ok_or_else(|| TrackerError::SubtaskNotFound {
                subtask_id: subtask_id.to_string(),
            })
    }

    fn task_summaries(&self, request_id: &str) -> Vec<TaskSummary> {
        self.requests
            .get(request_id)
            .map(|request| {
                request
                    .tasks
                    .iter()
                    .filter_map(|id| self.tasks.get(id))
                    .map(TaskSummary::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn count_status(&self, status: Status) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    /// Create a PENDING task under a fresh id and store it. Returns the id.
    fn insert_task(
        &mut self,
        request_id: &str,
        spec: TaskSpec,
        priority: Priority,
        due_date: Option<NaiveDate>,
        created_at: chrono::DateTime<Utc>,
    ) -> String {
        let id = fresh_id("task", &self.tasks);
        let task = Task {
            id: id.clone(),
            request_id: request_id.to_string(),
            title: spec.title,
            description: spec.description,
            priority,
            due_date,
            status: Status::Pending,
            created_at,
            resolution: Resolution::default(),
            subtasks: Vec::new(),
        };
        self.tasks.insert(id.clone(), task);
        id
    }

    /// Move a task to COMPLETED once it has subtasks and all are approved.
    /// Returns whether the task changed.
    fn complete_if_subtasks_approved(&mut self, task_id: &str) -> TrackerResult<bool> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| TrackerError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        let all_approved = !task.subtasks.is_empty()
            && task.subtasks.iter().all(|id| {
                self.subtasks
                    .get(id)
                    .is_some_and(|subtask| subtask.resolution.approved)
            });

        if !all_approved || task.status == Status::Completed {
            return Ok(false);
        }

        let task = self.task_mut(task_id)?;
        task.status = Status::Completed;
        task.resolution.completed_at = Some(Utc::now());
        log::info!("Task {} completed: all subtasks approved", task_id);
        Ok(true)
    }
}


/// Score a COMPLETED item and record its approval.
fn approve<T: WorkItem>(
    item: &mut T,
    threshold: f64,
    at: chrono::DateTime<Utc>,
) -> (f64, super::ApprovalRole) {
    let confidence = item_confidence(&*item);
    let role = approval_role(confidence, threshold);
    let resolution = item.resolution_mut();
    resolution.approved = true;
    resolution.approved_at = Some(at);
    resolution.approval_role = Some(role);
    resolution.confidence_score = Some(confidence);
    (confidence, role)
}

fn not_completed(noun: &str, id: &str, current: Status) -> ApprovalResponse {
    ApprovalResponse::NotCompleted {
        current,
        message: format!("{noun} {id} is not marked as completed. Current status: {current}"),
    }
}

fn describe<'a>(task_id: &'a str, subtask_id: Option<&'a str>) -> (&'static str, &'a str) {
    match subtask_id {
        Some(subtask_id) => ("subtask", subtask_id),
        None => ("task", task_id),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
