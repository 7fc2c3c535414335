//! Tracker operations packaged as agent-callable tools.
//!
//! Each tool deserializes its JSON arguments, runs one operation against a
//! [`SharedTaskMaster`], and returns the serialized response.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use super::base_tool::{parse_args, to_json, tool_fn, BaseTool, Tool};
use crate::tracker::types::parse_due_date;
use crate::tracker::{Event, Priority, SharedTaskMaster, Status, TaskPatch, TaskSpec, TrackerResult};

// ---------------------------------------------------------------------------
// Argument structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PlanArgs {
    original_request: String,
    tasks: Vec<TaskSpec>,
    #[serde(default)]
    split_details: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestArgs {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskIdArgs {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct ItemArgs {
    request_id: String,
    task_id: String,
    #[serde(default)]
    subtask_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarkDoneArgs {
    request_id: String,
    task_id: String,
    #[serde(default)]
    subtask_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    completed_details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddTasksArgs {
    request_id: String,
    tasks: Vec<TaskSpec>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    request_id: String,
    task_id: String,
    #[serde(default)]
    subtask_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateSubtasksArgs {
    request_id: String,
    task_id: String,
    subtasks: Vec<TaskSpec>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotifyArgs {
    request_id: String,
    task_id: String,
    event: String,
    #[serde(default)]
    subtask_id: Option<String>,
    #[serde(default)]
    completed_details: Option<String>,
}

fn priority(raw: Option<&str>) -> TrackerResult<Option<Priority>> {
    raw.map(str::parse).transpose()
}

fn due_date(raw: Option<&str>) -> TrackerResult<Option<NaiveDate>> {
    raw.map(parse_due_date).transpose()
}

fn status(raw: Option<&str>) -> TrackerResult<Option<Status>> {
    raw.map(str::parse).transpose()
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

fn spec_list_schema(what: &str) -> Value {
    json!({
        "type": "array",
        "description": format!("{what} to create, in order"),
        "minItems": 1,
        "items": {
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "description": { "type": "string" },
            },
            "required": ["title", "description"],
        },
    })
}

fn priority_schema() -> Value {
    json!({ "type": "string", "enum": ["HIGH", "MEDIUM", "LOW"] })
}

fn due_date_schema() -> Value {
    json!({ "type": "string", "format": "date", "description": "YYYY-MM-DD" })
}

fn item_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert("request_id".into(), json!({ "type": "string" }));
    props.insert("task_id".into(), json!({ "type": "string" }));
    props.insert(
        "subtask_id".into(),
        json!({ "type": "string", "description": "Target a subtask of task_id instead of the task" }),
    );
    props
}

fn object_schema(properties: serde_json::Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

// ---------------------------------------------------------------------------
// Tool constructors
// ---------------------------------------------------------------------------

/// Every tracker tool, bound to `tracker`.
pub fn taskmaster_tools(tracker: &SharedTaskMaster) -> Vec<Arc<dyn BaseTool>> {
    vec![
        request_planning(tracker.clone()),
        get_next_task(tracker.clone()),
        mark_task_done(tracker.clone()),
        approve_task_completion(tracker.clone()),
        approve_request_completion(tracker.clone()),
        open_task_details(tracker.clone()),
        list_requests(tracker.clone()),
        add_tasks_to_request(tracker.clone()),
        update_task(tracker.clone()),
        delete_task(tracker.clone()),
        create_subtasks(tracker.clone()),
        notify_task_event(tracker.clone()),
    ]
}

fn request_planning(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "request_planning";
    let mut props = serde_json::Map::new();
    props.insert("original_request".into(), json!({ "type": "string" }));
    props.insert("tasks".into(), spec_list_schema("Tasks"));
    props.insert("split_details".into(), json!({ "type": "string" }));
    props.insert("priority".into(), priority_schema());
    props.insert("due_date".into(), due_date_schema());

    Arc::new(
        Tool::new(
            NAME,
            "Register a new request and plan its tasks. Returns the request id and a progress table.",
            tool_fn(move |args| {
                let args: PlanArgs = parse_args(NAME, args)?;
                let priority = priority(args.priority.as_deref())?;
                let due = due_date(args.due_date.as_deref())?;
                let resp = tracker.with(|tm| {
                    tm.request_planning(&args.original_request, args.tasks, args.split_details, priority, due)
                })?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(props, &["original_request", "tasks"])),
    )
}

fn get_next_task(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "get_next_task";
    let mut props = serde_json::Map::new();
    props.insert("request_id".into(), json!({ "type": "string" }));

    Arc::new(
        Tool::new(
            NAME,
            "Start the highest-priority pending task of a request.",
            tool_fn(move |args| {
                let args: RequestArgs = parse_args(NAME, args)?;
                let resp = tracker.with(|tm| tm.get_next_task(&args.request_id))?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(props, &["request_id"])),
    )
}

fn mark_task_done(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "mark_task_done";
    let mut props = item_properties();
    props.insert(
        "status".into(),
        json!({ "type": "string", "enum": ["COMPLETED", "FAILED"], "default": "COMPLETED" }),
    );
    props.insert("completed_details".into(), json!({ "type": "string" }));

    Arc::new(
        Tool::new(
            NAME,
            "Mark a task or subtask as COMPLETED or FAILED. Approval is required afterwards.",
            tool_fn(move |args| {
                let args: MarkDoneArgs = parse_args(NAME, args)?;
                let status = status(args.status.as_deref())?;
                let resp = tracker.with(|tm| {
                    tm.mark_task_done(
                        &args.request_id,
                        &args.task_id,
                        args.subtask_id.as_deref(),
                        status,
                        args.completed_details,
                    )
                })?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(props, &["request_id", "task_id"])),
    )
}

fn approve_task_completion(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "approve_task_completion";

    Arc::new(
        Tool::new(
            NAME,
            "Approve a completed task or subtask. Confident results are approved automatically.",
            tool_fn(move |args| {
                let args: ItemArgs = parse_args(NAME, args)?;
                let resp = tracker.with(|tm| {
                    tm.approve_task_completion(&args.request_id, &args.task_id, args.subtask_id.as_deref())
                })?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(item_properties(), &["request_id", "task_id"])),
    )
}

fn approve_request_completion(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "approve_request_completion";
    let mut props = serde_json::Map::new();
    props.insert("request_id".into(), json!({ "type": "string" }));

    Arc::new(
        Tool::new(
            NAME,
            "Finalize a request once every task is completed and approved. Returns workflow metrics.",
            tool_fn(move |args| {
                let args: RequestArgs = parse_args(NAME, args)?;
                let resp = tracker.with(|tm| tm.approve_request_completion(&args.request_id))?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(props, &["request_id"])),
    )
}

fn open_task_details(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "open_task_details";
    let mut props = serde_json::Map::new();
    props.insert("task_id".into(), json!({ "type": "string" }));

    Arc::new(
        Tool::new(
            NAME,
            "Show the full record of a task and its subtasks.",
            tool_fn(move |args| {
                let args: TaskIdArgs = parse_args(NAME, args)?;
                let details = tracker.read(|tm| tm.open_task_details(&args.task_id))?;
                to_json(NAME, &details)
            }),
        )
        .with_args_schema(object_schema(props, &["task_id"])),
    )
}

fn list_requests(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "list_requests";

    Arc::new(Tool::new(
        NAME,
        "List all requests, newest first, with task counts per status.",
        tool_fn(move |_args| {
            let list = tracker.read(|tm| tm.list_requests());
            to_json(NAME, &list)
        }),
    ))
}

fn add_tasks_to_request(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "add_tasks_to_request";
    let mut props = serde_json::Map::new();
    props.insert("request_id".into(), json!({ "type": "string" }));
    props.insert("tasks".into(), spec_list_schema("Tasks"));
    props.insert("priority".into(), priority_schema());
    props.insert("due_date".into(), due_date_schema());

    Arc::new(
        Tool::new(
            NAME,
            "Append tasks to an existing request. Priority and due date default to the request's.",
            tool_fn(move |args| {
                let args: AddTasksArgs = parse_args(NAME, args)?;
                let priority = priority(args.priority.as_deref())?;
                let due = due_date(args.due_date.as_deref())?;
                let resp = tracker
                    .with(|tm| tm.add_tasks_to_request(&args.request_id, args.tasks, priority, due))?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(props, &["request_id", "tasks"])),
    )
}

fn update_task(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "update_task";
    let mut props = item_properties();
    props.insert("title".into(), json!({ "type": "string" }));
    props.insert("description".into(), json!({ "type": "string" }));
    props.insert("priority".into(), priority_schema());
    props.insert("due_date".into(), due_date_schema());

    Arc::new(
        Tool::new(
            NAME,
            "Change the title, description, priority, or due date of an unfinished task or subtask.",
            tool_fn(move |args| {
                let args: UpdateArgs = parse_args(NAME, args)?;
                let patch = TaskPatch {
                    title: args.title,
                    description: args.description,
                    priority: priority(args.priority.as_deref())?,
                    due_date: due_date(args.due_date.as_deref())?,
                };
                let resp = tracker.with(|tm| {
                    tm.update_task(&args.request_id, &args.task_id, args.subtask_id.as_deref(), patch)
                })?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(props, &["request_id", "task_id"])),
    )
}

fn delete_task(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "delete_task";

    Arc::new(
        Tool::new(
            NAME,
            "Delete an unfinished task (with its subtasks) or a single subtask.",
            tool_fn(move |args| {
                let args: ItemArgs = parse_args(NAME, args)?;
                let resp = tracker.with(|tm| {
                    tm.delete_task(&args.request_id, &args.task_id, args.subtask_id.as_deref())
                })?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(item_properties(), &["request_id", "task_id"])),
    )
}

fn create_subtasks(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "create_subtasks";
    let mut props = serde_json::Map::new();
    props.insert("request_id".into(), json!({ "type": "string" }));
    props.insert("task_id".into(), json!({ "type": "string" }));
    props.insert("subtasks".into(), spec_list_schema("Subtasks"));
    props.insert("priority".into(), priority_schema());
    props.insert("due_date".into(), due_date_schema());

    Arc::new(
        Tool::new(
            NAME,
            "Break a task into subtasks. The task completes once every subtask is approved.",
            tool_fn(move |args| {
                let args: CreateSubtasksArgs = parse_args(NAME, args)?;
                let priority = priority(args.priority.as_deref())?;
                let due = due_date(args.due_date.as_deref())?;
                let resp = tracker.with(|tm| {
                    tm.create_subtasks(&args.request_id, &args.task_id, args.subtasks, priority, due)
                })?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(props, &["request_id", "task_id", "subtasks"])),
    )
}

fn notify_task_event(tracker: SharedTaskMaster) -> Arc<dyn BaseTool> {
    const NAME: &str = "notify_task_event";
    let mut props = item_properties();
    props.insert(
        "event".into(),
        json!({ "type": "string", "enum": ["COMPLETED", "FAILED"] }),
    );
    props.insert("completed_details".into(), json!({ "type": "string" }));

    Arc::new(
        Tool::new(
            NAME,
            "Report that a task or subtask completed or failed outside the normal flow.",
            tool_fn(move |args| {
                let args: NotifyArgs = parse_args(NAME, args)?;
                let event: Event = args.event.parse()?;
                let resp = tracker.with(|tm| {
                    tm.notify_task_event(
                        &args.request_id,
                        &args.task_id,
                        event,
                        args.subtask_id.as_deref(),
                        args.completed_details,
                    )
                })?;
                to_json(NAME, &resp)
            }),
        )
        .with_args_schema(object_schema(props, &["request_id", "task_id", "event"])),
    )
}
