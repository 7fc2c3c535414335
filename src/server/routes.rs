//! Axum route handlers for the taskmaster HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`       - Returns `{"status": "ok", "version": ...}`
//! - `GET  /tools`        - Tool definitions with argument schemas
//! - `POST /tools/:name`  - Run a tool with a JSON argument object
//! - `GET  /requests`     - All requests with per-status task counts
//! - `GET  /tasks/:id`    - Full task record plus subtasks

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::tools::{ToolError, ToolRegistry};
use crate::tracker::{SharedTaskMaster, TrackerError};

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub tracker: SharedTaskMaster,
    pub tools: ToolRegistry,
}

impl AppState {
    /// State whose registry holds every tool bound to `tracker`.
    pub fn new(tracker: SharedTaskMaster) -> Self {
        let tools = ToolRegistry::with_taskmaster(&tracker);
        Self { tracker, tools }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(SharedTaskMaster::default())
    }
}

type ApiError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}

fn tracker_error(e: TrackerError) -> ApiError {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    error_response(status, e)
}

fn tool_error(e: ToolError) -> ApiError {
    match e {
        ToolError::Tracker(inner) => tracker_error(inner),
        ToolError::UnknownTool(_) => error_response(StatusCode::NOT_FOUND, e),
        ToolError::InvalidArguments { .. } => error_response(StatusCode::BAD_REQUEST, e),
        ToolError::Encode { .. } => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/:name", post(call_tool_handler))
        .route("/requests", get(list_requests_handler))
        .route("/tasks/:id", get(task_details_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health - liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "taskmaster",
    }))
}

/// GET /tools - definitions of every registered tool.
async fn list_tools_handler(State(state): State<AppState>) -> Json<Value> {
    let tools: Vec<Value> = state.tools.list().iter().map(|t| t.definition()).collect();
    Json(serde_json::json!({ "tools": tools }))
}

/// POST /tools/:name - run one tool.
///
/// Request body: the tool's argument object. An empty body counts as `{}`.
async fn call_tool_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, ApiError> {
    let args = body.map(|Json(v)| v).unwrap_or(Value::Null);
    match state.tools.call(&name, args).await {
        Ok(value) => Ok(Json(value)),
        Err(e) => {
            tracing::debug!(tool = %name, error = %e, "tool call rejected");
            Err(tool_error(e))
        }
    }
}

/// GET /requests - list requests, newest first.
async fn list_requests_handler(State(state): State<AppState>) -> Json<Value> {
    let list = state.tracker.read(|tm| tm.list_requests());
    Json(serde_json::to_value(list).unwrap_or_default())
}

/// GET /tasks/:id - task record plus subtasks.
async fn task_details_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let details = state
        .tracker
        .read(|tm| tm.open_task_details(&id))
        .map_err(tracker_error)?;
    serde_json::to_value(details)
        .map(Json)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app_router(AppState::default());
        let (status, json) = send(app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["service"], "taskmaster");
    }

    #[tokio::test]
    async fn test_list_tools() {
        let app = app_router(AppState::default());
        let (status, json) = send(app, "GET", "/tools", None).await;
        assert_eq!(status, StatusCode::OK);
        let tools = json["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 12);
        assert_eq!(tools[0]["name"], "request_planning");
        assert!(tools[0]["parameters"]["properties"]["tasks"].is_object());
    }

    #[tokio::test]
    async fn test_plan_and_inspect() {
        let state = AppState::default();

        let (status, planned) = send(
            app_router(state.clone()),
            "POST",
            "/tools/request_planning",
            Some(serde_json::json!({
                "original_request": "Write a report",
                "tasks": [{"title": "T1", "description": "D1"}],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(planned["status"], "planned");
        let task_id = planned["tasks"][0]["id"].as_str().unwrap().to_string();

        let (status, list) = send(app_router(state.clone()), "GET", "/requests", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["total_requests"], 1);
        assert_eq!(list["requests"][0]["task_summary"]["PENDING"], 1);

        let (status, details) =
            send(app_router(state.clone()), "GET", &format!("/tasks/{task_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(details["id"], task_id.as_str());
        assert_eq!(details["status"], "PENDING");
        assert_eq!(details["subtasks_data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let state = AppState::default();

        let (status, json) = send(app_router(state.clone()), "GET", "/tasks/task-missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("task-missing"));

        let (status, _) = send(
            app_router(state.clone()),
            "POST",
            "/tools/get_next_task",
            Some(serde_json::json!({ "request_id": "req-missing" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            app_router(state.clone()),
            "POST",
            "/tools/request_planning",
            Some(serde_json::json!({ "original_request": "x", "tasks": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            app_router(state.clone()),
            "POST",
            "/tools/launch_rockets",
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("launch_rockets"));
    }

    #[tokio::test]
    async fn test_tool_without_body() {
        let app = app_router(AppState::default());
        let (status, json) = send(app, "POST", "/tools/list_requests", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_requests"], 0);
    }
}
