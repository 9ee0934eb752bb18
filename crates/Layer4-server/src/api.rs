//! Route handlers for /api/v1

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use pilot_foundation::Error;
use pilot_task::{CreateTask, PendingRequest, TaskDetails, TaskId, TaskStatus, TaskSummary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

// ============================================================================
// Bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RunTaskResponse {
    pub status: &'static str,
    pub message: String,
    pub task_id: TaskId,
    pub live_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub status: &'static str,
    pub message: String,
    pub task_id: TaskId,
}

#[derive(Debug, Serialize)]
pub struct PendingRequestResponse {
    pub has_pending_request: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<PendingRequest>,
}

/// Ids that do not parse cannot name a task
fn parse_id(raw: &str) -> Result<TaskId, ApiError> {
    TaskId::parse(raw).ok_or_else(|| ApiError::not_found(format!("Task with ID {} not found", raw)))
}

fn success(message: String) -> Json<ActionResponse> {
    Json(ActionResponse {
        status: "success",
        message,
    })
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn run_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTask>, JsonRejection>,
) -> Result<Json<RunTaskResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let description = request.task.clone();

    let created = state.manager.create(request).await.map_err(|e| match e {
        Error::InvalidInput(_) => ApiError::from(e),
        other => ApiError::internal("Error processing task", &other),
    })?;

    info!("Accepted task {}", created.id);
    Ok(Json(RunTaskResponse {
        status: "success",
        message: format!("Processing task: {}", description),
        task_id: created.id,
        live_url: created.live_url,
    }))
}

pub async fn stop_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let id = parse_id(&id)?;
    if state.manager.stop(id).await {
        Ok(success(format!("Task {} stopped", id)))
    } else {
        Err(ApiError::not_found(format!(
            "Task {} not found or already finished",
            id
        )))
    }
}

pub async fn pause_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let id = parse_id(&id)?;
    if state.manager.pause(id).await {
        Ok(success(format!("Task {} paused", id)))
    } else {
        Err(ApiError::not_found(format!("Task {} not found or not running", id)))
    }
}

pub async fn resume_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let id = parse_id(&id)?;
    if state.manager.resume(id).await {
        Ok(success(format!("Task {} resumed", id)))
    } else {
        Err(ApiError::not_found(format!("Task {} not found or not paused", id)))
    }
}

pub async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatus>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.manager.get_status(id).await?))
}

pub async fn task_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskDetails>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.manager.get_details(id).await?))
}

pub async fn human_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let id = parse_id(&id)?;
    let Json(body) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let resumed = state.manager.submit_feedback(id, &body.feedback).await?;
    let message = if resumed {
        "Feedback received and task resumed".to_string()
    } else {
        warn!("Feedback delivered to task {} but it could not be resumed", id);
        format!("Feedback received but task {} was not resumed", id)
    };

    Ok(Json(FeedbackResponse {
        status: "success",
        message,
        task_id: id,
    }))
}

pub async fn pending_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PendingRequestResponse>, ApiError> {
    let id = parse_id(&id)?;
    let request = state.manager.pending_request(id).await?;

    Ok(Json(PendingRequestResponse {
        has_pending_request: request.is_some(),
        request,
    }))
}

pub async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskSummary>> {
    Json(state.manager.list().await)
}
