use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use site_analysis::{TaskId, TaskRecord, TaskState};

use crate::server::{app::AppState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: TaskId,
    pub state: TaskState,
    pub result: Option<Value>,
}

impl From<TaskRecord> for TaskStatusResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.task_id,
            state: record.state,
            result: record.result,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OverrideBody {
    pub result: Value,
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid task id: {}", raw)))
}

/// Poll a task. Finished work is persisted before this answers.
pub async fn get_task_handler(
    Extension(state): Extension<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let record = state.service.task(task_id).await?;
    Ok(Json(record.into()))
}

/// Replace the stored result of a finished task.
pub async fn override_task_handler(
    Extension(state): Extension<AppState>,
    Path(task_id): Path<String>,
    Json(body): Json<OverrideBody>,
) -> Result<Json<TaskRecord>, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let record = state.service.override_task(task_id, body.result).await?;
    Ok(Json(record))
}
