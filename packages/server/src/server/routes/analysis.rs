use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use site_analysis::types::kind::UnknownKind;
use site_analysis::{AnalysisOutcome, AnalysisRequest, SubjectId, TaskId, TaskRefs, TaskState, WorkKind};

use crate::server::{app::AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct AnalyzeBody {
    #[serde(default)]
    pub url: String,
    pub html: Option<String>,
    #[serde(default)]
    pub reuse: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Dispatched {
        status: &'static str,
        message: String,
        task_id: TaskId,
        state: TaskState,
    },
    Skipped {
        status: &'static str,
        message: String,
        record_id: SubjectId,
        tasks: TaskRefs,
    },
}

/// Submit a subject for one kind of analysis.
///
/// 202 when work was dispatched, 200 when the page is unchanged and the
/// attached task ids are returned instead.
pub async fn analyze_handler(
    Extension(state): Extension<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<AnalyzeBody>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    let kind: WorkKind = kind
        .parse()
        .map_err(|e: UnknownKind| ApiError::NotFound(e.to_string()))?;

    let mut request = AnalysisRequest::new(body.url).with_reuse(body.reuse);
    if let Some(html) = body.html {
        request = request.with_html(html);
    }

    let (status, response) = match state.service.analyze(kind, request).await? {
        AnalysisOutcome::Dispatched { task, .. } => (
            StatusCode::ACCEPTED,
            AnalyzeResponse::Dispatched {
                status: "success",
                message: format!("{} task submitted", kind),
                task_id: task.task_id,
                state: task.state,
            },
        ),
        AnalysisOutcome::Skipped { record_id, tasks } => (
            StatusCode::OK,
            AnalyzeResponse::Skipped {
                status: "success",
                message: "No changes in HTML, returning task IDs".to_string(),
                record_id,
                tasks,
            },
        ),
    };

    Ok((status, Json(response)))
}
