use axum::{
    extract::{Extension, Query},
    Json,
};
use serde::{Deserialize, Serialize};
use site_analysis::SubjectView;

use crate::server::{app::AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: &'static str,
}

impl MessageResponse {
    fn success(message: &'static str) -> Json<Self> {
        Json(Self {
            status: "success",
            message,
        })
    }
}

pub async fn list_records_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<SubjectView>>, ApiError> {
    Ok(Json(state.service.subjects().await?))
}

pub async fn get_record_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<SubjectView>, ApiError> {
    Ok(Json(state.service.subject(query.url.trim()).await?))
}

pub async fn delete_record_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.service.delete_subject(query.url.trim()).await?;
    Ok(MessageResponse::success("Record deleted successfully"))
}

pub async fn flag_record_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.service.flag(query.url.trim()).await?;
    Ok(MessageResponse::success("Record flagged successfully"))
}

pub async fn save_record_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.service.save(query.url.trim()).await?;
    Ok(MessageResponse::success("Record saved successfully"))
}
