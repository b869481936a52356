//! Workbook upload endpoint

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{error, info};

use crate::commands::AppState;
use crate::commands::error::{ApiError, ApiResult};
use crate::commands::parse_positive_id;
use crate::domain::TaskId;

/// Multipart field carrying the workbook bytes
pub const WORKBOOK_FIELD: &str = "workbook";

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub merchant_id: Option<String>,
}

/// `POST /upload?merchant_id=<n>`
///
/// Stores the workbook and schedules its reconciliation. Answers as soon as
/// the task exists; progress is read from the `Location` it returns.
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let merchant_id = parse_positive_id("merchant_id", params.merchant_id.as_deref())?
        .ok_or_else(|| ApiError::bad_request("merchant_id is required"))?;
    let mut multipart = multipart?;

    let mut workbook = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(WORKBOOK_FIELD) {
            workbook = Some(field.bytes().await?);
            break;
        }
    }
    let workbook =
        workbook.ok_or_else(|| ApiError::bad_request(format!("missing multipart field {WORKBOOK_FIELD:?}")))?;

    let task_id = TaskId::new();
    let path = state.uploads.save(merchant_id, task_id, &workbook).await.map_err(|e| {
        error!(error = %e, merchant_id, "failed to store upload");
        ApiError::internal("Failed to store upload")
    })?;

    state.scheduler.new_task_with_id(task_id, merchant_id, path)?;
    info!(%task_id, merchant_id, size_bytes = workbook.len(), "upload accepted");

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, format!("/tasks?id={task_id}"))],
        task_id.to_string(),
    ))
}
