//! Task status and cancellation endpoints

use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::info;

use crate::commands::AppState;
use crate::commands::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct TaskParams {
    pub id: Option<String>,
}

impl TaskParams {
    fn id(&self) -> ApiResult<&str> {
        self.id.as_deref().ok_or_else(ApiError::bad_task_id)
    }
}

/// `GET /tasks?id=<id>`
pub async fn task_status(
    State(state): State<AppState>,
    Query(params): Query<TaskParams>,
) -> ApiResult<String> {
    Ok(state.scheduler.read_task_status(params.id()?)?)
}

/// `POST /tasks/cancel?id=<id>`
pub async fn cancel_task(
    State(state): State<AppState>,
    Query(params): Query<TaskParams>,
) -> ApiResult<&'static str> {
    let id = params.id()?;
    state.scheduler.cancel_task(id).await?;
    info!(task_id = id, "task canceled over http");
    Ok("Canceled")
}
