//! HTTP error responses

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::application::SchedulerError;
use crate::domain::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    #[must_use]
    pub fn bad_task_id() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_TASK_ID", "Bad task id")
    }

    #[must_use]
    pub fn cannot_cancel() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "CANNOT_CANCEL",
            "Task can not be canceled due to its current state",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SchedulerError> for ApiError {
    fn from(value: SchedulerError) -> Self {
        match value {
            SchedulerError::BadTaskId => Self::bad_task_id(),
            SchedulerError::CannotCancel => Self::cannot_cancel(),
            SchedulerError::Registry(e) => {
                error!(error = %e, "task registry rejected request");
                Self::internal("Failed to schedule task")
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(value: StorageError) -> Self {
        error!(error = %value, "catalog store request failed");
        Self::internal("Catalog store is unavailable")
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(value: MultipartRejection) -> Self {
        Self::bad_request(value.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(value: MultipartError) -> Self {
        Self::bad_request(value.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_errors_map_to_statuses() {
        let bad: ApiError = SchedulerError::BadTaskId.into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.message(), "Bad task id");

        let conflict: ApiError = SchedulerError::CannotCancel.into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "CANNOT_CANCEL");
    }
}
