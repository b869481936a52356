//! HTTP commands for uploading catalogs, polling tasks and listing products
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each endpoint group is its own file in the commands/ directory
//! - The router and shared state are defined here

pub mod error;
pub mod products;
pub mod tasks;
pub mod uploads;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::application::Scheduler;
use crate::domain::CatalogStore;
use crate::infrastructure::UploadStore;

pub use error::{ApiError, ApiErrorBody, ApiResult};

/// Largest workbook accepted by `POST /upload`
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<dyn CatalogStore>,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, store: Arc<dyn CatalogStore>, uploads: UploadStore) -> Self {
        Self {
            scheduler,
            store,
            uploads,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/upload",
            post(uploads::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/tasks", get(tasks::task_status))
        .route("/tasks/cancel", post(tasks::cancel_task))
        .route("/list", get(products::list_products))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parses an optional query value that must be a positive integer
pub(crate) fn parse_positive_id(name: &str, raw: Option<&str>) -> ApiResult<Option<i64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(ApiError::bad_request(format!("{name} must be a positive integer"))),
    }
}
