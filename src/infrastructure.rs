//! Infrastructure layer for storage, workbook parsing, configuration and logging

pub mod config;
pub mod database_connection;
pub mod logging;
pub mod product_query;
pub mod reconciliation;
pub mod spreadsheet;
pub mod staging;
pub mod upload_store;

// Re-export commonly used items
pub use config::{AppConfig, ConfigError, DatabaseConfig, LoggingConfig};
pub use database_connection::DatabaseConnection;
pub use logging::init_logging_with_config;
pub use product_query::{build_list_query, list_products};
pub use reconciliation::{DELETE_STAGING_THRESHOLD, PgCatalogStore};
pub use spreadsheet::SpreadsheetSource;
pub use upload_store::UploadStore;
