//! catalog-sync - merchant catalog reconciliation service
//!
//! Merchants upload a workbook of offers; each upload becomes a background
//! task that reconciles the `products` table against it under a deadline,
//! with cooperative cancellation and pollable status.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod commands;

pub use commands::{AppState, router};
