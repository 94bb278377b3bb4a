//! Handlers module for the exporter HTTP endpoints

pub mod tsm;

// Re-export commonly used types
pub use tsm::{create_router, AppState, TargetQuery};
