#![deny(warnings)]

//! TSM Exporter Library
//!
//! Collects IBM Spectrum Protect (TSM) server metrics by running `dsmadmc`
//! queries and exposes them in the Prometheus text format.
//!
//! # Modules
//!
//! - `config`: YAML target configuration
//! - `executor`: dsmadmc invocation behind the `QueryExecutor` trait
//! - `decoder`: comma delimited output to records
//! - `normalize`: locale tolerant numbers and server time stamps
//! - `mapper`: column tables building typed metric records
//! - `collectors`: the metric domains plus registry and dispatcher
//! - `handlers`: HTTP endpoints
//! - `error_handling`: Standardized error handling

pub mod collectors;
pub mod config;
pub mod decoder;
pub mod error_handling;
pub mod executor;
pub mod handlers;
pub mod mapper;
pub mod normalize;

// Re-export the main types for convenience
pub use collectors::{Collector, CollectorRegistry, TsmCollector};
pub use config::{Config, Target};
pub use error_handling::{CollectError, ErrorResponse, ExporterError, ExporterResult, QueryError};
pub use executor::{Dsmadmc, QueryExecutor};
pub use handlers::{create_router, AppState};
