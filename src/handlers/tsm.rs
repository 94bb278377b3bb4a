//! TSM target handler
//!
//! Serves one Prometheus scrape per request:
//! - `GET /tsm?target=<name>` runs the collectors enabled for the target
//! - `GET /metrics` exposes the exporter's own process metrics
//! - `GET /` links both

use std::sync::{Arc, Once};
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Gauge, Opts, TextEncoder};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::collectors::{CollectorRegistry, NAMESPACE};
use crate::config::Config;
use crate::error_handling::{ExporterError, ExporterResult};
use crate::executor::QueryExecutor;

/// Shared state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub collectors: Arc<CollectorRegistry>,
    pub executor: Arc<dyn QueryExecutor>,
}

impl AppState {
    pub fn new(config: Config, collectors: CollectorRegistry, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            config: Arc::new(config),
            collectors: Arc::new(collectors),
            executor,
        }
    }
}

/// Query parameters of `/tsm`
#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub target: Option<String>,
}

/// Collect every enabled collector for one target
pub async fn tsm_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TargetQuery>,
) -> ExporterResult<Response> {
    let name = params
        .target
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExporterError::validation_field("'target' parameter must be specified", "target"))?;
    let target = state
        .config
        .target(&name)
        .ok_or_else(|| ExporterError::not_found(format!("target {name}")))?;

    let start = Instant::now();
    let collector = state
        .collectors
        .build(Arc::new(target.clone()), Arc::clone(&state.executor));
    debug!(target_name = %name, collectors = ?collector.collector_names(), "Collecting target");

    let registry = collector
        .gather()
        .await
        .map_err(|e| ExporterError::internal_with_source("Failed to gather collectors", e.into()))?;
    let response = encode(&registry.gather())?;

    info!(target_name = %name, elapsed = start.elapsed().as_secs_f64(), "Collected target");
    Ok(response)
}

/// Process and build metrics of the exporter itself
pub async fn exporter_metrics() -> ExporterResult<Response> {
    register_build_info();
    encode(&prometheus::gather())
}

pub async fn index() -> Html<&'static str> {
    Html(
        r#"<html>
<head><title>TSM Exporter</title></head>
<body>
<h1>TSM Exporter</h1>
<p><a href="/metrics">Exporter metrics</a></p>
<p><a href="/tsm?target=example">Target metrics</a> (replace <code>example</code> with a configured target)</p>
</body>
</html>"#,
    )
}

fn encode(families: &[prometheus::proto::MetricFamily]) -> ExporterResult<Response> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(families, &mut buffer)
        .map_err(|e| ExporterError::internal_with_source("Failed to encode metrics", e.into()))?;
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response())
}

static BUILD_INFO: Once = Once::new();

/// `tsm_exporter_build_info{version}` in the default registry
fn register_build_info() {
    BUILD_INFO.call_once(|| {
        let opts = Opts::new("build_info", "Build information of the exporter")
            .namespace(NAMESPACE)
            .subsystem("exporter")
            .const_label("version", env!("CARGO_PKG_VERSION"));
        if let Ok(gauge) = Gauge::with_opts(opts) {
            gauge.set(1.0);
            if let Err(e) = prometheus::register(Box::new(gauge)) {
                debug!("Build info not registered: {}", e);
            }
        }
    });
}

/// Create the exporter router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/tsm", get(tsm_metrics))
        .route("/metrics", get(exporter_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
