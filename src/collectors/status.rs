//! Status collector
//!
//! Reports whether the server answered a trivial query with its own name.
//!
//! ## Metrics
//!
//! - `tsm_status{servername}` - 1 when the server returned its name, 0 when it returned no row

use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{gauge_vec, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatusMetric {
    pub server_name: String,
}

static STATUS_FIELDS: FieldMap<StatusMetric> = FieldMap::new(
    "STATUS",
    columns!(StatusMetric {
        "SERVER_NAME" => "ServerName": Label(server_name),
    }),
);

pub struct StatusCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl StatusCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }

    async fn status(&self) -> Result<Option<StatusMetric>, CollectError> {
        let out = self.executor.query(&self.target, &STATUS_FIELDS.select()).await?;
        let metrics = STATUS_FIELDS.parse(&out, &self.target.zone)?;
        Ok(metrics.into_iter().find(|m| !m.server_name.is_empty()))
    }
}

#[async_trait]
impl Collector for StatusCollector {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let status = self.status().await?;

        let up = gauge_vec(registry, "", "status", "Status of TSM, 1=online 0=failure", &["servername"])?;
        match status {
            Some(metric) => up.with_label_values(&[metric.server_name.as_str()]).set(1.0),
            None => up.with_label_values(&[self.target.servername()]).set(0.0),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    async fn collect(executor: ScriptedExecutor) -> (Result<(), CollectError>, String) {
        let mut t = target();
        t.servername = Some("TSM1SRV".into());
        let collector = StatusCollector::new(Arc::new(t), Arc::new(executor));
        let registry = Registry::new();
        let result = collector.collect(&registry).await;
        (result, render(&registry))
    }

    #[tokio::test]
    async fn test_status_online() {
        let (result, text) = collect(ScriptedExecutor::new().reply("SELECT SERVER_NAME FROM STATUS", "TSM1SRV\n")).await;
        result.unwrap();
        assert!(text.contains("tsm_status{servername=\"TSM1SRV\"} 1"));
    }

    #[tokio::test]
    async fn test_status_no_rows() {
        let (result, text) = collect(ScriptedExecutor::new().reply("FROM STATUS", "")).await;
        result.unwrap();
        assert!(text.contains("tsm_status{servername=\"TSM1SRV\"} 0"));
    }

    #[tokio::test]
    async fn test_status_error_registers_nothing() {
        let (result, text) = collect(ScriptedExecutor::new().fail("FROM STATUS")).await;
        assert!(result.is_err());
        assert!(text.is_empty());
    }
}
