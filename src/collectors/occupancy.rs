//! Occupancy collector
//!
//! File counts and space per node file space and storage pool. Disabled by
//! default because large servers report one row per file space.

use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{gauge_vec, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OccupancyMetric {
    pub node_name: String,
    pub filespace: String,
    pub storage_pool: String,
    pub kind: String,
    pub files: f64,
    pub logical: f64,
    pub physical: Option<f64>,
    pub reporting: Option<f64>,
}

static OCCUPANCY_FIELDS: FieldMap<OccupancyMetric> = FieldMap::new(
    "OCCUPANCY",
    columns!(OccupancyMetric {
        "NODE_NAME" => "NodeName": Label(node_name),
        "FILESPACE_NAME" => "FilespaceName": Label(filespace),
        "STGPOOL_NAME" => "StoragePoolName": Label(storage_pool),
        "TYPE" => "Type": Label(kind),
        "NUM_FILES" => "Files": Number(files),
        "LOGICAL_MB" => "Logical": Number(logical),
        "PHYSICAL_MB" => "Physical": OptionalNumber(physical),
        "REPORTING_MB" => "Reporting": OptionalNumber(reporting),
    }),
);

pub struct OccupancyCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl OccupancyCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }
}

#[async_trait]
impl Collector for OccupancyCollector {
    fn name(&self) -> &'static str {
        "occupancy"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let out = self.executor.query(&self.target, &OCCUPANCY_FIELDS.select()).await?;
        let occupancies = OCCUPANCY_FIELDS.parse(&out, &self.target.zone)?;

        let labels = &["nodename", "filespace", "storagepool", "type"];
        let files = gauge_vec(registry, "occupancy", "files", "Number of files", labels)?;
        let logical = gauge_vec(registry, "occupancy", "logical_bytes", "Logical space occupied in bytes", labels)?;
        let physical = gauge_vec(registry, "occupancy", "physical_bytes", "Physical space occupied in bytes", labels)?;
        let reporting = gauge_vec(registry, "occupancy", "reporting_bytes", "Reporting space occupied in bytes", labels)?;

        for o in &occupancies {
            let labels = [
                o.node_name.as_str(),
                o.filespace.as_str(),
                o.storage_pool.as_str(),
                o.kind.as_str(),
            ];
            files.with_label_values(&labels).set(o.files);
            logical.with_label_values(&labels).set(o.logical);
            if let Some(value) = o.physical {
                physical.with_label_values(&labels).set(value);
            }
            if let Some(value) = o.reporting {
                reporting.with_label_values(&labels).set(value);
            }
        }
        Ok(())
    }
}
