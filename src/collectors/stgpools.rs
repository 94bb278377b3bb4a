//! Storage pool collector
//!
//! ## Metrics
//!
//! - `tsm_storage_pool_utilized_ratio` - Utilized space (0.0-1.0)
//! - `tsm_storage_pool_migration_ratio` - Migratable data (0.0-1.0), absent for container pools
//! - `tsm_storage_pool_logical_ratio` - Logical occupancy (0.0-1.0), absent when not reported
//! - `tsm_storage_pool_estimated_capacity_bytes` - Estimated capacity

use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{gauge_vec, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StgPoolMetric {
    pub name: String,
    pub pool_type: String,
    pub class_name: String,
    pub storage_type: String,
    pub percent_utilized: f64,
    pub percent_migr: Option<f64>,
    pub percent_logical: Option<f64>,
    pub estimated_capacity: f64,
}

static STGPOOL_FIELDS: FieldMap<StgPoolMetric> = FieldMap::new(
    "STGPOOLS",
    columns!(StgPoolMetric {
        "STGPOOL_NAME" => "Name": Label(name),
        "POOLTYPE" => "PoolType": Label(pool_type),
        "DEVCLASS" => "ClassName": Label(class_name),
        "STG_TYPE" => "StorageType": Label(storage_type),
        "PCT_UTILIZED" => "PercentUtilized": Number(percent_utilized),
        "PCT_MIGR" => "PercentMigr": OptionalNumber(percent_migr),
        "PCT_LOGICAL" => "PercentLogical": OptionalNumber(percent_logical),
        "EST_CAPACITY_MB" => "EstimatedCapacity": Number(estimated_capacity),
    }),
);

pub struct StgPoolsCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl StgPoolsCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }
}

#[async_trait]
impl Collector for StgPoolsCollector {
    fn name(&self) -> &'static str {
        "stgpools"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let out = self.executor.query(&self.target, &STGPOOL_FIELDS.select()).await?;
        let pools = STGPOOL_FIELDS.parse(&out, &self.target.zone)?;

        let labels = &["storagepool", "pooltype", "classname", "storagetype"];
        let utilized = gauge_vec(registry, "storage_pool", "utilized_ratio", "Storage pool utilized ratio, 0.0-1.0", labels)?;
        let migration = gauge_vec(registry, "storage_pool", "migration_ratio", "Storage pool migration ratio, 0.0-1.0", labels)?;
        let logical = gauge_vec(registry, "storage_pool", "logical_ratio", "Storage pool logical occupancy ratio, 0.0-1.0", labels)?;
        let capacity = gauge_vec(
            registry,
            "storage_pool",
            "estimated_capacity_bytes",
            "Storage pool estimated capacity in bytes",
            labels,
        )?;

        for pool in &pools {
            let labels = [
                pool.name.as_str(),
                pool.pool_type.as_str(),
                pool.class_name.as_str(),
                pool.storage_type.as_str(),
            ];
            utilized.with_label_values(&labels).set(pool.percent_utilized);
            if let Some(value) = pool.percent_migr {
                migration.with_label_values(&labels).set(value);
            }
            if let Some(value) = pool.percent_logical {
                logical.with_label_values(&labels).set(value);
            }
            capacity.with_label_values(&labels).set(pool.estimated_capacity);
        }
        Ok(())
    }
}
