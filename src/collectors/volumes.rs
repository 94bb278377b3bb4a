//! Volumes collector
//!
//! Counts storage volumes whose access mode keeps them from being used.
//!
//! ## Metrics
//!
//! - `tsm_volumes_unavailable` - Number of unavailable volumes
//! - `tsm_volumes_readonly` - Number of readonly volumes

use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{gauge, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct VolumeMetric {
    pub access: String,
    pub name: String,
}

static VOLUME_FIELDS: FieldMap<VolumeMetric> = FieldMap::new(
    "VOLUMES",
    columns!(VolumeMetric {
        "ACCESS" => "Access": Label(access),
        "VOLUME_NAME" => "Name": Label(name),
    }),
);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct VolumeCounts {
    pub unavailable: f64,
    pub readonly: f64,
}

impl VolumeCounts {
    pub fn tally(volumes: &[VolumeMetric]) -> Self {
        volumes.iter().fold(Self::default(), |mut counts, volume| {
            if volume.access.eq_ignore_ascii_case("UNAVAILABLE") {
                counts.unavailable += 1.0;
            } else if volume.access.eq_ignore_ascii_case("READONLY") {
                counts.readonly += 1.0;
            }
            counts
        })
    }
}

pub struct VolumesCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl VolumesCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }
}

#[async_trait]
impl Collector for VolumesCollector {
    fn name(&self) -> &'static str {
        "volumes"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let out = self.executor.query(&self.target, &VOLUME_FIELDS.select()).await?;
        let counts = VolumeCounts::tally(&VOLUME_FIELDS.parse(&out, &self.target.zone)?);

        gauge(registry, "volumes", "unavailable", "Number of unavailable volumes")?.set(counts.unavailable);
        gauge(registry, "volumes", "readonly", "Number of readonly volumes")?.set(counts.readonly);
        Ok(())
    }
}
