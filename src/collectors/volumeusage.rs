//! Volume usage collector
//!
//! Counts the distinct volumes each node has data on, grouped into volume
//! classes by the target's `volumeusage_map`. Volumes matching no class are
//! ignored; a target without a map counts every volume under `all`.
//!
//! ## Metrics
//!
//! - `tsm_volume_usage{nodename,volumename}` - Distinct volumes per node and volume class

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{gauge_vec, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

/// Class used when the target defines no `volumeusage_map`
pub const DEFAULT_VOLUME_CLASS: &str = "all";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct VolumeUsageMetric {
    pub node_name: String,
    pub volume_name: String,
}

static VOLUMEUSAGE_FIELDS: FieldMap<VolumeUsageMetric> = FieldMap::new(
    "VOLUMEUSAGE",
    columns!(VolumeUsageMetric {
        "NODE_NAME" => "NodeName": Label(node_name),
        "VOLUME_NAME" => "VolumeName": Label(volume_name),
    }),
);

/// Volume class of `volume`, or `None` when no class pattern matches
pub fn classify<'a>(target: &'a Target, volume: &str) -> Option<&'a str> {
    if target.volume_classes.is_empty() {
        return Some(DEFAULT_VOLUME_CLASS);
    }
    target
        .volume_classes
        .iter()
        .find(|(_, pattern)| pattern.is_match(volume))
        .map(|(class, _)| class.as_str())
}

/// Distinct volume count per (node, class)
pub fn tally<'a>(target: &'a Target, usage: &[VolumeUsageMetric]) -> BTreeMap<(String, &'a str), usize> {
    let mut volumes: BTreeMap<(String, &'a str), BTreeSet<&str>> = BTreeMap::new();
    for u in usage {
        if let Some(class) = classify(target, &u.volume_name) {
            volumes
                .entry((u.node_name.clone(), class))
                .or_default()
                .insert(u.volume_name.as_str());
        }
    }
    volumes.into_iter().map(|(key, set)| (key, set.len())).collect()
}

pub struct VolumeUsageCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl VolumeUsageCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }

    pub fn query() -> String {
        VOLUMEUSAGE_FIELDS.select().replacen("SELECT ", "SELECT DISTINCT ", 1)
    }
}

#[async_trait]
impl Collector for VolumeUsageCollector {
    fn name(&self) -> &'static str {
        "volumeusage"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let out = self.executor.query(&self.target, &Self::query()).await?;
        let usage = VOLUMEUSAGE_FIELDS.parse(&out, &self.target.zone)?;
        let counts = tally(&self.target, &usage);

        let gauge = gauge_vec(
            registry,
            "",
            "volume_usage",
            "Number of volumes used by node name and volume class",
            &["nodename", "volumename"],
        )?;
        for ((node, class), count) in counts {
            gauge.with_label_values(&[node.as_str(), class]).set(count as f64);
        }
        Ok(())
    }
}
