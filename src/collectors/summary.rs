//! Summary collector
//!
//! Per activity byte and event totals over the trailing 24 hours. Tape
//! mounts carry no byte counts and are queried separately, then joined into
//! the same activity view.
//!
//! ## Metrics
//!
//! - `tsm_summary_activity_bytes{activity}` - Bytes moved by the activity
//! - `tsm_summary_activity_count{activity}` - Number of activity events

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{between, gauge_vec, last_day, where_clause, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

pub const TAPE_MOUNT: &str = "TAPE MOUNT";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SummaryMetric {
    pub activity: String,
    pub bytes: f64,
    pub count: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MountMetric {
    pub activity: String,
    pub count: f64,
}

static ACTIVITY_FIELDS: FieldMap<SummaryMetric> = FieldMap::new(
    "SUMMARY",
    columns!(SummaryMetric {
        "ACTIVITY" => "Activity": Label(activity),
        "SUM(BYTES)" => "Bytes": Number(bytes),
        "COUNT(*)" => "Count": Number(count),
    }),
);

static MOUNT_FIELDS: FieldMap<MountMetric> = FieldMap::new(
    "SUMMARY",
    columns!(MountMetric {
        "ACTIVITY" => "Activity": Label(activity),
        "COUNT(*)" => "Count": Number(count),
    }),
);

/// Join activity rows and tape mount rows, first row per activity wins
pub fn correlate(activities: Vec<SummaryMetric>, mounts: Vec<MountMetric>) -> BTreeMap<String, SummaryMetric> {
    let mut summary: BTreeMap<String, SummaryMetric> = BTreeMap::new();
    for metric in activities {
        summary.entry(metric.activity.clone()).or_insert(metric);
    }
    for mount in mounts {
        summary.entry(mount.activity.clone()).or_insert(SummaryMetric {
            activity: mount.activity,
            bytes: 0.0,
            count: mount.count,
        });
    }
    summary
}

pub struct SummaryCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl SummaryCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }

    /// Activity totals and tape mount counts over the same window
    pub fn queries(target: &Target) -> (String, String) {
        let (from, to) = last_day(&target.zone);
        let window = between("END_TIME", &from, &to);
        let activity = format!(
            "{}{} GROUP BY ACTIVITY",
            ACTIVITY_FIELDS.select(),
            where_clause(&[format!("ACTIVITY<>'{TAPE_MOUNT}'"), window.clone()])
        );
        let mounts = format!(
            "{}{} GROUP BY ACTIVITY",
            MOUNT_FIELDS.select(),
            where_clause(&[format!("ACTIVITY='{TAPE_MOUNT}'"), window])
        );
        (activity, mounts)
    }
}

#[async_trait]
impl Collector for SummaryCollector {
    fn name(&self) -> &'static str {
        "summary"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let (activity_query, mount_query) = Self::queries(&self.target);
        let (activities, mounts) = tokio::try_join!(
            self.executor.query(&self.target, &activity_query),
            self.executor.query(&self.target, &mount_query),
        )?;
        let zone = &self.target.zone;
        let summary = correlate(
            ACTIVITY_FIELDS.parse(&activities, zone)?,
            MOUNT_FIELDS.parse(&mounts, zone)?,
        );

        let bytes = gauge_vec(registry, "summary", "activity_bytes", "Amount of data handled by the activity in bytes", &["activity"])?;
        let count = gauge_vec(registry, "summary", "activity_count", "Number of activity events", &["activity"])?;
        for (activity, metric) in &summary {
            bytes.with_label_values(&[activity.as_str()]).set(metric.bytes);
            count.with_label_values(&[activity.as_str()]).set(metric.count);
        }
        Ok(())
    }
}
