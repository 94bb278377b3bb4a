//! Library volumes collector
//!
//! ## Metrics
//!
//! - `tsm_libvolume_scratch` - Number of scratch tapes
//! - `tsm_libvolume_media{mediatype,status}` - Number of tapes per media type and status

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{gauge, gauge_vec, quote, where_clause, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LibVolumeMetric {
    pub mediatype: String,
    pub status: String,
}

static LIBVOLUME_FIELDS: FieldMap<LibVolumeMetric> = FieldMap::new(
    "LIBVOLUMES",
    columns!(LibVolumeMetric {
        "MEDIATYPE" => "MediaType": Label(mediatype),
        "STATUS" => "Status": Label(status),
    }),
);

pub struct LibVolumesCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl LibVolumesCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }

    pub fn query(target: &Target) -> String {
        let conditions: Vec<String> = target
            .library_name
            .iter()
            .map(|library| format!("LIBRARY_NAME={}", quote(library)))
            .collect();
        format!("{}{}", LIBVOLUME_FIELDS.select(), where_clause(&conditions))
    }
}

#[async_trait]
impl Collector for LibVolumesCollector {
    fn name(&self) -> &'static str {
        "libvolumes"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let out = self.executor.query(&self.target, &Self::query(&self.target)).await?;
        let volumes = LIBVOLUME_FIELDS.parse(&out, &self.target.zone)?;

        let scratch = volumes
            .iter()
            .filter(|v| v.status.eq_ignore_ascii_case("Scratch"))
            .count();
        let mut media: BTreeMap<(&str, &str), f64> = BTreeMap::new();
        for volume in &volumes {
            *media.entry((volume.mediatype.as_str(), volume.status.as_str())).or_default() += 1.0;
        }

        gauge(registry, "libvolume", "scratch", "Number of scratch tapes")?.set(scratch as f64);
        let media_gauge = gauge_vec(
            registry,
            "libvolume",
            "media",
            "Number of tapes",
            &["mediatype", "status"],
        )?;
        for ((mediatype, status), count) in media {
            media_gauge.with_label_values(&[mediatype, status]).set(count);
        }
        Ok(())
    }
}
