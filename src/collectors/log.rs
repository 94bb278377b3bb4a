//! Log collector
//!
//! Active, archive, mirror and archive failover log space from the `LOG`
//! table. Mirror and failover logs are optional server features; their series
//! are only exposed when the server reports a size for them.

use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{gauge, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LogMetric {
    pub active_total: f64,
    pub active_used: f64,
    pub active_free: f64,
    pub archive_total: f64,
    pub archive_used: f64,
    pub archive_free: f64,
    pub mirror_total: Option<f64>,
    pub mirror_used: Option<f64>,
    pub mirror_free: Option<f64>,
    pub failover_total: Option<f64>,
    pub failover_used: Option<f64>,
    pub failover_free: Option<f64>,
}

static LOG_FIELDS: FieldMap<LogMetric> = FieldMap::new(
    "LOG",
    columns!(LogMetric {
        "TOTAL_SPACE_MB" => "ActiveTotal": Number(active_total),
        "USED_SPACE_MB" => "ActiveUsed": Number(active_used),
        "FREE_SPACE_MB" => "ActiveFree": Number(active_free),
        "ARCHLOG_TOL_FS_MB" => "ArchiveTotal": Number(archive_total),
        "ARCHLOG_USED_FS_MB" => "ArchiveUsed": Number(archive_used),
        "ARCHLOG_FREE_FS_MB" => "ArchiveFree": Number(archive_free),
        "MIRLOG_TOL_FS_MB" => "MirrorTotal": OptionalNumber(mirror_total),
        "MIRLOG_USED_FS_MB" => "MirrorUsed": OptionalNumber(mirror_used),
        "MIRLOG_FREE_FS_MB" => "MirrorFree": OptionalNumber(mirror_free),
        "AFAILOVER_TOL_FS_MB" => "ArchiveFailoverTotal": OptionalNumber(failover_total),
        "AFAILOVER_USED_FS_MB" => "ArchiveFailoverUsed": OptionalNumber(failover_used),
        "AFAILOVER_FREE_FS_MB" => "ArchiveFailoverFree": OptionalNumber(failover_free),
    }),
);

pub struct LogCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl LogCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }
}

fn set_log(
    registry: &Registry,
    subsystem: &str,
    description: &str,
    values: [Option<f64>; 3],
) -> Result<(), prometheus::Error> {
    for (kind, value) in ["total", "used", "free"].into_iter().zip(values) {
        if let Some(value) = value {
            gauge(
                registry,
                subsystem,
                &format!("{kind}_bytes"),
                &format!("{description} {kind} space in bytes"),
            )?
            .set(value);
        }
    }
    Ok(())
}

#[async_trait]
impl Collector for LogCollector {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let out = self.executor.query(&self.target, &LOG_FIELDS.select()).await?;
        let Some(m) = LOG_FIELDS.parse(&out, &self.target.zone)?.into_iter().next() else {
            return Ok(());
        };

        set_log(
            registry,
            "active_log",
            "Active log",
            [Some(m.active_total), Some(m.active_used), Some(m.active_free)],
        )?;
        set_log(
            registry,
            "archive_log",
            "Archive log",
            [Some(m.archive_total), Some(m.archive_used), Some(m.archive_free)],
        )?;
        set_log(registry, "mirror_log", "Mirror log", [m.mirror_total, m.mirror_used, m.mirror_free])?;
        set_log(
            registry,
            "archive_failover_log",
            "Archive failover log",
            [m.failover_total, m.failover_used, m.failover_free],
        )?;
        Ok(())
    }
}
