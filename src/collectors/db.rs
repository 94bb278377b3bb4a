//! DB collector
//!
//! Database space, page and buffer pool statistics from the `DB` table,
//! labelled by database name.
//!
//! ## Metrics
//!
//! - `tsm_db_space_{total,used,free}_bytes` - File system and database space
//! - `tsm_db_pages_{total,usable,used,free}` - Database page counts
//! - `tsm_db_buffer_hit_ratio` - Buffer pool hit ratio (0.0-1.0)
//! - `tsm_db_buffer_requests_total` - Buffer pool requests
//! - `tsm_db_sort_overflow` - Sort overflows
//! - `tsm_db_lock_escalation_total` - Lock escalations
//! - `tsm_db_pkg_hit_ratio` - Package cache hit ratio (0.0-1.0)
//! - `tsm_db_last_backup_timestamp_seconds` - Last full backup, 0 when never backed up

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prometheus::Registry;

use super::{counter_vec, gauge_vec, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};
use crate::normalize::timestamp_seconds;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DbMetric {
    pub name: String,
    pub total_space: f64,
    pub used_space: f64,
    pub free_space: f64,
    pub total_pages: f64,
    pub usable_pages: f64,
    pub used_pages: f64,
    pub free_pages: f64,
    pub buff_hit_ratio: f64,
    pub total_buffer_req: f64,
    pub sort_overflow: f64,
    pub lock_esc: f64,
    pub pkg_hit_ratio: f64,
    pub last_backup: Option<DateTime<Utc>>,
}

static DB_FIELDS: FieldMap<DbMetric> = FieldMap::new(
    "DB",
    columns!(DbMetric {
        "BUFF_HIT_RATIO" => "BuffHitRatio": Number(buff_hit_ratio),
        "DATABASE_NAME" => "Name": Label(name),
        "FREE_PAGES" => "FreePages": Number(free_pages),
        "FREE_SPACE_MB" => "FreeSpace": Number(free_space),
        "LAST_BACKUP_DATE" => "LastBackup": Timestamp(last_backup),
        "LOCK_ESC" => "LockEsc": Number(lock_esc),
        "PKG_HIT_RATIO" => "PkgHitRatio": Number(pkg_hit_ratio),
        "SORT_OVERFLOW" => "SortOverflow": Number(sort_overflow),
        "TOTAL_BUFFER_REQ" => "TotalBufferReq": Number(total_buffer_req),
        "TOTAL_PAGES" => "TotalPages": Number(total_pages),
        "TOT_FILE_SYSTEM_MB" => "TotalSpace": Number(total_space),
        "USABLE_PAGES" => "UsablePages": Number(usable_pages),
        "USED_DB_SPACE_MB" => "UsedSpace": Number(used_space),
        "USED_PAGES" => "UsedPages": Number(used_pages),
    }),
);

pub struct DbCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl DbCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }

    pub fn query() -> String {
        DB_FIELDS.select()
    }

    async fn db_metrics(&self) -> Result<Vec<DbMetric>, CollectError> {
        let out = self.executor.query(&self.target, &Self::query()).await?;
        DB_FIELDS.parse(&out, &self.target.zone)
    }
}

#[async_trait]
impl Collector for DbCollector {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let metrics = self.db_metrics().await?;

        let labels = &["dbname"];
        let total_space = gauge_vec(registry, "db", "space_total_bytes", "DB total space in bytes", labels)?;
        let used_space = gauge_vec(registry, "db", "space_used_bytes", "DB used space in bytes", labels)?;
        let free_space = gauge_vec(registry, "db", "space_free_bytes", "DB free space in bytes", labels)?;
        let total_pages = gauge_vec(registry, "db", "pages_total", "DB total pages", labels)?;
        let usable_pages = gauge_vec(registry, "db", "pages_usable", "DB usable pages", labels)?;
        let used_pages = gauge_vec(registry, "db", "pages_used", "DB used pages", labels)?;
        let free_pages = gauge_vec(registry, "db", "pages_free", "DB free pages", labels)?;
        let buffer_hit = gauge_vec(registry, "db", "buffer_hit_ratio", "DB buffer hit ratio (0.0-1.0)", labels)?;
        let buffer_requests = counter_vec(registry, "db", "buffer_requests_total", "DB total buffer requests", labels)?;
        let sort_overflow = gauge_vec(registry, "db", "sort_overflow", "DB sort overflow", labels)?;
        let lock_escalation = counter_vec(registry, "db", "lock_escalation_total", "DB total lock escalations", labels)?;
        let pkg_hit = gauge_vec(registry, "db", "pkg_hit_ratio", "DB pkg hit ratio (0.0-1.0)", labels)?;
        let last_backup = gauge_vec(
            registry,
            "db",
            "last_backup_timestamp_seconds",
            "Time since last backup in epoch",
            labels,
        )?;

        for m in &metrics {
            let name = [m.name.as_str()];
            total_space.with_label_values(&name).set(m.total_space);
            used_space.with_label_values(&name).set(m.used_space);
            free_space.with_label_values(&name).set(m.free_space);
            total_pages.with_label_values(&name).set(m.total_pages);
            usable_pages.with_label_values(&name).set(m.usable_pages);
            used_pages.with_label_values(&name).set(m.used_pages);
            free_pages.with_label_values(&name).set(m.free_pages);
            buffer_hit.with_label_values(&name).set(m.buff_hit_ratio);
            buffer_requests.with_label_values(&name).inc_by(m.total_buffer_req.max(0.0));
            sort_overflow.with_label_values(&name).set(m.sort_overflow);
            lock_escalation.with_label_values(&name).inc_by(m.lock_esc.max(0.0));
            pkg_hit.with_label_values(&name).set(m.pkg_hit_ratio);
            last_backup.with_label_values(&name).set(timestamp_seconds(m.last_backup));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::normalize::Zone;

    const DB_OUTPUT: &str = "88.6,TSMDB1,1000,2048,2020-03-22 05:50:00.000000,3,98.3,0,123456,5000,4096,4900,1024,4000\n";

    #[test]
    fn test_query_lists_sorted_columns() {
        assert_eq!(
            DbCollector::query(),
            "SELECT BUFF_HIT_RATIO,DATABASE_NAME,FREE_PAGES,FREE_SPACE_MB,LAST_BACKUP_DATE,LOCK_ESC,PKG_HIT_RATIO,SORT_OVERFLOW,TOTAL_BUFFER_REQ,TOTAL_PAGES,TOT_FILE_SYSTEM_MB,USABLE_PAGES,USED_DB_SPACE_MB,USED_PAGES FROM DB"
        );
    }

    #[test]
    fn test_parse_db_row() {
        let metrics = DB_FIELDS.parse(DB_OUTPUT, &Zone::named("UTC").unwrap()).unwrap();
        assert_eq!(metrics.len(), 1);
        let m = &metrics[0];
        assert_eq!(m.name, "TSMDB1");
        assert_eq!(m.buff_hit_ratio, 0.886);
        assert_eq!(m.pkg_hit_ratio, 0.983);
        assert_eq!(m.free_space, 2048.0 * 1048576.0);
        assert_eq!(m.total_space, 4096.0 * 1048576.0);
        assert_eq!(m.last_backup.unwrap().timestamp(), 1584856200);
    }

    #[tokio::test]
    async fn test_db_exposition() {
        let executor = ScriptedExecutor::new().reply("FROM DB", DB_OUTPUT);
        let collector = DbCollector::new(Arc::new(target()), Arc::new(executor));
        let registry = Registry::new();
        collector.collect(&registry).await.unwrap();

        let text = render(&registry);
        assert!(text.contains("tsm_db_buffer_hit_ratio{dbname=\"TSMDB1\"} 0.886"));
        assert!(text.contains("tsm_db_pkg_hit_ratio{dbname=\"TSMDB1\"} 0.983"));
        assert!(text.contains("tsm_db_buffer_requests_total{dbname=\"TSMDB1\"} 123456"));
        assert!(text.contains("tsm_db_lock_escalation_total{dbname=\"TSMDB1\"} 3"));
        assert!(text.contains("tsm_db_space_used_bytes{dbname=\"TSMDB1\"} 1073741824"));
        assert!(text.contains("tsm_db_last_backup_timestamp_seconds{dbname=\"TSMDB1\"} 1584856200"));
    }

    #[tokio::test]
    async fn test_never_backed_up_is_zero() {
        let out = "88.6,TSMDB1,1000,2048,,3,98.3,0,123456,5000,4096,4900,1024,4000\n";
        let executor = ScriptedExecutor::new().reply("FROM DB", out);
        let collector = DbCollector::new(Arc::new(target()), Arc::new(executor));
        let registry = Registry::new();
        collector.collect(&registry).await.unwrap();

        assert!(render(&registry).contains("tsm_db_last_backup_timestamp_seconds{dbname=\"TSMDB1\"} 0"));
    }

    #[tokio::test]
    async fn test_bad_number_fails_without_series() {
        let out = "88.6,TSMDB1,n/a,2048,,3,98.3,0,123456,5000,4096,4900,1024,4000\n";
        let executor = ScriptedExecutor::new().reply("FROM DB", out);
        let collector = DbCollector::new(Arc::new(target()), Arc::new(executor));
        let registry = Registry::new();

        let err = collector.collect(&registry).await.unwrap_err();
        assert!(matches!(err, CollectError::Parse(_)));
        assert!(registry.gather().is_empty());
    }
}
