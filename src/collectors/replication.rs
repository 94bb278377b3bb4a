//! Replication collector
//!
//! Joins the most recent completed replication of every node file space
//! with the replications since yesterday that have not completed.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prometheus::Registry;

use super::{between, gauge_vec, in_filter, since_yesterday, where_clause, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};
use crate::normalize::{duration_seconds, end_after_start, timestamp_seconds};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplicationViewMetric {
    pub node_name: String,
    pub fs_name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub replicated_files: f64,
    pub replicated_bytes: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IncompleteReplication {
    pub node_name: String,
    pub fs_name: String,
}

static COMPLETED_FIELDS: FieldMap<ReplicationViewMetric> = FieldMap::new(
    "REPLICATIONVIEW",
    columns!(ReplicationViewMetric {
        "NODE_NAME" => "NodeName": Label(node_name),
        "FSNAME" => "FsName": Label(fs_name),
        "START_TIME" => "StartTime": Timestamp(start_time),
        "END_TIME" => "EndTime": Timestamp(end_time),
        "TOTFILES_REPLICATED" => "ReplicatedFiles": Number(replicated_files),
        "TOTBYTES_REPLICATED" => "ReplicatedBytes": Number(replicated_bytes),
    }),
);

static INCOMPLETE_FIELDS: FieldMap<IncompleteReplication> = FieldMap::new(
    "REPLICATIONVIEW",
    columns!(IncompleteReplication {
        "NODE_NAME" => "NodeName": Label(node_name),
        "FSNAME" => "FsName": Label(fs_name),
    }),
);

/// Joined view of one node file space
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplicationMetric {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub replicated_files: f64,
    pub replicated_bytes: f64,
    pub not_completed: f64,
}

/// Join completed (newest first) and incomplete rows by node and file space
pub fn correlate(
    completed: Vec<ReplicationViewMetric>,
    incomplete: Vec<IncompleteReplication>,
) -> BTreeMap<(String, String), ReplicationMetric> {
    let mut replications: BTreeMap<(String, String), ReplicationMetric> = BTreeMap::new();
    for r in completed {
        replications
            .entry((r.node_name, r.fs_name))
            .or_insert_with(|| ReplicationMetric {
                start: r.start_time,
                end: end_after_start(r.start_time, r.end_time),
                replicated_files: r.replicated_files,
                replicated_bytes: r.replicated_bytes,
                not_completed: 0.0,
            });
    }
    for r in incomplete {
        replications
            .entry((r.node_name, r.fs_name))
            .or_default()
            .not_completed += 1.0;
    }
    replications
}

pub struct ReplicationCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl ReplicationCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }

    pub fn completed_query(target: &Target) -> String {
        let mut conditions = vec!["COMP_STATE='COMPLETE'".to_string()];
        conditions.extend(in_filter("NODE_NAME", &target.replication_node_names));
        format!(
            "{}{} ORDER BY END_TIME DESC",
            COMPLETED_FIELDS.select(),
            where_clause(&conditions)
        )
    }

    pub fn incomplete_query(target: &Target) -> String {
        let (from, to) = since_yesterday(&target.zone);
        let mut conditions = vec![
            "COMP_STATE<>'COMPLETE'".to_string(),
            between("START_TIME", &from, &to),
        ];
        conditions.extend(in_filter("NODE_NAME", &target.replication_node_names));
        format!("{}{}", INCOMPLETE_FIELDS.select(), where_clause(&conditions))
    }
}

#[async_trait]
impl Collector for ReplicationCollector {
    fn name(&self) -> &'static str {
        "replication"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let completed_query = Self::completed_query(&self.target);
        let incomplete_query = Self::incomplete_query(&self.target);
        let (completed, incomplete) = tokio::try_join!(
            self.executor.query(&self.target, &completed_query),
            self.executor.query(&self.target, &incomplete_query),
        )?;
        let zone = &self.target.zone;
        let replications = correlate(
            COMPLETED_FIELDS.parse(&completed, zone)?,
            INCOMPLETE_FIELDS.parse(&incomplete, zone)?,
        );

        let labels = &["nodename", "fsname"];
        let duration = gauge_vec(registry, "replication", "duration_seconds", "Amount of time taken to complete the most recent replication", labels)?;
        let not_completed = gauge_vec(registry, "replication", "not_completed", "Number of replications not completed for today", labels)?;
        let start = gauge_vec(registry, "replication", "start_timestamp_seconds", "Start time of replication", labels)?;
        let end = gauge_vec(registry, "replication", "end_timestamp_seconds", "End time of replication", labels)?;
        let bytes = gauge_vec(registry, "replication", "replicated_bytes", "Amount of data replicated in bytes", labels)?;
        let files = gauge_vec(registry, "replication", "replicated_files", "Number of files replicated", labels)?;

        for ((node, fs), r) in &replications {
            let labels = [node.as_str(), fs.as_str()];
            duration.with_label_values(&labels).set(duration_seconds(r.start, r.end));
            not_completed.with_label_values(&labels).set(r.not_completed);
            start.with_label_values(&labels).set(timestamp_seconds(r.start));
            end.with_label_values(&labels).set(timestamp_seconds(r.end));
            bytes.with_label_values(&labels).set(r.replicated_bytes);
            files.with_label_values(&labels).set(r.replicated_files);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn test_queries() {
        let mut t = target();
        t.replication_node_names = vec!["NODE1".into(), "NODE2".into()];
        assert_eq!(
            ReplicationCollector::completed_query(&t),
            "SELECT NODE_NAME,FSNAME,START_TIME,END_TIME,TOTFILES_REPLICATED,TOTBYTES_REPLICATED FROM REPLICATIONVIEW WHERE COMP_STATE='COMPLETE' AND NODE_NAME IN ('NODE1','NODE2') ORDER BY END_TIME DESC"
        );
        let incomplete = ReplicationCollector::incomplete_query(&t);
        assert!(incomplete.starts_with("SELECT NODE_NAME,FSNAME FROM REPLICATIONVIEW WHERE COMP_STATE<>'COMPLETE' AND START_TIME BETWEEN '"));
        assert!(incomplete.ends_with("AND NODE_NAME IN ('NODE1','NODE2')"));
    }

    #[tokio::test]
    async fn test_replication_series() {
        let completed = "\
NODE1,/home,2020-03-26 13:00:00.000000,2020-03-26 13:33:19.000000,100,2048
NODE1,/home,2020-03-25 13:00:00.000000,2020-03-25 13:10:00.000000,5,10
NODE2,/data,2020-03-26 14:00:00.000000,2020-03-26 13:00:00.000000,0,0
";
        let executor = ScriptedExecutor::new()
            .reply("COMP_STATE='COMPLETE'", completed)
            .reply("COMP_STATE<>'COMPLETE'", "NODE3,/scratch\nNODE3,/scratch\n");
        let collector = ReplicationCollector::new(Arc::new(target()), Arc::new(executor));
        let registry = Registry::new();
        collector.collect(&registry).await.unwrap();

        let text = render(&registry);
        assert!(text.contains("tsm_replication_duration_seconds{fsname=\"/home\",nodename=\"NODE1\"} 1999"));
        assert!(text.contains("tsm_replication_replicated_bytes{fsname=\"/home\",nodename=\"NODE1\"} 2048"));
        assert!(text.contains("tsm_replication_replicated_files{fsname=\"/home\",nodename=\"NODE1\"} 100"));
        assert!(text.contains("tsm_replication_end_timestamp_seconds{fsname=\"/data\",nodename=\"NODE2\"} 0"));
        assert!(text.contains("tsm_replication_duration_seconds{fsname=\"/data\",nodename=\"NODE2\"} 0"));
        assert!(text.contains("tsm_replication_not_completed{fsname=\"/scratch\",nodename=\"NODE3\"} 2"));
        assert!(text.contains("tsm_replication_replicated_bytes{fsname=\"/scratch\",nodename=\"NODE3\"} 0"));
    }
}
