//! Events collector
//!
//! Correlates the most recent completed run of every schedule with the
//! number of runs since yesterday that did not complete.
//!
//! ## Metrics
//!
//! - `tsm_schedule_duration_seconds{schedule}` - Duration of the last completed run
//! - `tsm_schedule_start_timestamp_seconds{schedule}` - Start of the last completed run
//! - `tsm_schedule_end_timestamp_seconds{schedule}` - End of the last completed run
//! - `tsm_schedule_notcompleted_count{schedule}` - Runs since yesterday that did not complete

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prometheus::Registry;

use super::{between, gauge_vec, in_filter, quote, since_yesterday, where_clause, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};
use crate::normalize::{duration_seconds, end_after_start, timestamp_seconds};

/// Event statuses counted as not completed
pub const NOT_COMPLETED_STATUSES: [&str; 9] = [
    "Failed",
    "Failed - no restart",
    "In Progress",
    "Missed",
    "Pending",
    "Restarted",
    "Severed",
    "Started",
    "Uncertain",
];

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompletedEvent {
    pub schedule: String,
    pub actual_start: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NotCompletedEvent {
    pub schedule: String,
    pub status: String,
}

static COMPLETED_FIELDS: FieldMap<CompletedEvent> = FieldMap::new(
    "EVENTS",
    columns!(CompletedEvent {
        "SCHEDULE_NAME" => "Schedule": Label(schedule),
        "ACTUAL_START" => "ActualStart": Timestamp(actual_start),
        "COMPLETED" => "Completed": Timestamp(completed),
    }),
);

static NOT_COMPLETED_FIELDS: FieldMap<NotCompletedEvent> = FieldMap::new(
    "EVENTS",
    columns!(NotCompletedEvent {
        "SCHEDULE_NAME" => "Schedule": Label(schedule),
        "STATUS" => "Status": Label(status),
    }),
);

/// Joined view of one schedule
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScheduleMetric {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub not_completed: f64,
}

impl ScheduleMetric {
    pub fn duration(&self) -> f64 {
        duration_seconds(self.start, self.end)
    }
}

/// Join both result sets by schedule name.
///
/// The first completed row per schedule wins, so completed rows must arrive
/// newest first. Schedules only present on one side keep zero values for
/// the other.
pub fn correlate(
    completed: Vec<CompletedEvent>,
    not_completed: Vec<NotCompletedEvent>,
) -> BTreeMap<String, ScheduleMetric> {
    let mut schedules: BTreeMap<String, ScheduleMetric> = BTreeMap::new();
    for event in completed {
        schedules.entry(event.schedule).or_insert_with(|| ScheduleMetric {
            start: event.actual_start,
            end: end_after_start(event.actual_start, event.completed),
            not_completed: 0.0,
        });
    }
    for event in not_completed {
        schedules.entry(event.schedule).or_default().not_completed += 1.0;
    }
    schedules
}

pub struct EventsCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl EventsCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }

    pub fn completed_query(target: &Target) -> String {
        let mut conditions = vec!["STATUS='Completed'".to_string()];
        conditions.extend(in_filter("SCHEDULE_NAME", &target.schedules));
        format!(
            "{}{} ORDER BY COMPLETED DESC",
            COMPLETED_FIELDS.select(),
            where_clause(&conditions)
        )
    }

    pub fn not_completed_query(target: &Target) -> String {
        let (from, to) = since_yesterday(&target.zone);
        let statuses: Vec<String> = NOT_COMPLETED_STATUSES.iter().map(|s| quote(s)).collect();
        let mut conditions = vec![
            between("SCHEDULED_START", &from, &to),
            format!("STATUS IN ({})", statuses.join(",")),
        ];
        conditions.extend(in_filter("SCHEDULE_NAME", &target.schedules));
        format!("{}{}", NOT_COMPLETED_FIELDS.select(), where_clause(&conditions))
    }

    async fn schedules(&self) -> Result<BTreeMap<String, ScheduleMetric>, CollectError> {
        let completed_query = Self::completed_query(&self.target);
        let not_completed_query = Self::not_completed_query(&self.target);
        let (completed, not_completed) = tokio::try_join!(
            self.executor.query(&self.target, &completed_query),
            self.executor.query(&self.target, &not_completed_query),
        )?;

        let zone = &self.target.zone;
        Ok(correlate(
            COMPLETED_FIELDS.parse(&completed, zone)?,
            NOT_COMPLETED_FIELDS.parse(&not_completed, zone)?,
        ))
    }
}

#[async_trait]
impl Collector for EventsCollector {
    fn name(&self) -> &'static str {
        "events"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let schedules = self.schedules().await?;

        let labels = &["schedule"];
        let duration = gauge_vec(registry, "schedule", "duration_seconds", "Amount of time taken to complete the most recent completed event", labels)?;
        let start = gauge_vec(registry, "schedule", "start_timestamp_seconds", "Start time of the most recent completed event", labels)?;
        let end = gauge_vec(registry, "schedule", "end_timestamp_seconds", "Completion time of the most recent completed event", labels)?;
        let not_completed = gauge_vec(registry, "schedule", "notcompleted_count", "Number of not completed events since yesterday", labels)?;

        for (schedule, metric) in &schedules {
            let labels = [schedule.as_str()];
            duration.with_label_values(&labels).set(metric.duration());
            start.with_label_values(&labels).set(timestamp_seconds(metric.start));
            end.with_label_values(&labels).set(timestamp_seconds(metric.end));
            not_completed.with_label_values(&labels).set(metric.not_completed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::normalize::{parse_timestamp, Zone};

    fn ts(value: &str) -> Option<DateTime<Utc>> {
        parse_timestamp(value, &Zone::named("UTC").unwrap()).unwrap()
    }

    #[test]
    fn test_correlate_first_seen_wins_and_missing_side_is_zero() {
        let completed = vec![
            CompletedEvent {
                schedule: "NIGHTLY".into(),
                actual_start: ts("2020-03-26 01:00:00.000000"),
                completed: ts("2020-03-26 02:00:00.000000"),
            },
            CompletedEvent {
                schedule: "NIGHTLY".into(),
                actual_start: ts("2020-03-25 01:00:00.000000"),
                completed: ts("2020-03-25 01:30:00.000000"),
            },
        ];
        let not_completed = vec![
            NotCompletedEvent {
                schedule: "WEEKLY".into(),
                status: "Missed".into(),
            },
            NotCompletedEvent {
                schedule: "WEEKLY".into(),
                status: "Failed".into(),
            },
        ];

        let schedules = correlate(completed, not_completed);
        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules["NIGHTLY"].duration(), 3600.0);
        assert_eq!(schedules["NIGHTLY"].not_completed, 0.0);
        assert_eq!(schedules["WEEKLY"].not_completed, 2.0);
        assert_eq!(schedules["WEEKLY"].duration(), 0.0);
        assert_eq!(schedules["WEEKLY"].start, None);
    }

    #[test]
    fn test_queries_apply_schedule_filter() {
        let mut t = target();
        t.schedules = vec!["NIGHTLY".into()];
        assert_eq!(
            EventsCollector::completed_query(&t),
            "SELECT SCHEDULE_NAME,ACTUAL_START,COMPLETED FROM EVENTS WHERE STATUS='Completed' AND SCHEDULE_NAME IN ('NIGHTLY') ORDER BY COMPLETED DESC"
        );

        let query = EventsCollector::not_completed_query(&t);
        assert!(query.starts_with("SELECT SCHEDULE_NAME,STATUS FROM EVENTS WHERE SCHEDULED_START BETWEEN '"));
        assert!(query.contains("STATUS IN ('Failed','Failed - no restart','In Progress','Missed','Pending','Restarted','Severed','Started','Uncertain')"));
        assert!(query.ends_with(" AND SCHEDULE_NAME IN ('NIGHTLY')"));
    }

    #[tokio::test]
    async fn test_event_series() {
        let executor = ScriptedExecutor::new()
            .reply(
                "STATUS='Completed'",
                "NIGHTLY,2020-03-26 13:00:00.000000,2020-03-26 13:33:19.000000\n",
            )
            .reply("STATUS IN (", "NIGHTLY,Missed\nWEEKLY,Failed\n");
        let collector = EventsCollector::new(Arc::new(target()), Arc::new(executor));
        let registry = Registry::new();
        collector.collect(&registry).await.unwrap();

        let text = render(&registry);
        assert!(text.contains("tsm_schedule_duration_seconds{schedule=\"NIGHTLY\"} 1999"));
        assert!(text.contains("tsm_schedule_end_timestamp_seconds{schedule=\"NIGHTLY\"} 1585229599"));
        assert!(text.contains("tsm_schedule_notcompleted_count{schedule=\"NIGHTLY\"} 1"));
        assert!(text.contains("tsm_schedule_notcompleted_count{schedule=\"WEEKLY\"} 1"));
        assert!(text.contains("tsm_schedule_start_timestamp_seconds{schedule=\"WEEKLY\"} 0"));
    }

    #[tokio::test]
    async fn test_either_query_failing_fails_collector() {
        let executor = ScriptedExecutor::new()
            .reply("STATUS='Completed'", "")
            .timeout("STATUS IN (");
        let collector = EventsCollector::new(Arc::new(target()), Arc::new(executor));
        let registry = Registry::new();

        let err = collector.collect(&registry).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(registry.gather().is_empty());
    }
}
