//! Collectors
//!
//! One collector per metric domain. Each collector issues its dsmadmc
//! queries through the injected [`QueryExecutor`], maps the rows into typed
//! records and registers its metric families into the per-request registry
//! only once the whole pipeline succeeded.
//!
//! [`CollectorRegistry`] knows every collector by name together with its
//! default enablement; [`TsmCollector`] runs the enabled subset for one
//! target and adds the `tsm_exporter_collect_*` outcome series.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use prometheus::{CounterVec, Gauge, GaugeVec, Opts, Registry};
use tracing::{debug, error, warn};

use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::normalize::{Zone, QUERY_TIMESTAMP_FORMAT};

pub mod db;
pub mod drives;
pub mod events;
pub mod libvolumes;
pub mod log;
pub mod occupancy;
pub mod replication;
pub mod status;
pub mod stgpools;
pub mod summary;
pub mod volumes;
pub mod volumeusage;

pub use db::DbCollector;
pub use drives::DrivesCollector;
pub use events::EventsCollector;
pub use libvolumes::LibVolumesCollector;
pub use log::LogCollector;
pub use occupancy::OccupancyCollector;
pub use replication::ReplicationCollector;
pub use status::StatusCollector;
pub use stgpools::StgPoolsCollector;
pub use summary::SummaryCollector;
pub use volumes::VolumesCollector;
pub use volumeusage::VolumeUsageCollector;

/// Metric namespace shared by every series
pub const NAMESPACE: &str = "tsm";

/// A single metric domain
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Query, map and register this domain's series into `registry`
    async fn collect(&self, registry: &Registry) -> Result<(), CollectError>;
}

/// Builds a collector bound to one target
pub type CollectorFactory = fn(Arc<Target>, Arc<dyn QueryExecutor>) -> Box<dyn Collector>;

struct Registration {
    enabled: bool,
    factory: CollectorFactory,
}

/// Name to (enabled, factory) table for every known collector
pub struct CollectorRegistry {
    collectors: BTreeMap<&'static str, Registration>,
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn boxed<C: Collector + 'static>(collector: C) -> Box<dyn Collector> {
    Box::new(collector)
}

impl CollectorRegistry {
    /// Registry without any collectors
    pub fn empty() -> Self {
        Self {
            collectors: BTreeMap::new(),
        }
    }

    /// Registry holding all twelve collectors with their default enablement
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("status", true, |t, e| boxed(StatusCollector::new(t, e)));
        registry.register("volumes", true, |t, e| boxed(VolumesCollector::new(t, e)));
        registry.register("db", true, |t, e| boxed(DbCollector::new(t, e)));
        registry.register("log", true, |t, e| boxed(LogCollector::new(t, e)));
        registry.register("drives", true, |t, e| boxed(DrivesCollector::new(t, e)));
        registry.register("libvolumes", true, |t, e| boxed(LibVolumesCollector::new(t, e)));
        registry.register("events", true, |t, e| boxed(EventsCollector::new(t, e)));
        registry.register("replication", true, |t, e| boxed(ReplicationCollector::new(t, e)));
        registry.register("occupancy", false, |t, e| boxed(OccupancyCollector::new(t, e)));
        registry.register("stgpools", true, |t, e| boxed(StgPoolsCollector::new(t, e)));
        registry.register("summary", true, |t, e| boxed(SummaryCollector::new(t, e)));
        registry.register("volumeusage", false, |t, e| boxed(VolumeUsageCollector::new(t, e)));
        registry
    }

    pub fn register(&mut self, name: &'static str, enabled_by_default: bool, factory: CollectorFactory) {
        self.collectors.insert(
            name,
            Registration {
                enabled: enabled_by_default,
                factory,
            },
        );
    }

    /// Override the default enablement; returns false for an unknown name
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.collectors.get_mut(name) {
            Some(registration) => {
                registration.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.collectors.get(name).map_or(false, |r| r.enabled)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.collectors.keys().copied()
    }

    /// Instantiate the collectors active for `target`.
    ///
    /// A target allow-list selects exactly the listed collectors regardless
    /// of their default; without one the enabled set is used.
    pub fn build(&self, target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> TsmCollector {
        let selected: Vec<(&'static str, &Registration)> = match &target.collectors {
            Some(names) => names
                .iter()
                .filter_map(|name| match self.collectors.get_key_value(name.as_str()) {
                    Some((name, registration)) => Some((*name, registration)),
                    None => {
                        warn!(target_name = %target.name, collector = %name, "Unknown collector in target configuration");
                        None
                    }
                })
                .collect(),
            None => self
                .collectors
                .iter()
                .filter(|(_, registration)| registration.enabled)
                .map(|(name, registration)| (*name, registration))
                .collect(),
        };

        let mut collectors: Vec<Box<dyn Collector>> = Vec::with_capacity(selected.len());
        for (name, registration) in selected {
            if collectors.iter().any(|c| c.name() == name) {
                continue;
            }
            collectors.push((registration.factory)(Arc::clone(&target), Arc::clone(&executor)));
        }

        TsmCollector { target, collectors }
    }
}

/// The collectors selected for one target
pub struct TsmCollector {
    target: Arc<Target>,
    collectors: Vec<Box<dyn Collector>>,
}

impl TsmCollector {
    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Run every collector concurrently and return a fresh registry holding
    /// their series plus the outcome triad.
    pub async fn gather(&self) -> Result<Registry, prometheus::Error> {
        let registry = Registry::new();

        let errors = outcome_gauge("collect_error", "Indicates the collector had an error")?;
        let timeouts = outcome_gauge("collect_timeout", "Indicates the collector timed out")?;
        let durations = outcome_gauge("collect_duration_seconds", "Collector time duration")?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(timeouts.clone()))?;
        registry.register(Box::new(durations.clone()))?;

        let runs = self.collectors.iter().map(|collector| {
            let registry = &registry;
            async move {
                let name = collector.name();
                debug!(target_name = %self.target.name, collector = name, "Collector starting");
                let start = Instant::now();
                let result = collector.collect(registry).await;
                (name, result, start.elapsed().as_secs_f64())
            }
        });

        for (name, result, elapsed) in futures::future::join_all(runs).await {
            let (error, timeout) = match &result {
                Ok(()) => (0.0, 0.0),
                Err(e) if e.is_timeout() => {
                    error!(target_name = %self.target.name, collector = name, "Timeout executing dsmadmc");
                    (0.0, 1.0)
                }
                Err(e) => {
                    error!(target_name = %self.target.name, collector = name, error = %e, "Collector failed");
                    (1.0, 0.0)
                }
            };
            errors.with_label_values(&[name]).set(error);
            timeouts.with_label_values(&[name]).set(timeout);
            durations.with_label_values(&[name]).set(elapsed);
            debug!(target_name = %self.target.name, collector = name, elapsed, "Collector finished");
        }

        Ok(registry)
    }
}

fn outcome_gauge(name: &str, help: &str) -> Result<GaugeVec, prometheus::Error> {
    GaugeVec::new(
        Opts::new(name, help).namespace(NAMESPACE).subsystem("exporter"),
        &["collector"],
    )
}

/// Create a `tsm_<subsystem>_<name>` gauge family and register it
pub(crate) fn gauge_vec(
    registry: &Registry,
    subsystem: &str,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, prometheus::Error> {
    let gauge = GaugeVec::new(
        Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem),
        labels,
    )?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Label-less variant of [`gauge_vec`]
pub(crate) fn gauge(registry: &Registry, subsystem: &str, name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    let gauge = Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

pub(crate) fn counter_vec(
    registry: &Registry,
    subsystem: &str,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<CounterVec, prometheus::Error> {
    let counter = CounterVec::new(
        Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem),
        labels,
    )?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Quote a literal for a dsmadmc SELECT
pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `COLUMN IN ('a','b')`, or nothing for an empty list
pub(crate) fn in_filter(column: &str, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
    Some(format!("{} IN ({})", column, quoted.join(",")))
}

pub(crate) fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// `COLUMN BETWEEN '<from>' AND '<to>'` in server local time
pub(crate) fn between(column: &str, from: &NaiveDateTime, to: &NaiveDateTime) -> String {
    format!(
        "{} BETWEEN '{}' AND '{}'",
        column,
        from.format(QUERY_TIMESTAMP_FORMAT),
        to.format(QUERY_TIMESTAMP_FORMAT)
    )
}

/// Yesterday midnight through now
pub(crate) fn since_yesterday(zone: &Zone) -> (NaiveDateTime, NaiveDateTime) {
    let now = zone.now();
    let yesterday = now.date() - Duration::days(1);
    (NaiveDateTime::new(yesterday, NaiveTime::MIN), now)
}

/// The trailing 24 hours
pub(crate) fn last_day(zone: &Zone) -> (NaiveDateTime, NaiveDateTime) {
    let now = zone.now();
    (now - Duration::days(1), now)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use prometheus::{Encoder, Registry, TextEncoder};

    use crate::config::Target;
    use crate::error_handling::QueryError;
    use crate::executor::QueryExecutor;

    pub enum Reply {
        Output(String),
        Timeout,
        Fail,
    }

    /// Answers queries by the first registered fragment they contain
    #[derive(Default)]
    pub struct ScriptedExecutor {
        replies: Vec<(String, Reply)>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, fragment: &str, output: &str) -> Self {
            self.replies.push((fragment.to_string(), Reply::Output(output.to_string())));
            self
        }

        pub fn timeout(mut self, fragment: &str) -> Self {
            self.replies.push((fragment.to_string(), Reply::Timeout));
            self
        }

        pub fn fail(mut self, fragment: &str) -> Self {
            self.replies.push((fragment.to_string(), Reply::Fail));
            self
        }

        pub fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn query(&self, _target: &Target, query: &str) -> Result<String, QueryError> {
            self.queries.lock().unwrap().push(query.to_string());
            match self.replies.iter().find(|(fragment, _)| query.contains(fragment.as_str())) {
                Some((_, Reply::Output(out))) => Ok(out.clone()),
                Some((_, Reply::Timeout)) => Err(QueryError::Timeout {
                    timeout: std::time::Duration::from_secs(5),
                }),
                Some((_, Reply::Fail)) | None => Err(QueryError::Failed {
                    status: Some(8),
                    stderr: format!("no scripted reply for {query}"),
                    stdout: String::new(),
                }),
            }
        }
    }

    pub fn target() -> Target {
        let mut target = Target::new("test", "admin", "secret");
        target.zone = crate::normalize::Zone::named("UTC").unwrap();
        target
    }

    pub fn render(registry: &Registry) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}
