//! Drives collector
//!
//! Tape drive online state, drive state and loaded volume from the `DRIVES`
//! table, optionally restricted to the target's library.
//!
//! ## Metrics
//!
//! - `tsm_drive_online{library,name}` - 1 when the drive is online
//! - `tsm_drive_state_info{library,name,state}` - 1 for the current drive state, 0 for every other
//! - `tsm_drive_volume_info{library,name,volume}` - Volume loaded in the drive

use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;

use super::{gauge_vec, quote, where_clause, Collector};
use crate::config::Target;
use crate::error_handling::CollectError;
use crate::executor::QueryExecutor;
use crate::mapper::{columns, FieldMap};

/// Drive states reported by the server, `unknown` catches everything else
pub const DRIVE_STATES: [&str; 6] = ["empty", "loaded", "unloaded", "reserved", "unavailable", "unknown"];

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DriveMetric {
    pub library: String,
    pub name: String,
    pub online: String,
    pub state: String,
    pub volume: String,
}

impl DriveMetric {
    pub fn is_online(&self) -> bool {
        self.online.eq_ignore_ascii_case("YES")
    }

    /// Lowercased state, mapped onto [`DRIVE_STATES`]
    pub fn normalized_state(&self) -> &'static str {
        let state = self.state.to_lowercase();
        DRIVE_STATES
            .iter()
            .copied()
            .find(|s| *s == state)
            .unwrap_or("unknown")
    }
}

static DRIVE_FIELDS: FieldMap<DriveMetric> = FieldMap::new(
    "DRIVES",
    columns!(DriveMetric {
        "LIBRARY_NAME" => "Library": Label(library),
        "DRIVE_NAME" => "Name": Label(name),
        "ONLINE" => "Online": Label(online),
        "DRIVE_STATE" => "State": Label(state),
        "VOLUME_NAME" => "Volume": Label(volume),
    }),
);

pub struct DrivesCollector {
    target: Arc<Target>,
    executor: Arc<dyn QueryExecutor>,
}

impl DrivesCollector {
    pub fn new(target: Arc<Target>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { target, executor }
    }

    pub fn query(target: &Target) -> String {
        let conditions: Vec<String> = target
            .library_name
            .iter()
            .map(|library| format!("LIBRARY_NAME={}", quote(library)))
            .collect();
        format!("{}{}", DRIVE_FIELDS.select(), where_clause(&conditions))
    }
}

#[async_trait]
impl Collector for DrivesCollector {
    fn name(&self) -> &'static str {
        "drives"
    }

    async fn collect(&self, registry: &Registry) -> Result<(), CollectError> {
        let out = self.executor.query(&self.target, &Self::query(&self.target)).await?;
        let drives = DRIVE_FIELDS.parse(&out, &self.target.zone)?;

        let online = gauge_vec(registry, "drive", "online", "Indicates if the drive is online", &["library", "name"])?;
        let state = gauge_vec(
            registry,
            "drive",
            "state_info",
            "Current state of the drive",
            &["library", "name", "state"],
        )?;
        let volume = gauge_vec(
            registry,
            "drive",
            "volume_info",
            "Current volume of the drive",
            &["library", "name", "volume"],
        )?;

        for drive in &drives {
            let library = drive.library.as_str();
            let name = drive.name.as_str();
            online
                .with_label_values(&[library, name])
                .set(if drive.is_online() { 1.0 } else { 0.0 });

            let current = drive.normalized_state();
            for s in DRIVE_STATES {
                state
                    .with_label_values(&[library, name, s])
                    .set(if s == current { 1.0 } else { 0.0 });
            }

            if !drive.volume.is_empty() {
                volume.with_label_values(&[library, name, drive.volume.as_str()]).set(1.0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn test_query_library_clause() {
        let mut t = target();
        assert_eq!(
            DrivesCollector::query(&t),
            "SELECT LIBRARY_NAME,DRIVE_NAME,ONLINE,DRIVE_STATE,VOLUME_NAME FROM DRIVES"
        );
        t.library_name = Some("LIB1".into());
        assert!(DrivesCollector::query(&t).ends_with(" FROM DRIVES WHERE LIBRARY_NAME='LIB1'"));
    }

    #[tokio::test]
    async fn test_drive_series() {
        let out = "LIB1,TAPE01,YES,LOADED,E00001L6\nLIB1,TAPE02,NO,EMPTY,\nLIB1,TAPE03,YES,BROKEN,\n";
        let executor = ScriptedExecutor::new().reply("FROM DRIVES", out);
        let collector = DrivesCollector::new(Arc::new(target()), Arc::new(executor));
        let registry = Registry::new();
        collector.collect(&registry).await.unwrap();

        let text = render(&registry);
        assert!(text.contains("tsm_drive_online{library=\"LIB1\",name=\"TAPE01\"} 1"));
        assert!(text.contains("tsm_drive_online{library=\"LIB1\",name=\"TAPE02\"} 0"));
        assert!(text.contains("tsm_drive_state_info{library=\"LIB1\",name=\"TAPE01\",state=\"loaded\"} 1"));
        assert!(text.contains("tsm_drive_state_info{library=\"LIB1\",name=\"TAPE01\",state=\"empty\"} 0"));
        assert!(text.contains("tsm_drive_state_info{library=\"LIB1\",name=\"TAPE03\",state=\"unknown\"} 1"));
        assert!(text.contains("tsm_drive_volume_info{library=\"LIB1\",name=\"TAPE01\",volume=\"E00001L6\"} 1"));
        assert!(!text.contains("name=\"TAPE02\",volume="));
    }
}
