//! Configuration module for the exporter
//! Loads the YAML target file and validates every target up front

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::error_handling::{ExporterError, ExporterResult};
use crate::normalize::Zone;

/// Parsed target file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub targets: HashMap<String, Target>,
}

/// One configured TSM server
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Target {
    /// Name the target is requested by; filled from the map key
    #[serde(skip)]
    pub name: String,
    /// `-SERVERName` passed to dsmadmc, defaults to the target name
    #[serde(default)]
    pub servername: Option<String>,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub password: String,
    /// Restricts drive and library volume queries to one library
    #[serde(default)]
    pub library_name: Option<String>,
    /// Restricts event queries to these schedules
    #[serde(default)]
    pub schedules: Vec<String>,
    /// Restricts replication queries to these nodes
    #[serde(default)]
    pub replication_node_names: Vec<String>,
    /// Explicit collector allow-list; `None` means the default-enabled set
    #[serde(default)]
    pub collectors: Option<Vec<String>>,
    /// Volume class name to volume name pattern
    #[serde(default)]
    pub volumeusage_map: BTreeMap<String, String>,
    /// IANA zone used to read server timestamps
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(skip)]
    pub zone: Zone,
    #[serde(skip)]
    pub volume_classes: Vec<(String, Regex)>,
}

impl Target {
    /// Build a target directly, mostly for tests and embedding
    pub fn new<N, I, P>(name: N, id: I, password: P) -> Self
    where
        N: Into<String>,
        I: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            id: id.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Server name handed to dsmadmc
    pub fn servername(&self) -> &str {
        self.servername.as_deref().unwrap_or(&self.name)
    }

    /// Check required fields and compile derived state
    pub fn validate(&mut self) -> ExporterResult<()> {
        if self.id.is_empty() {
            return Err(ExporterError::configuration(format!(
                "Target {} must define 'id' value",
                self.name
            )));
        }
        if self.password.is_empty() {
            return Err(ExporterError::configuration(format!(
                "Target {} must define 'password' value",
                self.name
            )));
        }

        self.zone = match &self.timezone {
            Some(tz) => Zone::named(tz).map_err(|e| {
                ExporterError::configuration_with_source(
                    format!("Target {} has invalid timezone {:?}", self.name, tz),
                    anyhow::anyhow!(e),
                )
            })?,
            None => Zone::Local,
        };

        self.volume_classes = self
            .volumeusage_map
            .iter()
            .map(|(class, pattern)| {
                Regex::new(pattern)
                    .map(|re| (class.clone(), re))
                    .map_err(|e| {
                        ExporterError::configuration_with_source(
                            format!(
                                "Target {} has invalid volumeusage_map pattern {:?} for {}",
                                self.name, pattern, class
                            ),
                            e.into(),
                        )
                    })
            })
            .collect::<ExporterResult<Vec<_>>>()?;

        Ok(())
    }
}

impl Config {
    /// Load and validate the target file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ExporterResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExporterError::configuration_with_source(
                format!("Failed to read configuration file {}", path.display()),
                e.into(),
            )
        })?;
        let config = Self::from_yaml(&content)?;
        info!("Loaded {} targets from {}", config.targets.len(), path.display());
        Ok(config)
    }

    /// Parse and validate YAML content
    pub fn from_yaml(content: &str) -> ExporterResult<Self> {
        let mut config: Config = serde_yaml::from_str(content).map_err(|e| {
            ExporterError::configuration_with_source("Failed to parse configuration", e.into())
        })?;

        for (name, target) in config.targets.iter_mut() {
            target.name = name.clone();
            target.validate()?;
        }

        Ok(config)
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }
}
