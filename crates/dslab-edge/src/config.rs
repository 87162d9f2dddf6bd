//! Simulation configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SimError};

/// How often buffered metrics are written to log files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDumpInterval", into = "RawDumpInterval")]
pub enum DumpInterval {
    /// Flush every N ticks (N > 0).
    Ticks(u64),
    /// Never flush, keep all metrics in memory.
    Infinite,
}

impl DumpInterval {
    /// Whether buffered metrics should be flushed after the specified tick.
    pub fn is_due(&self, tick: u64) -> bool {
        match self {
            DumpInterval::Ticks(interval) => tick.checked_rem(*interval) == Some(0),
            DumpInterval::Infinite => false,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, DumpInterval::Ticks(_))
    }

    /// Checks that the interval is positive.
    pub fn validate(&self) -> Result<()> {
        match self {
            DumpInterval::Ticks(0) => Err(SimError::InvalidDumpInterval("0".to_string())),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for DumpInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpInterval::Ticks(interval) => write!(f, "{}", interval),
            DumpInterval::Infinite => f.write_str("inf"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawDumpInterval {
    Ticks(u64),
    Named(String),
}

impl TryFrom<RawDumpInterval> for DumpInterval {
    type Error = SimError;

    fn try_from(raw: RawDumpInterval) -> Result<Self> {
        match raw {
            RawDumpInterval::Ticks(0) => Err(SimError::InvalidDumpInterval("0".to_string())),
            RawDumpInterval::Ticks(interval) => Ok(DumpInterval::Ticks(interval)),
            RawDumpInterval::Named(name) => match name.to_lowercase().as_str() {
                "inf" | "infinity" | "infinite" => Ok(DumpInterval::Infinite),
                _ => Err(SimError::InvalidDumpInterval(name)),
            },
        }
    }
}

impl From<DumpInterval> for RawDumpInterval {
    fn from(interval: DumpInterval) -> Self {
        match interval {
            DumpInterval::Ticks(interval) => RawDumpInterval::Ticks(interval),
            DumpInterval::Infinite => RawDumpInterval::Named("inf".to_string()),
        }
    }
}

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawSimulationConfig {
    pub dump_interval: Option<DumpInterval>,
    pub tick_unit: Option<String>,
    pub tick_duration: Option<f64>,
    pub logs_directory: Option<PathBuf>,
    pub resource_management_algorithm: Option<String>,
    pub resource_management_algorithm_parameters: Option<IndexMap<String, Value>>,
}

/// Represents simulation config.
///
/// Hooks (resource management algorithm, stopping criterion, metrics collectors) are not part of the config and
/// are passed to [`EdgeSimulation`](crate::simulation::EdgeSimulation) directly.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Number of ticks between writing buffered metrics to log files.
    pub dump_interval: DumpInterval,
    /// Name of the time unit represented by one tick, descriptive only.
    pub tick_unit: String,
    /// Duration of one tick in tick units, descriptive only.
    pub tick_duration: f64,
    /// Directory for metrics log files.
    /// Use distinct directories to run several simulations in parallel.
    pub logs_directory: PathBuf,
    /// Name of the placement algorithm used as resource management algorithm (FirstFit, BestFit, WorstFit).
    pub resource_management_algorithm: Option<String>,
    /// Extra parameters passed to the resource management algorithm on every tick.
    pub resource_management_algorithm_parameters: IndexMap<String, Value>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dump_interval: DumpInterval::Ticks(100),
            tick_unit: "seconds".to_string(),
            tick_duration: 1.,
            logs_directory: PathBuf::from("logs"),
            resource_management_algorithm: None,
            resource_management_algorithm_parameters: IndexMap::new(),
        }
    }
}

impl SimulationConfig {
    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Creates simulation config from YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawSimulationConfig = serde_yaml::from_str(yaml)?;
        let default = Self::default();
        Ok(Self {
            dump_interval: raw.dump_interval.unwrap_or(default.dump_interval),
            tick_unit: raw.tick_unit.unwrap_or(default.tick_unit),
            tick_duration: raw.tick_duration.unwrap_or(default.tick_duration),
            logs_directory: raw.logs_directory.unwrap_or(default.logs_directory),
            resource_management_algorithm: raw.resource_management_algorithm,
            resource_management_algorithm_parameters: raw.resource_management_algorithm_parameters.unwrap_or_default(),
        })
    }

    pub fn with_dump_interval(mut self, dump_interval: DumpInterval) -> Self {
        self.dump_interval = dump_interval;
        self
    }

    pub fn with_logs_directory<P: Into<PathBuf>>(mut self, logs_directory: P) -> Self {
        self.logs_directory = logs_directory.into();
        self
    }

    pub fn with_parameter<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.resource_management_algorithm_parameters
            .insert(name.to_string(), value.into());
        self
    }
}
