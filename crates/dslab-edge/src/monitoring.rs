//! Component that records the state of entities on every tick and periodically flushes it to log files.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DumpInterval;
use crate::context::SimulationContext;
use crate::entity::{Entity, EntityKind, EntityRef, Relationship};
use crate::error::Result;
use crate::log_file::write_frame;
use crate::model::Model;
use crate::resource_pool::Resources;
use crate::{log_debug, log_trace};

/// Name of the key holding the tick number in every recorded snapshot.
pub const TICK_KEY: &str = "tick";

/// Extension of metrics log files.
pub const LOG_FILE_EXTENSION: &str = "bin";

/// Value of a single metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ref { kind: String, id: u32 },
    List(Vec<MetricValue>),
    Map(IndexMap<String, MetricValue>),
}

/// Metrics of a single entity (or of the whole model) at a single tick.
pub type Metrics = IndexMap<String, MetricValue>;

impl MetricValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(v) => Some(*v as f64),
            MetricValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Null => Ok(()),
            MetricValue::Bool(v) => write!(f, "{}", v),
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Str(v) => f.write_str(v),
            MetricValue::Ref { kind, id } => write!(f, "{}_{}", kind, id),
            MetricValue::List(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            MetricValue::Map(values) => {
                f.write_str("{")?;
                for (i, (k, v)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&Value> for MetricValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => MetricValue::Null,
            Value::Bool(v) => MetricValue::Bool(*v),
            Value::Number(n) => match n.as_i64() {
                Some(v) => MetricValue::Int(v),
                None => MetricValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(v) => MetricValue::Str(v.clone()),
            Value::Array(values) => MetricValue::List(values.iter().map(MetricValue::from).collect()),
            Value::Object(values) => {
                MetricValue::Map(values.iter().map(|(k, v)| (k.clone(), MetricValue::from(v))).collect())
            }
        }
    }
}

impl From<&EntityRef> for MetricValue {
    fn from(target: &EntityRef) -> Self {
        MetricValue::Ref {
            kind: target.kind.name().to_string(),
            id: target.id,
        }
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::Int(v as i64)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(MetricValue::Float(v as f64), MetricValue::Int)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Str(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Str(v)
    }
}

impl From<Option<&Relationship>> for MetricValue {
    fn from(relationship: Option<&Relationship>) -> Self {
        match relationship {
            None => MetricValue::Null,
            Some(Relationship::One(target)) => target.into(),
            Some(Relationship::Many(targets)) => MetricValue::List(targets.iter().map(MetricValue::from).collect()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Produces metrics of a single entity.
///
/// Can be set per entity type with [`Monitoring::set_collector`]. Closures with the matching signature implement
/// this trait.
pub trait MetricsCollector {
    fn collect(&self, entity: &Entity, model: &Model) -> Metrics;
}

impl<F> MetricsCollector for F
where
    F: Fn(&Entity, &Model) -> Metrics,
{
    fn collect(&self, entity: &Entity, model: &Model) -> Metrics {
        self(entity, model)
    }
}

/// Produces metrics of the whole model at once, replacing per-entity collection.
///
/// Returns pairs of log name and metrics record, several records may share a log name.
pub trait ModelCollector {
    fn collect(&mut self, model: &Model) -> Vec<(String, Metrics)>;
}

impl<F> ModelCollector for F
where
    F: FnMut(&Model) -> Vec<(String, Metrics)>,
{
    fn collect(&mut self, model: &Model) -> Vec<(String, Metrics)> {
        self(model)
    }
}

fn insert_resources(metrics: &mut Metrics, suffix: &str, resources: &Resources) {
    metrics.insert(format!("cpu{}", suffix), resources.cpu.into());
    metrics.insert(format!("memory{}", suffix), resources.memory.into());
    metrics.insert(format!("disk{}", suffix), resources.disk.into());
}

/// Records entity id, attributes, relationships and, for servers and services, their resource state.
#[derive(Default)]
pub struct DefaultCollector;

impl MetricsCollector for DefaultCollector {
    fn collect(&self, entity: &Entity, model: &Model) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("id".to_string(), entity.id.into());
        for (name, value) in &entity.attributes {
            metrics.insert(name.clone(), value.into());
        }
        let pool = model.pool();
        match entity.kind {
            EntityKind::EdgeServer => {
                if let Some(host) = pool.host(entity.id) {
                    insert_resources(&mut metrics, "", &host.capacity);
                    insert_resources(&mut metrics, "_demand", &host.demand);
                    metrics.insert(
                        "services".to_string(),
                        MetricValue::List(
                            host.services
                                .iter()
                                .map(|id| (&EntityRef::new(EntityKind::Service, *id)).into())
                                .collect(),
                        ),
                    );
                }
            }
            EntityKind::Service => {
                if let Some(service) = pool.service(entity.id) {
                    insert_resources(&mut metrics, "_demand", &service.demand);
                    let server = match service.host {
                        Some(id) => (&EntityRef::new(EntityKind::EdgeServer, id)).into(),
                        None => MetricValue::Null,
                    };
                    metrics.insert("server".to_string(), server);
                }
            }
            _ => {}
        }
        for (name, relationship) in &entity.relationships {
            metrics.insert(name.clone(), relationship.as_ref().into());
        }
        metrics
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Buffers per-tick metrics of all entities and writes them to `<logs_directory>/<type name>.bin`.
///
/// With finite dump interval `K` the buffers are flushed and cleared every `K` ticks, so only the last
/// (at most `K`) ticks stay in memory. With infinite dump interval nothing is written and all records stay in
/// memory.
pub struct Monitoring {
    dump_interval: DumpInterval,
    logs_directory: PathBuf,
    default_collector: DefaultCollector,
    collectors: HashMap<EntityKind, Box<dyn MetricsCollector>>,
    model_collector: Option<Box<dyn ModelCollector>>,
    buffers: IndexMap<String, Vec<Metrics>>,
    written: HashSet<String>,
    flush_count: u64,
    ctx: SimulationContext,
}

impl Monitoring {
    /// Creates component.
    pub fn new(dump_interval: DumpInterval, logs_directory: PathBuf, ctx: SimulationContext) -> Self {
        Self {
            dump_interval,
            logs_directory,
            default_collector: DefaultCollector,
            collectors: HashMap::new(),
            model_collector: None,
            buffers: IndexMap::new(),
            written: HashSet::new(),
            flush_count: 0,
            ctx,
        }
    }

    /// Overrides metrics collection for entities of the specified type.
    pub fn set_collector(&mut self, kind: EntityKind, collector: Box<dyn MetricsCollector>) {
        self.collectors.insert(kind, collector);
    }

    /// Replaces per-entity collection with the model-wide collector.
    pub fn set_model_collector(&mut self, collector: Box<dyn ModelCollector>) {
        self.model_collector = Some(collector);
    }

    pub fn dump_interval(&self) -> DumpInterval {
        self.dump_interval
    }

    pub fn logs_directory(&self) -> &Path {
        &self.logs_directory
    }

    /// Returns the path of log file with the specified name.
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.logs_directory.join(format!("{}.{}", name, LOG_FILE_EXTENSION))
    }

    /// Returns buffered (not yet flushed) records of the specified log.
    pub fn buffer(&self, name: &str) -> &[Metrics] {
        self.buffers.get(name).map(|b| b.as_slice()).unwrap_or(&[])
    }

    /// Returns all buffered records grouped by log name.
    pub fn buffers(&self) -> &IndexMap<String, Vec<Metrics>> {
        &self.buffers
    }

    /// Returns the number of flushes performed in the current run.
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Records metrics of the current tick.
    pub fn collect(&mut self, model: &Model) {
        let tick = model.tick();
        let records = match self.model_collector.as_mut() {
            Some(collector) => collector.collect(model),
            None => {
                let mut records = Vec::new();
                for kind in model.registry().kinds() {
                    let collector: &dyn MetricsCollector = match self.collectors.get(kind) {
                        Some(collector) => collector.as_ref(),
                        None => &self.default_collector,
                    };
                    for entity in model.registry().all(kind) {
                        records.push((kind.name().to_string(), collector.collect(entity, model)));
                    }
                }
                records
            }
        };
        log_trace!(self.ctx, "collected {} records", records.len());
        for (name, metrics) in records {
            let mut record = Metrics::with_capacity(metrics.len() + 1);
            record.insert(TICK_KEY.to_string(), tick.into());
            record.extend(metrics.into_iter().filter(|(k, _)| k != TICK_KEY));
            self.buffers.entry(name).or_default().push(record);
        }
    }

    /// Flushes buffers if the dump interval has elapsed at the specified tick.
    pub fn on_tick_end(&mut self, tick: u64) -> Result<()> {
        if self.dump_interval.is_due(tick) {
            self.flush()?;
        }
        Ok(())
    }

    /// Appends every non-empty buffer to its log file and clears it.
    ///
    /// Does nothing when the dump interval is infinite.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dump_interval.is_finite() {
            return Ok(());
        }
        fs::create_dir_all(&self.logs_directory)?;
        for (name, records) in self.buffers.iter_mut() {
            if records.is_empty() {
                continue;
            }
            let path = self.logs_directory.join(format!("{}.{}", name, LOG_FILE_EXTENSION));
            let truncate = self.written.insert(name.clone());
            write_frame(&path, records, truncate)?;
            log_debug!(self.ctx, "flushed {} records to {}", records.len(), path.display());
            records.clear();
        }
        self.flush_count += 1;
        Ok(())
    }

    /// Flushes records left after the last periodic flush.
    pub fn flush_remaining(&mut self) -> Result<()> {
        if self.buffers.values().any(|records| !records.is_empty()) {
            self.flush()?;
        }
        Ok(())
    }

    /// Drops buffered records and forgets written log files, so that the next run truncates them.
    pub fn reset(&mut self) {
        self.buffers.clear();
        self.written.clear();
        self.flush_count = 0;
    }
}
