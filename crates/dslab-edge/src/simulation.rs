//! Time-stepped simulation driver.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::config::SimulationConfig;
use crate::context::SimulationContext;
use crate::dataset::Dataset;
use crate::entity::EntityKind;
use crate::error::{HookError, HookResult, Result, SimError};
use crate::log::log_hook_failure;
use crate::model::Model;
use crate::monitoring::{MetricsCollector, ModelCollector, Monitoring};
use crate::placement::{placement_algorithm_resolver, PlacementPolicy};
use crate::stopping::StoppingCriterion;
use crate::{log_debug, log_error, log_info};

/// Parameters passed to the resource management algorithm.
pub type Parameters = IndexMap<String, Value>;

/// Name of the parameter holding the current tick.
pub const CURRENT_STEP_PARAMETER: &str = "current_step";

/// Callback invoked once per tick to manage resources, e.g. to place or migrate services.
///
/// Closures taking `(&mut Model, &Parameters)` and returning `HookResult<()>` implement this trait.
pub trait ResourceManagementAlgorithm {
    fn run(&mut self, model: &mut Model, parameters: &Parameters) -> HookResult<()>;
}

impl<F> ResourceManagementAlgorithm for F
where
    F: FnMut(&mut Model, &Parameters) -> HookResult<()>,
{
    fn run(&mut self, model: &mut Model, parameters: &Parameters) -> HookResult<()> {
        self(model, parameters)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    Idle,
    Running,
    Halted,
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationState::Idle => f.write_str("idle"),
            SimulationState::Running => f.write_str("running"),
            SimulationState::Halted => f.write_str("halted"),
        }
    }
}

/// Drives the simulation tick by tick.
///
/// On every tick the resource management algorithm is invoked first, then the metrics of all entities are recorded
/// (and flushed if the dump interval has elapsed), then the stopping criterion is evaluated. Ticks are executed
/// strictly sequentially, an error returned by any hook aborts the run.
pub struct EdgeSimulation {
    model: Model,
    monitoring: Monitoring,
    state: SimulationState,
    config: SimulationConfig,
    resource_management_algorithm: Option<Box<dyn ResourceManagementAlgorithm>>,
    stopping_criterion: Option<Box<dyn StoppingCriterion>>,
    ctx: SimulationContext,
}

impl EdgeSimulation {
    /// Creates simulation with the specified config.
    ///
    /// If the config names a resource management algorithm, the corresponding placement algorithm is resolved and
    /// installed as [`PlacementPolicy`].
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.dump_interval.validate()?;
        let mut model = Model::new();
        model.set_tick_duration(config.tick_duration);
        let monitoring = Monitoring::new(
            config.dump_interval,
            config.logs_directory.clone(),
            model.create_context("monitoring"),
        );
        let resource_management_algorithm: Option<Box<dyn ResourceManagementAlgorithm>> =
            match &config.resource_management_algorithm {
                Some(name) => Some(Box::new(PlacementPolicy::new(placement_algorithm_resolver(name)?))),
                None => None,
            };
        let ctx = model.create_context("simulation");
        Ok(Self {
            model,
            monitoring,
            state: SimulationState::Idle,
            config,
            resource_management_algorithm,
            stopping_criterion: None,
            ctx,
        })
    }

    pub fn set_resource_management_algorithm<A: ResourceManagementAlgorithm + 'static>(&mut self, algorithm: A) {
        self.resource_management_algorithm = Some(Box::new(algorithm));
    }

    pub fn set_stopping_criterion<C: StoppingCriterion + 'static>(&mut self, criterion: C) {
        self.stopping_criterion = Some(Box::new(criterion));
    }

    /// Overrides metrics collection for entities of the specified type.
    pub fn set_collector<C: MetricsCollector + 'static>(&mut self, kind: EntityKind, collector: C) {
        self.monitoring.set_collector(kind, Box::new(collector));
    }

    /// Replaces per-entity metrics collection with a model-wide collector.
    pub fn set_model_collector<C: ModelCollector + 'static>(&mut self, collector: C) {
        self.monitoring.set_model_collector(Box::new(collector));
    }

    /// Resets the model, populates it from the dataset and makes the simulation ready to run.
    ///
    /// If the dataset is invalid, the model is left empty.
    pub fn initialize(&mut self, dataset: &Dataset) -> Result<()> {
        self.model.reset();
        self.monitoring.reset();
        self.state = SimulationState::Idle;
        if let Err(e) = dataset.populate(&mut self.model) {
            self.model.reset();
            return Err(e);
        }
        log_info!(
            self.ctx,
            "initialized with {} entity types",
            self.model.registry().kinds().count()
        );
        self.state = SimulationState::Running;
        Ok(())
    }

    /// Makes the simulation ready to run with the model built via [`model_mut`](Self::model_mut).
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(SimulationState::Idle)?;
        self.state = SimulationState::Running;
        Ok(())
    }

    /// Runs ticks until the stopping criterion is met.
    pub fn run_model(&mut self) -> Result<()> {
        if self.stopping_criterion.is_none() {
            return Err(SimError::MissingStoppingCriterion);
        }
        self.expect_state(SimulationState::Running)?;
        while !self.step()? {}
        log_info!(self.ctx, "halted after {} ticks", self.model.tick());
        Ok(())
    }

    /// Runs a single tick. Returns `true` if the simulation has halted.
    pub fn step(&mut self) -> Result<bool> {
        self.expect_state(SimulationState::Running)?;
        let tick = self.model.advance();
        log_debug!(self.ctx, "tick started");

        let parameters = self.parameters(tick);
        if let Some(algorithm) = self.resource_management_algorithm.as_mut() {
            if let Err(e) = algorithm.run(&mut self.model, &parameters) {
                return Err(self.abort("resource management algorithm", e));
            }
        }

        self.monitoring.collect(&self.model);
        if let Err(e) = self.monitoring.on_tick_end(tick) {
            return Err(self.halt_on_error(e));
        }

        let stop = match self.stopping_criterion.as_mut() {
            Some(criterion) => match criterion.should_stop(&self.model) {
                Ok(stop) => stop,
                Err(e) => return Err(self.abort("stopping criterion", e)),
            },
            None => false,
        };
        if stop {
            self.state = SimulationState::Halted;
            if let Err(e) = self.monitoring.flush_remaining() {
                return Err(self.halt_on_error(e));
            }
        }
        Ok(stop)
    }

    fn parameters(&self, tick: u64) -> Parameters {
        let mut parameters = Parameters::new();
        parameters.insert(CURRENT_STEP_PARAMETER.to_string(), Value::from(tick));
        for (name, value) in &self.config.resource_management_algorithm_parameters {
            if name != CURRENT_STEP_PARAMETER {
                parameters.insert(name.clone(), value.clone());
            }
        }
        parameters
    }

    fn abort(&mut self, hook: &'static str, source: HookError) -> SimError {
        log_hook_failure(&self.ctx, hook, &source);
        self.state = SimulationState::Halted;
        SimError::Hook { hook, source }
    }

    fn halt_on_error(&mut self, error: SimError) -> SimError {
        log_error!(self.ctx, "failed to write metrics logs: {}", error);
        self.state = SimulationState::Halted;
        error
    }

    fn expect_state(&self, expected: SimulationState) -> Result<()> {
        if self.state != expected {
            return Err(SimError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn tick(&self) -> u64 {
        self.model.tick()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn monitoring(&self) -> &Monitoring {
        &self.monitoring
    }
}
