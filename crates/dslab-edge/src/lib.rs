//! A library for studying service placement and migration policies in edge computing infrastructures.
//!
//! The simulation is driven in discrete ticks. On every tick a user-supplied resource management algorithm
//! may provision services on edge servers, then the state of every entity is recorded by the monitoring
//! component and periodically flushed to binary log files, and finally a stopping criterion decides whether
//! the run is over.
//!
//! ## Examples
//!
//! - [edge-placement](../../demos/edge-placement): builds a sample dataset, runs first-fit and worst-fit
//! placement policies and parses the produced logs.

#![allow(clippy::type_complexity)]

pub mod config;
pub mod context;
pub mod dataset;
pub mod entity;
pub mod error;
pub mod log;
pub mod log_file;
pub mod model;
pub mod monitoring;
pub mod placement;
pub mod registry;
pub mod resource_pool;
pub mod simulation;
pub mod stopping;

// Re-export for using in macros
pub use colored;

pub use config::{DumpInterval, SimulationConfig};
pub use context::SimulationContext;
pub use dataset::Dataset;
pub use entity::{Entity, EntityKind, EntityRef, Relationship};
pub use error::{HookResult, Result, SimError};
pub use model::Model;
pub use monitoring::{MetricValue, Metrics};
pub use resource_pool::{AllocationVerdict, ResourcePoolState, Resources};
pub use simulation::{EdgeSimulation, Parameters, SimulationState};
