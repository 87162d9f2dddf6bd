//! Simulation errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::entity::{EntityKind, EntityRef};
use crate::resource_pool::AllocationVerdict;

/// Error type returned by user-supplied hooks (resource management algorithm, stopping criterion).
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by user-supplied hooks.
pub type HookResult<T> = std::result::Result<T, HookError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to encode or decode log frame: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "remote")]
    #[error("failed to fetch dataset: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("{entity} has attribute `{attribute}` missing or of wrong type")]
    MissingAttribute { entity: String, attribute: String },

    #[error("relationship `{name}` of {from} refers to unknown entity {target}")]
    UnresolvedRelationship {
        from: EntityRef,
        name: String,
        target: EntityRef,
    },

    #[error("entity {0} already exists")]
    DuplicateEntity(EntityRef),

    #[error("no free identifiers left for {0}")]
    IdsExhausted(EntityKind),

    #[error("entity {0} not found")]
    EntityNotFound(EntityRef),

    #[error("no {kind} with attribute `{attribute}` equal to {value}")]
    EntityNotFoundBy {
        kind: EntityKind,
        attribute: String,
        value: serde_json::Value,
    },

    #[error("host #{0} is not registered in resource pool")]
    HostNotFound(u32),

    #[error("service #{0} is not registered in resource pool")]
    ServiceNotFound(u32),

    #[error("service #{service} does not fit on host #{host}: {verdict:?}")]
    CapacityExceeded {
        service: u32,
        host: u32,
        verdict: AllocationVerdict,
    },

    #[error("stopping criterion is not set")]
    MissingStoppingCriterion,

    #[error("simulation is {actual}, expected {expected}")]
    InvalidState { expected: String, actual: String },

    #[error("{hook} failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: HookError,
    },

    #[error("can't resolve algorithm `{0}`")]
    UnknownAlgorithm(String),

    #[error("invalid dump interval: {0}")]
    InvalidDumpInterval(String),

    #[error("malformed log file {path}: {reason}")]
    InvalidLog { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, SimError>;
