//! Service placement algorithms.

use crate::entity::{EntityKind, EntityRef};
use crate::error::{HookResult, Result, SimError};
use crate::model::Model;
use crate::resource_pool::{AllocationVerdict, ResourcePoolState};
use crate::simulation::{Parameters, ResourceManagementAlgorithm};
use crate::{log_debug, log_info};

/// Trait for implementation of service placement algorithms.
///
/// The algorithm is defined as a function of service and current resource pool state, which returns an ID of host
/// selected for service placement or `None` if there is no suitable host.
pub trait PlacementAlgorithm {
    fn select_host(&self, service_id: u32, pool: &ResourcePoolState) -> Option<u32>;
}

/// Creates placement algorithm by its name.
pub fn placement_algorithm_resolver(name: &str) -> Result<Box<dyn PlacementAlgorithm>> {
    match name {
        "FirstFit" => Ok(Box::new(FirstFit::new())),
        "BestFit" => Ok(Box::new(BestFit::new())),
        "WorstFit" => Ok(Box::new(WorstFit::new())),
        _ => Err(SimError::UnknownAlgorithm(name.to_string())),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Uses the first suitable host.
#[derive(Default)]
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Default::default()
    }
}

impl PlacementAlgorithm for FirstFit {
    fn select_host(&self, service_id: u32, pool: &ResourcePoolState) -> Option<u32> {
        pool.host_ids()
            .into_iter()
            .find(|&host| pool.can_allocate(service_id, host) == AllocationVerdict::Success)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Uses the most loaded (by allocated CPU) suitable host.
#[derive(Default)]
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Default::default()
    }
}

impl PlacementAlgorithm for BestFit {
    fn select_host(&self, service_id: u32, pool: &ResourcePoolState) -> Option<u32> {
        let mut result: Option<(u32, u32)> = None;
        for host in pool.host_ids() {
            if pool.can_allocate(service_id, host) != AllocationVerdict::Success {
                continue;
            }
            let free_cpu = pool.host(host).map_or(0, |h| h.free().cpu);
            if result.map_or(true, |(_, best)| free_cpu < best) {
                result = Some((host, free_cpu));
            }
        }
        result.map(|(host, _)| host)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Uses the least loaded (by allocated CPU) suitable host.
#[derive(Default)]
pub struct WorstFit;

impl WorstFit {
    pub fn new() -> Self {
        Default::default()
    }
}

impl PlacementAlgorithm for WorstFit {
    fn select_host(&self, service_id: u32, pool: &ResourcePoolState) -> Option<u32> {
        let mut result: Option<(u32, u32)> = None;
        for host in pool.host_ids() {
            if pool.can_allocate(service_id, host) != AllocationVerdict::Success {
                continue;
            }
            let free_cpu = pool.host(host).map_or(0, |h| h.free().cpu);
            if result.map_or(true, |(_, best)| free_cpu > best) {
                result = Some((host, free_cpu));
            }
        }
        result.map(|(host, _)| host)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Resource management algorithm which places every unplaced service using a placement algorithm.
///
/// Services are processed in creation order. Services for which no suitable host exists stay unplaced and are
/// retried on the next tick.
pub struct PlacementPolicy {
    algorithm: Box<dyn PlacementAlgorithm>,
}

impl PlacementPolicy {
    pub fn new(algorithm: Box<dyn PlacementAlgorithm>) -> Self {
        Self { algorithm }
    }
}

impl ResourceManagementAlgorithm for PlacementPolicy {
    fn run(&mut self, model: &mut Model, _parameters: &Parameters) -> HookResult<()> {
        let ctx = model.create_context("placement");
        let mut placed = 0;
        for service in model.pool().unplaced_services() {
            match self.algorithm.select_host(service, model.pool()) {
                Some(host) => {
                    model.provision(service, host)?;
                    log_debug!(
                        ctx,
                        "{} placed on {}",
                        EntityRef::new(EntityKind::Service, service),
                        EntityRef::new(EntityKind::EdgeServer, host)
                    );
                    placed += 1;
                }
                None => log_debug!(
                    ctx,
                    "no suitable host for {}",
                    EntityRef::new(EntityKind::Service, service)
                ),
            }
        }
        if placed > 0 {
            log_info!(ctx, "placed {} services", placed);
        }
        Ok(())
    }
}
