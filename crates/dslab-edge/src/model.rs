//! Simulation model state shared with user hooks.

use std::cell::Cell;
use std::rc::Rc;

use sugars::{cell, rc};

use crate::context::SimulationContext;
use crate::entity::{Entity, EntityKind, EntityRef};
use crate::error::Result;
use crate::registry::EntityRegistry;
use crate::resource_pool::{ResourcePoolState, Resources};

/// Holds all entities, the resource ledger and the simulation clock.
///
/// The model is owned by [`EdgeSimulation`](crate::simulation::EdgeSimulation) and lent to the resource management
/// algorithm (mutably) and to the stopping criterion and metrics collectors (immutably).
pub struct Model {
    registry: EntityRegistry,
    pool: ResourcePoolState,
    clock: Rc<Cell<u64>>,
    tick_duration: f64,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            registry: EntityRegistry::new(),
            pool: ResourcePoolState::new(),
            clock: rc!(cell!(0)),
            tick_duration: 1.,
        }
    }

    /// Creates a context sharing the model clock.
    pub fn create_context(&self, name: &str) -> SimulationContext {
        SimulationContext::new(name, self.clock.clone())
    }

    pub fn tick(&self) -> u64 {
        self.clock.get()
    }

    pub(crate) fn advance(&mut self) -> u64 {
        self.clock.set(self.clock.get() + 1);
        self.clock.get()
    }

    /// Returns simulated time elapsed since the start, in tick units.
    pub fn elapsed_time(&self) -> f64 {
        self.tick() as f64 * self.tick_duration
    }

    pub(crate) fn set_tick_duration(&mut self, tick_duration: f64) {
        self.tick_duration = tick_duration;
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn pool(&self) -> &ResourcePoolState {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ResourcePoolState {
        &mut self.pool
    }

    /// Creates a new entity of the specified type.
    ///
    /// Servers and services are also registered in the resource pool with zero capacity and demand, use
    /// [`create_server`](Self::create_server) and [`create_service`](Self::create_service) to set them.
    pub fn create_entity(&mut self, kind: EntityKind) -> Result<&mut Entity> {
        let id = self.registry.next_id(&kind)?;
        match kind {
            EntityKind::EdgeServer => self.pool.add_host(id, Resources::default())?,
            EntityKind::Service => self.pool.add_service(id, Resources::default())?,
            _ => {}
        }
        self.registry.create(kind)
    }

    /// Creates an edge server with the specified capacity.
    pub fn create_server(&mut self, capacity: Resources) -> Result<EntityRef> {
        let id = self.registry.next_id(&EntityKind::EdgeServer)?;
        self.pool.add_host(id, capacity)?;
        Ok(self.registry.create(EntityKind::EdgeServer)?.entity_ref())
    }

    /// Creates an unplaced service with the specified resource demand.
    pub fn create_service(&mut self, demand: Resources) -> Result<EntityRef> {
        let id = self.registry.next_id(&EntityKind::Service)?;
        self.pool.add_service(id, demand)?;
        Ok(self.registry.create(EntityKind::Service)?.entity_ref())
    }

    pub fn entity(&self, target: &EntityRef) -> Result<&Entity> {
        self.registry.resolve(target)
    }

    pub fn entity_mut(&mut self, target: &EntityRef) -> Result<&mut Entity> {
        self.registry.find_by_id_mut(&target.kind, target.id)
    }

    /// Places the service on the server, see [`ResourcePoolState::provision`].
    pub fn provision(&mut self, service_id: u32, server_id: u32) -> Result<()> {
        self.pool.provision(service_id, server_id)
    }

    /// Clears all entities and rewinds the clock.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.pool.reset();
        self.clock.set(0);
    }
}
