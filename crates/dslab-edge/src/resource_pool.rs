//! Resource pool state.

use std::collections::BTreeSet;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityKind, EntityRef};
use crate::error::{Result, SimError};

/// Amount of resources along every modeled dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: u32,
    pub memory: u64,
    pub disk: u64,
}

impl Resources {
    pub fn new(cpu: u32, memory: u64, disk: u64) -> Self {
        Self { cpu, memory, disk }
    }

    /// Checks that every dimension is not greater than the corresponding dimension of `other`.
    pub fn fits_within(&self, other: &Resources) -> bool {
        self.cpu <= other.cpu && self.memory <= other.memory && self.disk <= other.disk
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources::new(self.cpu + rhs.cpu, self.memory + rhs.memory, self.disk + rhs.disk)
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        *self = *self + rhs;
    }
}

impl Sub for Resources {
    type Output = Resources;

    fn sub(self, rhs: Resources) -> Resources {
        Resources::new(self.cpu - rhs.cpu, self.memory - rhs.memory, self.disk - rhs.disk)
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, rhs: Resources) {
        *self = *self - rhs;
    }
}

/// Result of checking whether a service can be placed on a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationVerdict {
    NotEnoughCpu,
    NotEnoughMemory,
    NotEnoughDisk,
    Success,
    HostNotFound,
    ServiceNotFound,
}

/// Stores host properties (resource capacity) and state (current demand, hosted services).
#[derive(Clone, Debug)]
pub struct HostInfo {
    pub capacity: Resources,
    pub demand: Resources,
    pub services: BTreeSet<u32>,
}

impl HostInfo {
    pub fn new(capacity: Resources) -> Self {
        Self {
            capacity,
            demand: Resources::default(),
            services: BTreeSet::new(),
        }
    }

    /// Returns resources not yet claimed by hosted services.
    pub fn free(&self) -> Resources {
        self.capacity - self.demand
    }
}

/// Stores requested resources of a service and the host it is placed on.
#[derive(Clone, Debug)]
pub struct ServiceInfo {
    pub demand: Resources,
    pub host: Option<u32>,
}

/// Capacity ledger of edge servers and placement of services on them.
///
/// Hosts and services are identified by the ids of the corresponding `EdgeServer` and `Service` entities. Both are
/// iterated in registration order.
///
/// For every host `demand` is always equal to the sum of demands of services in its hosted set and never exceeds
/// `capacity`. A service is in the hosted set of a host if and only if its `host` refers to that host.
#[derive(Clone, Default)]
pub struct ResourcePoolState {
    hosts: IndexMap<u32, HostInfo>,
    services: IndexMap<u32, ServiceInfo>,
}

impl ResourcePoolState {
    /// Creates empty resource pool state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds host with the specified capacity to resource pool. Fails if the host is already registered.
    pub fn add_host(&mut self, id: u32, capacity: Resources) -> Result<()> {
        if self.hosts.contains_key(&id) {
            return Err(SimError::DuplicateEntity(EntityRef::new(EntityKind::EdgeServer, id)));
        }
        self.hosts.insert(id, HostInfo::new(capacity));
        Ok(())
    }

    /// Adds unplaced service with the specified resource demand. Fails if the service is already registered.
    pub fn add_service(&mut self, id: u32, demand: Resources) -> Result<()> {
        if self.services.contains_key(&id) {
            return Err(SimError::DuplicateEntity(EntityRef::new(EntityKind::Service, id)));
        }
        self.services.insert(id, ServiceInfo { demand, host: None });
        Ok(())
    }

    /// Returns IDs of all hosts.
    pub fn host_ids(&self) -> Vec<u32> {
        self.hosts.keys().cloned().collect()
    }

    /// Returns IDs of all services.
    pub fn service_ids(&self) -> Vec<u32> {
        self.services.keys().cloned().collect()
    }

    /// Returns IDs of services which are not placed on any host.
    pub fn unplaced_services(&self) -> Vec<u32> {
        self.services
            .iter()
            .filter(|(_, service)| service.host.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn host(&self, host_id: u32) -> Option<&HostInfo> {
        self.hosts.get(&host_id)
    }

    pub fn service(&self, service_id: u32) -> Option<&ServiceInfo> {
        self.services.get(&service_id)
    }

    /// Checks if the specified service can currently be placed on the specified host.
    ///
    /// A service already placed on the host is always accepted by it.
    pub fn can_allocate(&self, service_id: u32, host_id: u32) -> AllocationVerdict {
        let host = match self.hosts.get(&host_id) {
            Some(host) => host,
            None => return AllocationVerdict::HostNotFound,
        };
        let service = match self.services.get(&service_id) {
            Some(service) => service,
            None => return AllocationVerdict::ServiceNotFound,
        };
        if service.host == Some(host_id) {
            return AllocationVerdict::Success;
        }
        let free = host.free();
        if free.cpu < service.demand.cpu {
            return AllocationVerdict::NotEnoughCpu;
        }
        if free.memory < service.demand.memory {
            return AllocationVerdict::NotEnoughMemory;
        }
        if free.disk < service.demand.disk {
            return AllocationVerdict::NotEnoughDisk;
        }
        AllocationVerdict::Success
    }

    /// Checks whether free resources of the host cover the demand of the service in every dimension.
    pub fn has_capacity_to_host(&self, host_id: u32, service_id: u32) -> bool {
        self.can_allocate(service_id, host_id) == AllocationVerdict::Success
    }

    /// Places the service on the target host, releasing its resources on the previous host (if any).
    ///
    /// If the target host can't accommodate the service, the error is returned and the state is left unchanged.
    pub fn provision(&mut self, service_id: u32, host_id: u32) -> Result<()> {
        match self.can_allocate(service_id, host_id) {
            AllocationVerdict::Success => {}
            AllocationVerdict::HostNotFound => return Err(SimError::HostNotFound(host_id)),
            AllocationVerdict::ServiceNotFound => return Err(SimError::ServiceNotFound(service_id)),
            verdict => {
                return Err(SimError::CapacityExceeded {
                    service: service_id,
                    host: host_id,
                    verdict,
                })
            }
        }
        let (demand, current_host) = {
            let service = &self.services[&service_id];
            (service.demand, service.host)
        };
        if current_host == Some(host_id) {
            return Ok(());
        }
        if let Some(old_host) = current_host {
            self.detach(service_id, demand, old_host);
        }
        let host = &mut self.hosts[&host_id];
        host.demand += demand;
        host.services.insert(service_id);
        self.services[&service_id].host = Some(host_id);
        Ok(())
    }

    /// Removes the service from its current host, leaving it unplaced.
    pub fn evict(&mut self, service_id: u32) -> Result<()> {
        let service = self
            .services
            .get(&service_id)
            .ok_or(SimError::ServiceNotFound(service_id))?;
        if let Some(host_id) = service.host {
            let demand = service.demand;
            self.detach(service_id, demand, host_id);
        }
        Ok(())
    }

    fn detach(&mut self, service_id: u32, demand: Resources, host_id: u32) {
        if let Some(host) = self.hosts.get_mut(&host_id) {
            host.demand -= demand;
            host.services.remove(&service_id);
        }
        if let Some(service) = self.services.get_mut(&service_id) {
            service.host = None;
        }
    }

    /// Returns the host the service is placed on.
    pub fn host_of(&self, service_id: u32) -> Option<u32> {
        self.services.get(&service_id).and_then(|s| s.host)
    }

    /// Returns IDs of services placed on the host.
    pub fn hosted_services(&self, host_id: u32) -> Vec<u32> {
        self.hosts
            .get(&host_id)
            .map(|h| h.services.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the total capacity of the specified host.
    pub fn capacity(&self, host_id: u32) -> Result<Resources> {
        Ok(self.host_info(host_id)?.capacity)
    }

    /// Returns resources of the specified host currently claimed by services.
    pub fn demand(&self, host_id: u32) -> Result<Resources> {
        Ok(self.host_info(host_id)?.demand)
    }

    /// Returns resources of the specified host not claimed by services.
    pub fn free(&self, host_id: u32) -> Result<Resources> {
        Ok(self.host_info(host_id)?.free())
    }

    /// Returns resources requested by the specified service.
    pub fn service_demand(&self, service_id: u32) -> Result<Resources> {
        self.services
            .get(&service_id)
            .map(|s| s.demand)
            .ok_or(SimError::ServiceNotFound(service_id))
    }

    /// Returns the CPU allocation rate (ratio of allocated to total resources) of the specified host.
    pub fn cpu_load(&self, host_id: u32) -> Result<f64> {
        let host = self.host_info(host_id)?;
        if host.capacity.cpu == 0 {
            return Ok(0.);
        }
        Ok(host.demand.cpu as f64 / host.capacity.cpu as f64)
    }

    /// Returns the memory allocation rate (ratio of allocated to total resources) of the specified host.
    pub fn memory_load(&self, host_id: u32) -> Result<f64> {
        let host = self.host_info(host_id)?;
        if host.capacity.memory == 0 {
            return Ok(0.);
        }
        Ok(host.demand.memory as f64 / host.capacity.memory as f64)
    }

    fn host_info(&self, host_id: u32) -> Result<&HostInfo> {
        self.hosts.get(&host_id).ok_or(SimError::HostNotFound(host_id))
    }

    /// Removes all hosts and services.
    pub fn reset(&mut self) {
        self.hosts.clear();
        self.services.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_fit_is_accepted() {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, Resources::new(8, 16, 100)).unwrap();
        pool.add_service(1, Resources::new(8, 16, 100)).unwrap();
        assert!(pool.has_capacity_to_host(1, 1));
        pool.provision(1, 1).unwrap();
        assert_eq!(pool.free(1).unwrap(), Resources::default());
    }

    #[test]
    fn test_rejected_provision_keeps_state() {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, Resources::new(4, 4, 4)).unwrap();
        pool.add_host(2, Resources::new(2, 4, 4)).unwrap();
        pool.add_service(1, Resources::new(3, 1, 1)).unwrap();
        pool.provision(1, 1).unwrap();

        let err = pool.provision(1, 2).unwrap_err();
        assert!(matches!(
            err,
            SimError::CapacityExceeded {
                verdict: AllocationVerdict::NotEnoughCpu,
                ..
            }
        ));
        assert_eq!(pool.host_of(1), Some(1));
        assert_eq!(pool.demand(1).unwrap(), Resources::new(3, 1, 1));
        assert_eq!(pool.demand(2).unwrap(), Resources::default());
    }

    #[test]
    fn test_evict() {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, Resources::new(4, 4, 4)).unwrap();
        pool.add_service(7, Resources::new(1, 2, 3)).unwrap();
        pool.provision(7, 1).unwrap();
        pool.evict(7).unwrap();
        assert_eq!(pool.host_of(7), None);
        assert!(pool.hosted_services(1).is_empty());
        assert_eq!(pool.unplaced_services(), vec![7]);
        assert!(matches!(pool.evict(8), Err(SimError::ServiceNotFound(8))));
    }
}
