use std::path::Path;

use dslab_edge::config::{DumpInterval, SimulationConfig};
use dslab_edge::resource_pool::{ResourcePoolState, Resources};

pub fn assert_float_eq(x: f64, y: f64, eps: f64) {
    assert!(x > y - eps && x < y + eps);
}

pub fn config(logs_directory: &Path, dump_interval: DumpInterval) -> SimulationConfig {
    SimulationConfig::default()
        .with_dump_interval(dump_interval)
        .with_logs_directory(logs_directory)
}

/// Checks that every host demand equals the sum of demands of its services
/// and that hosted sets agree with service host references.
pub fn assert_pool_consistent(pool: &ResourcePoolState) {
    for host_id in pool.host_ids() {
        let host = pool.host(host_id).unwrap();
        let mut sum = Resources::default();
        for service_id in &host.services {
            assert_eq!(pool.host_of(*service_id), Some(host_id));
            sum += pool.service_demand(*service_id).unwrap();
        }
        assert_eq!(host.demand, sum);
        assert!(host.demand.fits_within(&host.capacity));
    }
    for service_id in pool.service_ids() {
        if let Some(host_id) = pool.host_of(service_id) {
            assert!(pool.hosted_services(host_id).contains(&service_id));
        }
    }
}
