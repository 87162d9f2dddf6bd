mod common;

use dslab_edge::config::DumpInterval;
use dslab_edge::entity::{Entity, EntityKind};
use dslab_edge::log_file::{export_csv, read_log};
use dslab_edge::model::Model;
use dslab_edge::monitoring::{MetricValue, Metrics};
use dslab_edge::resource_pool::Resources;
use dslab_edge::error::SimError;
use dslab_edge::simulation::{EdgeSimulation, SimulationState};
use dslab_edge::stopping::TickLimit;

fn simulation_with_entities(dir: &tempfile::TempDir, dump_interval: DumpInterval) -> EdgeSimulation {
    let mut sim = EdgeSimulation::new(common::config(dir.path(), dump_interval)).unwrap();
    let model = sim.model_mut();
    let server = model.create_server(Resources::new(10, 16, 100)).unwrap();
    let service = model.create_service(Resources::new(4, 2, 10)).unwrap();
    model.create_service(Resources::new(1, 1, 1)).unwrap();
    model.provision(service.id, server.id).unwrap();
    model
        .create_entity(EntityKind::User)
        .unwrap()
        .set_attribute("coordinates", serde_json::json!([1, 2]));
    sim.start().unwrap();
    sim
}

#[test]
// With dump interval K the buffers are flushed and cleared exactly every K ticks.
fn test_flush_every_k_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation_with_entities(&dir, DumpInterval::Ticks(5));
    sim.set_stopping_criterion(TickLimit::new(12));

    for tick in 1..=12u64 {
        let halted = sim.step().unwrap();
        let expected_flushes = tick / 5;
        if halted {
            assert_eq!(tick, 12);
            // records of ticks 11-12 are flushed on halt
            assert_eq!(sim.monitoring().flush_count(), expected_flushes + 1);
            assert!(sim.monitoring().buffer("Service").is_empty());
        } else {
            assert_eq!(sim.monitoring().flush_count(), expected_flushes);
            let buffered = (tick % 5) as usize;
            assert_eq!(sim.monitoring().buffer("EdgeServer").len(), buffered);
            assert_eq!(sim.monitoring().buffer("Service").len(), 2 * buffered);
            assert_eq!(sim.monitoring().buffer("User").len(), buffered);
        }
    }

    let servers = read_log(sim.monitoring().log_path("EdgeServer")).unwrap();
    assert_eq!(servers.len(), 12);
    let ticks: Vec<i64> = servers.iter().map(|r| r["tick"].as_i64().unwrap()).collect();
    assert_eq!(ticks, (1..=12).collect::<Vec<i64>>());
    assert_eq!(read_log(sim.monitoring().log_path("Service")).unwrap().len(), 24);
    assert_eq!(read_log(sim.monitoring().log_path("User")).unwrap().len(), 12);
}

#[test]
// With infinite dump interval everything stays in memory and nothing is written.
fn test_infinite_dump_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation_with_entities(&dir, DumpInterval::Infinite);
    sim.set_stopping_criterion(TickLimit::new(30));
    sim.run_model().unwrap();

    assert_eq!(sim.monitoring().flush_count(), 0);
    assert_eq!(sim.monitoring().buffer("EdgeServer").len(), 30);
    assert_eq!(sim.monitoring().buffer("Service").len(), 60);
    assert_eq!(sim.monitoring().buffer("User").len(), 30);
    assert!(!sim.monitoring().log_path("EdgeServer").exists());
}

#[test]
fn test_default_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation_with_entities(&dir, DumpInterval::Ticks(1));
    sim.set_stopping_criterion(TickLimit::new(1));
    sim.run_model().unwrap();

    let server = &read_log(sim.monitoring().log_path("EdgeServer")).unwrap()[0];
    assert_eq!(server.get_index(0).unwrap().0, "tick");
    assert_eq!(server["id"], MetricValue::Int(1));
    assert_eq!(server["cpu"], MetricValue::Int(10));
    assert_eq!(server["cpu_demand"], MetricValue::Int(4));
    assert_eq!(server["disk_demand"], MetricValue::Int(10));
    assert_eq!(
        server["services"],
        MetricValue::List(vec![MetricValue::Ref {
            kind: "Service".to_string(),
            id: 1
        }])
    );

    let services = read_log(sim.monitoring().log_path("Service")).unwrap();
    assert_eq!(
        services[0]["server"],
        MetricValue::Ref {
            kind: "EdgeServer".to_string(),
            id: 1
        }
    );
    assert_eq!(services[1]["server"], MetricValue::Null);

    let user = &read_log(sim.monitoring().log_path("User")).unwrap()[0];
    assert_eq!(
        user["coordinates"],
        MetricValue::List(vec![MetricValue::Int(1), MetricValue::Int(2)])
    );
}

#[test]
fn test_custom_collectors() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation_with_entities(&dir, DumpInterval::Infinite);
    sim.set_collector(EntityKind::Service, |entity: &Entity, model: &Model| -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("id".to_string(), entity.id.into());
        metrics.insert("placed".to_string(), model.pool().host_of(entity.id).is_some().into());
        metrics
    });
    sim.set_stopping_criterion(TickLimit::new(2));
    sim.run_model().unwrap();

    let services = sim.monitoring().buffer("Service");
    assert_eq!(services.len(), 4);
    assert_eq!(services[0].len(), 3);
    assert_eq!(services[0]["placed"], MetricValue::Bool(true));
    assert_eq!(services[1]["placed"], MetricValue::Bool(false));
    // other types still use the default collector
    assert_eq!(sim.monitoring().buffer("EdgeServer")[0]["cpu"], MetricValue::Int(10));
}

#[test]
fn test_model_collector_replaces_entity_collection() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation_with_entities(&dir, DumpInterval::Infinite);
    sim.set_model_collector(|model: &Model| -> Vec<(String, Metrics)> {
        let mut metrics = Metrics::new();
        metrics.insert(
            "unplaced".to_string(),
            (model.pool().unplaced_services().len() as u64).into(),
        );
        vec![("Simulation".to_string(), metrics)]
    });
    sim.set_stopping_criterion(TickLimit::new(3));
    sim.run_model().unwrap();

    assert_eq!(sim.monitoring().buffers().len(), 1);
    let records = sim.monitoring().buffer("Simulation");
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["tick"], MetricValue::Int(3));
    assert_eq!(records[2]["unplaced"], MetricValue::Int(1));
}

#[test]
// A new run truncates logs of the previous one, later flushes of the same run append.
fn test_logs_are_truncated_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = {
        let sim = simulation_with_entities(&dir, DumpInterval::Ticks(2));
        dslab_edge::dataset::Dataset::from_model(sim.model())
    };
    let mut sim = EdgeSimulation::new(common::config(dir.path(), DumpInterval::Ticks(2))).unwrap();
    sim.set_stopping_criterion(TickLimit::new(6));

    sim.initialize(&dataset).unwrap();
    sim.run_model().unwrap();
    assert_eq!(read_log(sim.monitoring().log_path("EdgeServer")).unwrap().len(), 6);

    sim.initialize(&dataset).unwrap();
    sim.run_model().unwrap();
    assert_eq!(read_log(sim.monitoring().log_path("EdgeServer")).unwrap().len(), 6);
}

#[test]
fn test_export_csv() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation_with_entities(&dir, DumpInterval::Ticks(10));
    sim.set_stopping_criterion(TickLimit::new(2));
    sim.run_model().unwrap();

    let records = read_log(sim.monitoring().log_path("Service")).unwrap();
    let csv_path = dir.path().join("services.csv");
    export_csv(&records, &csv_path).unwrap();

    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "tick,id,cpu_demand,memory_demand,disk_demand,server");
    assert_eq!(lines[1], "1,1,4,2,10,EdgeServer_1");
    assert_eq!(lines[2], "1,2,1,1,1,");
}

#[test]
fn test_truncated_log_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation_with_entities(&dir, DumpInterval::Ticks(1));
    sim.set_stopping_criterion(TickLimit::new(1));
    sim.run_model().unwrap();

    let path = sim.monitoring().log_path("EdgeServer");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
    assert!(read_log(&path).is_err());
}

#[test]
// Failure to write logs is fatal: the run halts and can't be resumed.
fn test_log_write_failure_halts_run() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_directory = dir.path().join("logs");
    std::fs::write(&not_a_directory, b"").unwrap();

    let mut sim = EdgeSimulation::new(common::config(&not_a_directory, DumpInterval::Ticks(1))).unwrap();
    sim.model_mut().create_server(Resources::new(1, 1, 1)).unwrap();
    sim.set_stopping_criterion(TickLimit::new(5));
    sim.start().unwrap();

    assert!(matches!(sim.run_model(), Err(SimError::Io(_))));
    assert_eq!(sim.state(), SimulationState::Halted);
    assert_eq!(sim.tick(), 1);
    assert!(matches!(sim.run_model(), Err(SimError::InvalidState { .. })));
    assert!(matches!(sim.step(), Err(SimError::InvalidState { .. })));
    assert_eq!(sim.tick(), 1);
    // records which could not be written stay in memory
    assert_eq!(sim.monitoring().buffer("EdgeServer").len(), 1);
}
