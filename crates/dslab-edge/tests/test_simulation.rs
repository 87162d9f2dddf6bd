mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use dslab_edge::config::{DumpInterval, SimulationConfig};
use dslab_edge::dataset::Dataset;
use dslab_edge::error::{HookResult, SimError};
use dslab_edge::model::Model;
use dslab_edge::resource_pool::Resources;
use dslab_edge::simulation::{EdgeSimulation, Parameters, SimulationState};
use dslab_edge::stopping::TickLimit;

fn simulation(dir: &tempfile::TempDir) -> EdgeSimulation {
    EdgeSimulation::new(common::config(dir.path(), DumpInterval::Infinite)).unwrap()
}

#[test]
// Stopping criterion `tick == N` halts the run after exactly N ticks.
fn test_halts_after_exactly_n_ticks() {
    for n in [1, 2, 7, 50] {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = simulation(&dir);
        sim.model_mut().create_server(Resources::new(1, 1, 1)).unwrap();

        let calls = Rc::new(Cell::new(0u64));
        let calls_clone = calls.clone();
        sim.set_resource_management_algorithm(move |_: &mut Model, _: &Parameters| -> HookResult<()> {
            calls_clone.set(calls_clone.get() + 1);
            Ok(())
        });
        sim.set_stopping_criterion(move |model: &Model| -> HookResult<bool> { Ok(model.tick() == n) });
        sim.start().unwrap();
        sim.run_model().unwrap();

        assert_eq!(sim.tick(), n);
        assert_eq!(calls.get(), n);
        assert_eq!(sim.state(), SimulationState::Halted);
        assert_eq!(sim.monitoring().buffer("EdgeServer").len(), n as usize);
    }
}

#[test]
fn test_parameters_include_current_step() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path(), DumpInterval::Infinite)
        .with_parameter("threshold", 0.5)
        .with_parameter("current_step", 100);
    let mut sim = EdgeSimulation::new(config).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    sim.set_resource_management_algorithm(move |_: &mut Model, parameters: &Parameters| -> HookResult<()> {
        seen_clone.borrow_mut().push(parameters.clone());
        Ok(())
    });
    sim.set_stopping_criterion(TickLimit::new(3));
    sim.start().unwrap();
    sim.run_model().unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 3);
    for (i, parameters) in seen.iter().enumerate() {
        assert_eq!(parameters["current_step"], json!(i + 1));
        assert_eq!(parameters["threshold"], json!(0.5));
        assert_eq!(parameters.len(), 2);
    }
}

#[test]
fn test_missing_stopping_criterion() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation(&dir);
    sim.start().unwrap();
    assert!(matches!(sim.run_model(), Err(SimError::MissingStoppingCriterion)));
    assert_eq!(sim.tick(), 0);
}

#[test]
fn test_run_requires_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation(&dir);
    sim.set_stopping_criterion(TickLimit::new(1));
    assert!(matches!(sim.run_model(), Err(SimError::InvalidState { .. })));

    sim.start().unwrap();
    sim.run_model().unwrap();
    assert!(matches!(sim.run_model(), Err(SimError::InvalidState { .. })));
    assert!(matches!(sim.start(), Err(SimError::InvalidState { .. })));
}

#[test]
// An error returned by the callback aborts the run at the tick where it happened.
fn test_callback_error_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation(&dir);
    sim.set_resource_management_algorithm(|model: &mut Model, _: &Parameters| -> HookResult<()> {
        if model.tick() == 3 {
            return Err("no hosts left".into());
        }
        Ok(())
    });
    sim.set_stopping_criterion(TickLimit::new(10));
    sim.start().unwrap();

    match sim.run_model() {
        Err(SimError::Hook { hook, source }) => {
            assert_eq!(hook, "resource management algorithm");
            assert_eq!(source.to_string(), "no hosts left");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(sim.tick(), 3);
    assert_eq!(sim.state(), SimulationState::Halted);
}

#[test]
fn test_stopping_criterion_error_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation(&dir);
    sim.set_stopping_criterion(|model: &Model| -> HookResult<bool> {
        if model.tick() == 2 {
            Err("broken predicate".into())
        } else {
            Ok(false)
        }
    });
    sim.start().unwrap();
    assert!(matches!(
        sim.run_model(),
        Err(SimError::Hook {
            hook: "stopping criterion",
            ..
        })
    ));
    assert_eq!(sim.tick(), 2);
}

#[test]
// Loading a new dataset drops entities of the previous one and rewinds the clock.
fn test_initialize_resets_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation(&dir);
    let first = Dataset::from_value(json!({
        "EdgeServer": [{"attributes": {"id": 1, "cpu": 4}}, {"attributes": {"id": 2, "cpu": 4}}],
        "User": [{"attributes": {"id": 1}}]
    }))
    .unwrap();
    let second = Dataset::from_value(json!({
        "EdgeServer": [{"attributes": {"id": 1, "cpu": 8}}]
    }))
    .unwrap();

    sim.set_stopping_criterion(TickLimit::new(4));
    sim.initialize(&first).unwrap();
    sim.run_model().unwrap();
    assert_eq!(sim.tick(), 4);

    sim.initialize(&second).unwrap();
    assert_eq!(sim.state(), SimulationState::Running);
    assert_eq!(sim.tick(), 0);
    let registry = sim.model().registry();
    assert_eq!(registry.count(&"EdgeServer".into()), 1);
    assert_eq!(registry.count(&"User".into()), 0);
    assert_eq!(sim.model().pool().capacity(1).unwrap(), Resources::new(8, 0, 0));
    assert!(sim.monitoring().buffers().is_empty());
}

#[test]
fn test_step_by_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation(&dir);
    sim.set_stopping_criterion(TickLimit::new(2));
    sim.start().unwrap();
    assert!(!sim.step().unwrap());
    assert_eq!(sim.tick(), 1);
    assert!(sim.step().unwrap());
    assert!(sim.step().is_err());
}

#[test]
fn test_config_from_file() {
    let config = SimulationConfig::from_file("test-configs/config.yaml").unwrap();
    assert_eq!(config.dump_interval, DumpInterval::Ticks(5));
    assert_eq!(config.tick_unit, "seconds");
    assert_eq!(config.tick_duration, 2.0);
    assert_eq!(config.logs_directory.to_str(), Some("test-logs"));
    assert_eq!(config.resource_management_algorithm.as_deref(), Some("FirstFit"));
    assert_eq!(config.resource_management_algorithm_parameters["threshold"], json!(0.8));

    let config = SimulationConfig::from_yaml_str("dump_interval: inf").unwrap();
    assert_eq!(config.dump_interval, DumpInterval::Infinite);
    assert_eq!(config.logs_directory.to_str(), Some("logs"));
    assert!(SimulationConfig::from_yaml_str("dump_interval: 0").is_err());
    assert!(EdgeSimulation::new(SimulationConfig {
        resource_management_algorithm: Some("RandomFit".to_string()),
        ..Default::default()
    })
    .is_err());
}

#[test]
fn test_elapsed_time_uses_tick_duration() {
    let dir = tempfile::tempdir().unwrap();
    let config = SimulationConfig {
        tick_duration: 0.5,
        ..common::config(dir.path(), DumpInterval::Infinite)
    };
    let mut sim = EdgeSimulation::new(config).unwrap();
    sim.set_stopping_criterion(TickLimit::new(3));
    sim.start().unwrap();
    sim.run_model().unwrap();
    common::assert_float_eq(sim.model().elapsed_time(), 1.5, 1e-9);
}

#[test]
// Zero dump interval set programmatically is rejected before any tick runs.
fn test_zero_dump_interval_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config(dir.path(), DumpInterval::Ticks(0));
    assert!(matches!(
        EdgeSimulation::new(config.clone()),
        Err(SimError::InvalidDumpInterval(_))
    ));
    assert!(EdgeSimulation::new(SimulationConfig {
        dump_interval: DumpInterval::Ticks(0),
        ..Default::default()
    })
    .is_err());
    assert!(!DumpInterval::Ticks(0).is_due(1));
    assert!(EdgeSimulation::new(config.with_dump_interval(DumpInterval::Ticks(1))).is_ok());
}

#[test]
// A dataset rejected by initialize leaves no entities behind.
fn test_failed_initialize_leaves_empty_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = simulation(&dir);
    let dataset = Dataset::from_value(json!({
        "EdgeServer": [{"attributes": {"id": 1, "cpu": 4}}],
        "User": [{"attributes": {"id": 1},
                  "relationships": {"base_station": {"class": "BaseStation", "id": 3}}}]
    }))
    .unwrap();
    assert!(sim.initialize(&dataset).is_err());
    assert_eq!(sim.state(), SimulationState::Idle);
    assert_eq!(sim.model().registry().kinds().count(), 0);
    assert_eq!(sim.model().pool().host_count(), 0);

    sim.set_stopping_criterion(TickLimit::new(1));
    sim.start().unwrap();
    sim.run_model().unwrap();
    assert!(sim.monitoring().buffers().is_empty());
}
