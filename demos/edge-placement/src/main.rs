use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use dslab_edge::config::SimulationConfig;
use dslab_edge::dataset::Dataset;
use dslab_edge::error::HookResult;
use dslab_edge::log_file::{export_csv, read_log};
use dslab_edge::model::Model;
use dslab_edge::resource_pool::Resources;
use dslab_edge::simulation::EdgeSimulation;
use dslab_edge::{log_info, EntityKind, Relationship};

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path or URL of dataset (default - generate synthetic dataset)
    #[clap(short, long)]
    dataset: Option<String>,

    /// Path to simulation config
    #[clap(short, long)]
    config: Option<String>,

    /// Placement algorithms to compare
    #[clap(short, long, default_values = &["FirstFit", "BestFit", "WorstFit"])]
    algorithms: Vec<String>,

    /// Maximum number of ticks
    #[clap(short, long, default_value_t = 100)]
    ticks: u64,

    /// Number of servers in synthetic dataset
    #[clap(long, default_value_t = 10)]
    servers: u32,

    /// Number of services in synthetic dataset
    #[clap(long, default_value_t = 40)]
    services: u32,

    /// Directory for CSV reports
    #[clap(long)]
    csv: Option<PathBuf>,
}

/// Builds a dataset with heterogeneous servers attached to base stations and unplaced services.
fn synthetic_dataset(servers: u32, services: u32) -> dslab_edge::Result<Dataset> {
    let mut model = Model::new();
    let base_station = model
        .create_entity(EntityKind::BaseStation)?
        .set_attribute("coordinates", serde_json::json!([0, 0]))
        .entity_ref();
    for i in 0..servers {
        let server = model.create_server(Resources::new(8 + 8 * (i % 3), 16 + 16 * (i % 2) as u64, 512))?;
        model
            .entity_mut(&server)?
            .set_attribute("model_name", format!("E{}", i % 3))
            .set_relationship("base_station", Some(Relationship::One(base_station.clone())));
    }
    for i in 0..services {
        model.create_service(Resources::new(1 + i % 5, 2 + (i % 4) as u64, 10 * (i % 3) as u64))?;
    }
    Ok(Dataset::from_model(&model))
}

fn run(dataset: &Dataset, base_config: &SimulationConfig, algorithm: &str, args: &Args) -> dslab_edge::Result<()> {
    let config = SimulationConfig {
        resource_management_algorithm: Some(algorithm.to_string()),
        logs_directory: base_config.logs_directory.join(algorithm),
        ..base_config.clone()
    };
    let mut sim = EdgeSimulation::new(config)?;
    let max_ticks = args.ticks;
    sim.set_stopping_criterion(move |model: &Model| -> HookResult<bool> {
        Ok(model.tick() >= max_ticks || model.pool().unplaced_services().is_empty())
    });
    sim.initialize(dataset)?;

    let t = Instant::now();
    sim.run_model()?;
    let elapsed = t.elapsed().as_secs_f64();

    let ctx = sim.model().create_context("edge-placement");
    let pool = sim.model().pool();
    let used_servers = pool
        .host_ids()
        .into_iter()
        .filter(|&h| !pool.hosted_services(h).is_empty())
        .count();
    log_info!(
        ctx,
        "{}: placed {} of {} services on {} of {} servers in {} ticks ({:.3}s)",
        algorithm,
        pool.service_ids().len() - pool.unplaced_services().len(),
        pool.service_ids().len(),
        used_servers,
        pool.host_count(),
        sim.tick(),
        elapsed
    );
    for host in pool.host_ids() {
        log_info!(
            ctx,
            "EdgeServer_{}: cpu load {:.2}, memory load {:.2}",
            host,
            pool.cpu_load(host)?,
            pool.memory_load(host)?
        );
    }

    if let Some(csv_dir) = &args.csv {
        std::fs::create_dir_all(csv_dir)?;
        for kind in [EntityKind::EdgeServer, EntityKind::Service] {
            let log_path = sim.monitoring().log_path(kind.name());
            let records = if log_path.exists() {
                read_log(&log_path)?
            } else {
                sim.monitoring().buffer(kind.name()).to_vec()
            };
            export_csv(&records, csv_dir.join(format!("{}_{}.csv", algorithm, kind)))?;
        }
    }
    Ok(())
}

fn main() {
    init_logger();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SimulationConfig::from_file(path),
        None => Ok(SimulationConfig::default()),
    };
    let dataset = match &args.dataset {
        Some(source) => Dataset::load(source),
        None => synthetic_dataset(args.servers, args.services),
    };
    let (config, dataset) = match (config, dataset) {
        (Ok(config), Ok(dataset)) => (config, dataset),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Failed to prepare simulation: {}", e);
            std::process::exit(1);
        }
    };

    for algorithm in &args.algorithms {
        if let Err(e) = run(&dataset, &config, algorithm, &args) {
            eprintln!("Simulation with {} failed: {}", algorithm, e);
            std::process::exit(1);
        }
    }
}
