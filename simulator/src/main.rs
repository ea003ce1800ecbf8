//! Unitwork Simulator
//!
//! Drives coordinators over a ledger, an outbox and a fault-injecting
//! participant, then reports how every run ended.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod fault;
mod metrics;
mod scenario;

use controller::SimulationController;
use scenario::Scenario;
use unitwork_coordinator::CoordinatorConfig;
use unitwork_participant::OutboxConfig;

/// Unitwork Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Unitwork coordinator simulation environment")]
struct Args {
    /// Scenario to run
    #[arg(short, long, default_value = "happy-path")]
    scenario: String,

    /// Number of coordinated runs
    #[arg(short, long, default_value = "100")]
    runs: u64,

    /// Number of ledger accounts
    #[arg(long, default_value = "4")]
    accounts: usize,

    /// Fault probability per run for random-faults
    #[arg(long, default_value = "0.2")]
    fault_rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Print metrics as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.fault_rate),
        "fault rate must be between 0 and 1"
    );

    // Load configuration
    let coordinator_config = CoordinatorConfig::from_env();
    if let Err(e) = coordinator_config.validate() {
        error!(error = %e, "Invalid coordinator configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let outbox_config = OutboxConfig::from_env();
    if let Err(e) = outbox_config.validate() {
        error!(error = %e, "Invalid outbox configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let scenario = Scenario::load(&args.scenario)?;
    info!("Starting Unitwork Simulator");
    info!(
        "Scenario: {}, runs: {}, coordinator: {}",
        scenario.name(),
        args.runs,
        coordinator_config.label()
    );

    let mut controller = SimulationController::new(scenario, args.fault_rate, args.seed)
        .with_config(coordinator_config, outbox_config);
    controller.initialize(args.accounts)?;
    controller.run(args.runs).await?;

    let metrics = controller.metrics();
    let coordinator = controller.coordinator_metrics();

    if args.json {
        let report = serde_json::json!({
            "scenario": scenario,
            "simulation": metrics,
            "coordinator": coordinator.snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Simulation complete: {}", scenario.name());
    println!("Total runs: {}", metrics.total_runs);
    println!("Committed: {}", metrics.committed);
    println!("Begin failures: {}", metrics.begin_failures);
    println!("Action failures: {}", metrics.action_failures);
    println!("Commit failures: {}", metrics.commit_failures);
    println!("Partial commits: {}", metrics.partial_commits);
    println!("Runs with rollback failures: {}", metrics.runs_with_rollback_failures);
    println!("Events delivered: {}", metrics.events_delivered);
    println!("Journal entries: {}", controller.ledger().journal_len());
    println!("Commit rate: {:.2}", metrics.commit_rate());
    println!(
        "Latency: avg {}us, p50 {}us, p99 {}us",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    println!();
    print!("{}", coordinator.to_prometheus());

    Ok(())
}
