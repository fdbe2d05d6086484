//! Datacenter Network Simulator CLI
//!
//! Run named benchmark scenarios over seeded trials and report network metrics.

use clap::Parser;
use dcsim_core::SyncModel;
use dcsim_sim::algorithms;
use dcsim_sim::scenarios::ScenarioId;
use dcsim_sim::{BenchmarkRunner, ExportSummary, ScenarioResult, SimExport};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Deterministic datacenter network simulator
#[derive(Parser, Debug)]
#[command(name = "dcsim")]
#[command(about = "Run deterministic datacenter network simulations", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (baseline, lossy, jittery, partition, power_chaos, sync_strict, partial_sync, all)
    #[arg(short = 'S', long, default_value = "baseline")]
    scenario: String,

    /// Algorithm plugin (random_traffic, heartbeat, idle); defaults per scenario
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Steps per trial
    #[arg(long, default_value = "100")]
    steps: u64,

    /// Trials per scenario, with consecutive seeds
    #[arg(short, long, default_value = "1")]
    trials: u64,

    /// Simulated seconds per step
    #[arg(long, default_value = "1.0")]
    tick: f64,

    /// Override packet loss probability
    #[arg(long)]
    loss: Option<f64>,

    /// Override jitter range in seconds
    #[arg(long)]
    jitter: Option<f64>,

    /// Override synchronization model (synchronous, asynchronous, partial_synchronous)
    #[arg(long)]
    sync_model: Option<SyncModel>,

    /// Record the full event trace (included in --export output)
    #[arg(long)]
    trace: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for scripting
    #[arg(long)]
    json: bool,

    /// Export all results to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else if args.json {
        Level::WARN
    } else {
        Level::INFO
    };

    let installed = if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };
    if let Err(e) = installed {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn parse_scenarios(name: &str) -> Result<Vec<ScenarioId>, String> {
    if name == "all" {
        Ok(ScenarioId::all())
    } else {
        name.parse().map(|s| vec![s])
    }
}

fn log_result(result: &ScenarioResult) {
    let m = &result.metrics;
    if result.passed() {
        info!(
            "✓ {} (seed={}, {}) delivered {}/{} ({:.1}%) | latency mean {:.3}s p95 {:.3}s | drops loss={} fault={} partition={} | sync viol={} ack={} timeout={}",
            result.scenario,
            result.seed,
            result.algorithm,
            m.counters.delivered,
            m.counters.sent,
            m.delivery_rate * 100.0,
            m.latency.mean,
            m.latency.p95,
            m.counters.dropped_loss,
            m.counters.dropped_fault,
            m.counters.dropped_partition,
            m.counters.sync_violations,
            m.counters.sync_acks,
            m.counters.sync_timeouts,
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario,
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    if !args.json {
        info!("Datacenter Network Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios = parse_scenarios(&args.scenario).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
        eprintln!("Available scenarios: {}, all", names.join(", "));
        std::process::exit(1);
    });

    if let Some(name) = &args.algorithm {
        if algorithms::by_name(name, 0).is_err() {
            eprintln!("Error: unknown algorithm '{}'", name);
            eprintln!("Available algorithms: {}", algorithms::names().join(", "));
            std::process::exit(1);
        }
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let mut runner = BenchmarkRunner::new(base_seed)
        .with_trials(args.trials)
        .with_steps(args.steps)
        .with_tick(args.tick)
        .with_trace(args.trace);
    if let Some(name) = &args.algorithm {
        runner = runner.with_algorithm(name.clone());
    }
    if let Some(loss) = args.loss {
        runner = runner.with_override(move |c| c.network.packet_loss_rate = loss);
    }
    if let Some(jitter) = args.jitter {
        runner = runner.with_override(move |c| c.network.jitter_range = jitter);
    }
    if let Some(model) = args.sync_model {
        runner = runner.with_override(move |c| c.network.sync_model = model);
    }

    let results = runner.run(&scenarios);
    let summary = ExportSummary::from_results(&results);

    if args.json {
        let report = serde_json::json!({
            "seed": base_seed,
            "summary": summary,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "trial": r.trial,
                    "seed": r.seed,
                    "algorithm": r.algorithm,
                    "passed": r.passed(),
                    "steps": r.total_steps,
                    "time_secs": r.final_time_secs,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: failed to encode report: {}", e),
        }
    } else {
        for result in &results {
            log_result(result);
        }
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if summary.failed == 0 {
            info!(
                "✅ All {} runs completed | mean delivery {:.1}% | mean latency {:.3}s",
                summary.total,
                summary.mean_delivery_rate * 100.0,
                summary.mean_latency_secs
            );
        } else {
            error!("❌ {}/{} runs failed", summary.failed, summary.total);
        }
    }

    if let Some(path) = &args.export {
        let mut export = SimExport::new(runner.base_config().clone());
        let failed = summary.failed;
        export.extend(results);
        match export.write_to_file(path) {
            Ok(()) => info!("Exported {} results to {}", export.results.len(), path),
            Err(e) => {
                error!("Failed to write export: {}", e);
                std::process::exit(1);
            }
        }
        if failed > 0 {
            std::process::exit(1);
        }
        return;
    }

    // Exit with proper code for scripts
    if summary.failed > 0 {
        std::process::exit(1);
    }
}
