//! Scenario Simulator CLI
//!
//! Run the built-in scenarios deterministically, over one or many seeds.

use clap::Parser;
use scenario_sim::scenarios::ScenarioId;
use scenario_sim::{ScenarioResult, ScenarioRunner, SimConfig, SimError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Scenario Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "scenario-sim")]
#[command(about = "Run deterministic driving scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (overrides the config file)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Scenario to run (priority_arbitration, overwrite_tie_break, ego_arrival, cut_in, random_route, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum simulation duration in seconds (overrides the config file)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Tick rate in Hz (overrides the config file)
    #[arg(long)]
    tick_rate: Option<u32>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

/// Aggregate of one scenario across every seed it ran with.
#[derive(Debug, Default)]
struct Tally {
    runs: usize,
    failures: Vec<(u64, String)>,
    ticks: u64,
    waiting_ticks: u64,
    events_completed: u64,
    evaluation_errors: u64,
}

impl Tally {
    fn add(&mut self, result: &ScenarioResult) {
        self.runs += 1;
        self.ticks += result.total_ticks;
        self.waiting_ticks += result.metrics.waiting_ticks;
        self.events_completed += result.metrics.events_completed;
        self.evaluation_errors += result.metrics.evaluation_errors;
        if !result.passed {
            let reason = result.failure_reason.clone().unwrap_or_else(|| "unknown".to_string());
            self.failures.push((result.seed, reason));
        }
    }
}

fn main() {
    let args = Args::parse();

    // RUST_LOG takes precedence over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let config = resolve_config(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    let scenarios = select_scenarios(&args.scenario).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        let names: Vec<_> = ScenarioId::all().iter().map(ScenarioId::name).collect();
        eprintln!("Available scenarios: {}, all", names.join(", "));
        std::process::exit(1);
    });

    if !args.json {
        info!("Scenario Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "{} scenario(s) x {} seed(s) from seed {} at {} Hz",
            scenarios.len(),
            args.seeds,
            config.seed,
            config.tick_rate_hz
        );
    }

    let results = run_matrix(&config, &scenarios, args.seeds, args.json);

    let mut tallies: BTreeMap<&'static str, Tally> = BTreeMap::new();
    for result in &results {
        tallies.entry(result.scenario.name()).or_default().add(result);
    }
    let failed = results.iter().filter(|result| !result.passed).count();

    if args.json {
        print_json(&results, &tallies, failed);
    } else {
        log_summary(&tallies, results.len(), failed);
    }

    // Exit with proper code for CI
    if failed > 0 {
        std::process::exit(1);
    }
}

/// Config file (or defaults) with command line overrides applied.
fn resolve_config(args: &Args) -> Result<SimConfig, SimError> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)
            .map_err(|e| SimError::config(format!("failed to load {}: {}", path.display(), e)))?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(duration) = args.duration {
        config.max_duration_secs = duration;
    }
    if let Some(hz) = args.tick_rate {
        config.tick_rate_hz = hz;
    }
    config.validate()?;
    Ok(config)
}

fn select_scenarios(selector: &str) -> Result<Vec<ScenarioId>, String> {
    if selector == "all" {
        return Ok(ScenarioId::all());
    }
    Ok(vec![selector.parse()?])
}

/// Runs every scenario for `seeds` consecutive seeds starting at `config.seed`.
fn run_matrix(config: &SimConfig, scenarios: &[ScenarioId], seeds: usize, quiet: bool) -> Vec<ScenarioResult> {
    let mut results = Vec::with_capacity(scenarios.len() * seeds);

    for offset in 0..seeds as u64 {
        let runner = ScenarioRunner::from_config(&SimConfig {
            seed: config.seed.wrapping_add(offset),
            ..config.clone()
        });

        for scenario in scenarios {
            let result = runner.run(*scenario);
            if !quiet {
                match &result.failure_reason {
                    None => info!(
                        "✓ {} seed={} t={:.2}s events={}/{}",
                        scenario.name(),
                        result.seed,
                        result.final_time_secs,
                        result.metrics.events_completed,
                        result.metrics.events_started
                    ),
                    Some(reason) => error!("✗ {} seed={}: {}", scenario.name(), result.seed, reason),
                }
            }
            results.push(result);
        }
    }
    results
}

fn print_json(results: &[ScenarioResult], tallies: &BTreeMap<&'static str, Tally>, failed: usize) {
    let summary = serde_json::json!({
        "total": results.len(),
        "passed": results.len() - failed,
        "failed": failed,
        "scenarios": tallies.iter().map(|(name, tally)| {
            serde_json::json!({
                "scenario": name,
                "runs": tally.runs,
                "failed_seeds": tally.failures.iter().map(|(seed, _)| seed).collect::<Vec<_>>(),
                "ticks": tally.ticks,
                "waiting_ticks": tally.waiting_ticks,
                "events_completed": tally.events_completed,
            })
        }).collect::<Vec<_>>(),
        "results": results.iter().map(|r| {
            serde_json::json!({
                "scenario": r.scenario.name(),
                "seed": r.seed,
                "passed": r.passed,
                "ticks": r.total_ticks,
                "time_secs": r.final_time_secs,
                "metrics": r.metrics,
                "failure_reason": r.failure_reason,
            })
        }).collect::<Vec<_>>(),
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Failed to serialize summary: {}", e),
    }
}

fn log_summary(tallies: &BTreeMap<&'static str, Tally>, total: usize, failed: usize) {
    info!("");
    for (name, tally) in tallies {
        info!(
            "{:<22} {}/{} passed | {} ticks ({} waiting) | {} events completed",
            name,
            tally.runs - tally.failures.len(),
            tally.runs,
            tally.ticks,
            tally.waiting_ticks,
            tally.events_completed
        );
        if tally.evaluation_errors > 0 {
            warn!("{:<22} {} trigger evaluation errors", name, tally.evaluation_errors);
        }
        for (seed, reason) in &tally.failures {
            error!("  - seed={}: {}", seed, reason);
        }
    }

    if failed == 0 {
        info!("✅ All {} scenario runs passed!", total);
    } else {
        error!("❌ {}/{} scenario runs failed!", failed, total);
    }
}
