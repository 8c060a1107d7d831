//! CourtView DST Simulator CLI
//!
//! Run deterministic broadcast scenarios.

use clap::Parser;
use courtview_sim::{ScenarioId, ScenarioResult, ScenarioRunner};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// CourtView Deterministic Simulation Testing CLI
#[derive(Parser, Debug)]
#[command(name = "courtview-sim")]
#[command(about = "Run deterministic simulation tests for CourtView", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,
    
    /// Scenario to run (late_joiner, severed_subscriber, idle_hub, source_outage, full_match, replay_failure, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,
    
    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: u64,
    
    /// Frames in the full match scenario
    #[arg(short, long, default_value = "300")]
    frames: u64,
    
    /// Players in the full match scenario
    #[arg(short, long, default_value = "12")]
    players: usize,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    
    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    
    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
    
    if !args.json {
        info!("CourtView DST Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
    
    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: late_joiner, severed_subscriber, idle_hub, source_outage, full_match, replay_failure, all");
                std::process::exit(1);
            }
        }
    };
    
    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };
    
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    
    for offset in 0..args.seeds.max(1) {
        let seed = base_seed.wrapping_add(offset);
        let runner = ScenarioRunner::new(seed)
            .with_frames(args.frames)
            .with_players(args.players);
        
        for scenario in &scenarios {
            let result = runner.run(*scenario).await;
            
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED - {}", scenario.name(), seed, scenario.description());
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }
    
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    
    if args.json {
        match serde_json::to_string_pretty(&all_results) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to encode results: {e}"),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("{} passed, {} failed", all_results.len() - failed_count, failed_count);
    }
    
    if failed_count > 0 {
        std::process::exit(1);
    }
}
