//! lbsim CLI: compare load-balancing policies on a simulated fleet.

use clap::{Parser, Subcommand};
use lbsim_core::config::SimConfig;
use lbsim_core::logging;
use lbsim_core::metrics;
use lbsim_core::Simulation;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "lbsim",
    about = "Compare load-balancing policies on a simulated client/server fleet",
    version
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG
    /// overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation with a single policy.
    Run {
        /// Path to TOML configuration file. Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Policy name, overriding the config.
        #[arg(short, long)]
        policy: Option<String>,
        /// Virtual run length in ms, overriding the config.
        #[arg(short, long)]
        duration: Option<u64>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare multiple policies on the same config.
    Compare {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Comma-separated list of policy names (all when omitted).
        #[arg(short = 'P', long, value_delimiter = ',')]
        policies: Vec<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run, then dump the final simulation state as JSON.
    Snapshot {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Virtual run length in ms, overriding the config.
        #[arg(short, long)]
        duration: Option<u64>,
        /// Output file (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep global request rates under one policy.
    Sweep {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Policy name, overriding the config.
        #[arg(short, long)]
        policy: Option<String>,
        /// Comma-separated list of global request rates.
        #[arg(long, value_delimiter = ',')]
        rates: Vec<f64>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List available policies.
    ListPolicies,
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(logging::level_from_verbosity(cli.verbose));

    match cli.command {
        Commands::Run {
            config,
            policy,
            duration,
            output,
        } => {
            let mut sim_config = load_config(config.as_deref());
            if let Some(name) = policy {
                apply_policy(&mut sim_config, &name);
            }
            if let Some(ms) = duration {
                sim_config.simulation.duration_ms = ms;
            }

            let result = lbsim_core::run_simulation(sim_config).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            });
            println!("{}", metrics::format_table(&result));

            if let Some(output_path) = output {
                write_json(&result, &output_path);
                println!("Results written to {}", output_path.display());
            }
        }
        Commands::Compare {
            config,
            policies,
            output,
        } => {
            let sim_config = load_config(config.as_deref());
            let names: Vec<&str> = if policies.is_empty() {
                lbsim_algorithms::available_policies()
            } else {
                policies.iter().map(|s| s.as_str()).collect()
            };

            let results =
                lbsim_core::compare_policies(&sim_config, &names).unwrap_or_else(|e| {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                });
            println!("{}", metrics::format_comparison_table(&results));

            for result in &results {
                println!("{}", metrics::format_table(result));
            }

            if let Some(output_path) = output {
                write_json(&results, &output_path);
                println!("Results written to {}", output_path.display());
            }
        }
        Commands::Snapshot {
            config,
            duration,
            output,
        } => {
            let sim_config = load_config(config.as_deref());
            let until = duration.unwrap_or(sim_config.simulation.duration_ms) as f64;

            let mut sim = Simulation::new(sim_config).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            });
            sim.start();
            sim.run_until(until);
            let snapshot = sim.snapshot();

            match output {
                Some(output_path) => {
                    write_json(&snapshot, &output_path);
                    println!("Snapshot written to {}", output_path.display());
                }
                None => println!("{}", to_json(&snapshot)),
            }
        }
        Commands::Sweep {
            config,
            policy,
            rates,
            output,
        } => {
            let mut sim_config = load_config(config.as_deref());
            if let Some(name) = policy {
                apply_policy(&mut sim_config, &name);
            }

            let mut all_results = Vec::new();
            for rate in &rates {
                let mut cfg = sim_config.clone();
                cfg.sources.global_rps = *rate;
                let result = lbsim_core::run_simulation(cfg).unwrap_or_else(|e| {
                    eprintln!("Error at rate {}: {}", rate, e);
                    std::process::exit(1);
                });
                println!(
                    "Rate {:.1} req/s: E2E p50={:.1}ms p99={:.1}ms | window p99={:.1}ms | {:.2} req/s completed",
                    rate,
                    result.end_to_end_latency.p50,
                    result.end_to_end_latency.p99,
                    result.windowed_p99_ms,
                    result.requests_per_sec
                );
                all_results.push(result);
            }

            if let Some(output_path) = output {
                write_json(&all_results, &output_path);
                println!("Sweep results written to {}", output_path.display());
            }
        }
        Commands::ListPolicies => {
            println!("Available load-balancing policies:");
            for name in lbsim_algorithms::available_policies() {
                println!("  - {}", name);
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> SimConfig {
    match path {
        Some(p) => SimConfig::from_file(p).unwrap_or_else(|e| {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }),
        None => SimConfig::default(),
    }
}

fn apply_policy(config: &mut SimConfig, name: &str) {
    config.balancer.policy = name.parse().unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error serializing output: {}", e);
        std::process::exit(1);
    })
}

fn write_json<T: Serialize>(value: &T, path: &Path) {
    std::fs::write(path, to_json(value)).unwrap_or_else(|e| {
        eprintln!("Error writing output: {}", e);
        std::process::exit(1);
    });
}
