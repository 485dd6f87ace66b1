//! TinyCoin scenario runner.
//!
//! Reads a `key = value` scenario file (see the config keys in
//! `distsim_simulator::SimSettings`), runs the simulation to its block
//! budget and prints fork statistics and the honest/selfish split of the
//! surviving chain.
//!
//! ```bash
//! tinycoin scenario.conf
//! ```

use clap::Parser;
use distsim_simulator::{run_simulation, Config, SimSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tinycoin")]
#[command(version, about = "Proof-of-work network simulation with optional selfish mining")]
struct Args {
    /// Scenario configuration file.
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,distsim_simulator=info")),
        )
        .init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "simulation failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), distsim_simulator::DriverError> {
    let cfg = Config::load(&args.config)?;
    let settings = SimSettings::from_config(&cfg)?;
    let outcome = run_simulation(&settings)?;

    let total_power = outcome.honest_power + outcome.selfish_power;
    println!(
        "There are {} nodes and {} edges.",
        settings.network_size, outcome.edge_count
    );
    println!(
        "{} honest miners have {} mining power.",
        outcome.honest.len(),
        outcome.honest_power
    );
    println!(
        "{} selfish miners have {} mining power.",
        outcome.selfish.len(),
        outcome.selfish_power
    );
    let miners = outcome.honest.len() + outcome.selfish.len();
    if miners > 0 {
        println!(
            "{:.2}% of the miners are selfish.",
            100.0 * outcome.selfish.len() as f64 / miners as f64
        );
    }
    if total_power > 0 {
        println!(
            "They control {:.2}% of the total mining power.",
            100.0 * outcome.selfish_power as f64 / total_power as f64
        );
    }

    let report = &outcome.report;
    println!("There were {} blockchain splits.", report.total_splits);
    println!(
        "The longest split lasted for {} blocks.",
        report.max_split_len
    );
    println!(
        "Honest miners have mined {} real blocks.",
        report.honest_main_blocks
    );
    println!(
        "Selfish miners have mined {} real blocks.",
        report.selfish_main_blocks
    );
    println!(
        "{:.2}% of real blocks were mined by selfish miners",
        100.0 * report.selfish_fraction()
    );
    Ok(())
}
