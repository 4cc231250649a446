//! Command-line definition.

use std::path::PathBuf;

use clap::Parser;

/// Electric-vehicle rotation planner: rolling-horizon branch-and-price over
/// CSV inputs.
#[derive(Parser, Debug)]
#[command(name = "rotor", version, about)]
pub struct Cli {
    /// Directory holding locations.csv, travel.csv, chargers.csv,
    /// vehicles.csv, trips.csv and maintenances.csv
    pub data_dir: PathBuf,

    /// Path to the config CSV (defaults to <DATA_DIR>/config.csv)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory for the schedule and statistics CSVs
    #[arg(long, default_value = "outputs")]
    pub output: PathBuf,

    /// Override const_nr_threads from the config
    #[arg(long)]
    pub threads: Option<u32>,

    /// Fix the pricing shuffle seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Verbose (debug-level) logging
    #[arg(long, short)]
    pub verbose: bool,
}
