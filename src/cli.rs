//! CLI argument parsing for delegation-metrics

use crate::config::PipelineVariant;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for comparison tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Comma-separated, one header row (default)
    Csv,
    /// JSON array of records
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "delegation-metrics")]
#[command(version)]
#[command(
    about = "Derive, aggregate and compare metrics of simulated proxy-voting experiments",
    long_about = None
)]
pub struct Cli {
    /// Enable debug logging to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Derive metrics for a raw batch and write processed/described tables
    Process {
        /// Raw batch file (Arrow IPC / feather v2)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory for output tables (default: the input's directory)
        #[arg(short, long = "output-dir", value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Derivation stages to run (overrides the config file)
        #[arg(long, value_enum)]
        variant: Option<PipelineVariant>,

        /// TOML pipeline configuration
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Upper bound of the preference space (overrides the config file)
        #[arg(long = "max-preference", value_name = "VALUE", allow_hyphen_values = true)]
        max_preference: Option<f64>,

        /// Lower bound of the preference space (overrides the config file)
        #[arg(long = "min-preference", value_name = "VALUE", allow_hyphen_values = true)]
        min_preference: Option<f64>,
    },

    /// Convert every CSV file in a directory to feather
    Convert {
        /// Directory scanned for *.csv files
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Log progress every 100 files
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run rank-sum comparisons of a target column between groups
    Compare {
        /// One or more tables, concatenated in order
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Numeric column to compare
        #[arg(short, long, value_name = "COL")]
        target: String,

        /// Grouping columns (e.g. --group-by coordination_mechanism,shifted)
        #[arg(
            short,
            long = "group-by",
            value_name = "COL",
            value_delimiter = ',',
            required = true
        )]
        group_by: Vec<String>,

        /// Compare every ordered pair of groups instead of each group vs. the rest
        #[arg(long)]
        pairwise: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "csv")]
        format: OutputFormat,
    },
}
