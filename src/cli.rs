use clap::Parser;
use std::path::PathBuf;

use crate::config::BenchConfig;

/// Measures resolution of a non-existing path against many vanity paths
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Outer vanity nodes to create below the root under test.
    /// Overrides the config file (default: 1000).
    #[arg(short = 'n', long = "nodes", value_name = "N")]
    pub node_count: Option<usize>,

    /// Vanity children per outer node (default: 10).
    #[arg(short = 'c', long = "children", value_name = "M")]
    pub child_node_count: Option<usize>,

    /// Measured iterations of the resolve call (default: 10).
    #[arg(short, long, value_name = "COUNT")]
    pub iterations: Option<usize>,

    /// Untimed iterations before measuring (default: 0).
    #[arg(long, value_name = "COUNT")]
    pub warmup: Option<usize>,

    /// Seed the alias generator for a reproducible population.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Configuration file (default: ./vpb.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v = info, -vv = debug, -vvv = trace).
    /// Default is warn level. Can also set RUST_LOG env var.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Get the log level filter string based on verbosity flags.
    /// Returns a filter suitable for tracing_subscriber::EnvFilter.
    pub fn log_level_filter(&self) -> String {
        let level = if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };

        format!("{}={}", env!("CARGO_CRATE_NAME"), level)
    }

    /// Applies the command-line overrides on top of a loaded config.
    pub fn apply(&self, config: &mut BenchConfig) {
        if let Some(nodes) = self.node_count {
            config.node_count = nodes;
        }
        if let Some(children) = self.child_node_count {
            config.child_node_count = children;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(warmup) = self.warmup {
            config.warmup_iterations = warmup;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.json {
            config.output = "json".to_string();
        }
    }
}
