//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Provision shared test fixtures and run a suite against them
#[derive(Parser, Debug)]
#[command(name = "fixture-harness")]
#[command(version)]
#[command(about = "Provision shared test fixtures, run a suite, always tear down")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test command against freshly provisioned fixtures
    Run(RunArgs),

    /// Provision and release the fixtures without running anything
    Check(ProvisionArgs),

    /// Show recognised environment variables
    Env,

    /// Manage configuration files
    Config(ConfigArgs),
}

/// Fixture and parallelism options shared by `run` and `check`
#[derive(ClapArgs, Debug, Default)]
pub struct ProvisionArgs {
    /// Runner parallelism (overrides RUST_TEST_THREADS)
    #[arg(long)]
    pub test_threads: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Skip the fixture store
    #[arg(long)]
    pub no_store: bool,

    /// Skip stubs and external resources
    #[arg(long)]
    pub no_resources: bool,

    /// Parent directory for the store's temporary root
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

/// Arguments for run command
#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub provision: ProvisionArgs,

    /// Test command and its arguments, after `--`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for config command
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a starter configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "fixture-harness.yaml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the resolved configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        file: Option<PathBuf>,
    },
}
