//! fixture-harness - shared test fixtures with parallelism gating
//!
//! Provisions a SQLite fixture store and HTTP service stubs once per suite,
//! decides whether they must support fully parallel execution, runs a test
//! command against them, and always tears them down.
//!
//! ## Usage
//!
//! ```bash
//! # Run cargo test against fresh fixtures
//! fixture-harness run -- cargo test
//!
//! # Opt in to fully parallel mode with four runner threads
//! ENABLE_FULLY_PARALLEL_TESTS=true fixture-harness run --test-threads 4 -- cargo test
//!
//! # Verify the fixtures can be provisioned
//! fixture-harness check --config fixture-harness.yaml
//!
//! # Show recognised environment variables
//! fixture-harness env
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};

use fixture_harness::config::{print_env_help, EnvConfig, HarnessConfig};
use fixture_harness::utils::{init_logger, LogLevel};
use fixture_harness::{
    CommandRunner, FixtureProvisioner, ParallelismConfig, SharedResourceContext, SuiteOrchestrator,
    SuiteResult,
};

mod cli;

use cli::{Args, Command, ConfigAction, ProvisionArgs};

fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        args.log_level
            .as_deref()
            .and_then(LogLevel::from_str)
            .unwrap_or_else(|| LogLevel::from_env(&env))
    };
    init_logger(level);

    match args.command {
        Command::Run(run_args) => {
            let mut runner = CommandRunner::from_argv(&run_args.command)
                .context("No test command given after `--`")?;
            let orchestrator = build_orchestrator(&run_args.provision, &env)
                .unwrap_or_else(|result| std::process::exit(result.exit_code()));
            orchestrator.run(&mut runner)
        }
        Command::Check(provision_args) => check(&provision_args, &env),
        Command::Env => {
            print_env_help();
            println!();
            env.print_summary();
            Ok(())
        }
        Command::Config(config_args) => manage_config(config_args.action, &env),
    }
}

/// An unusable config file fails like any other fixture setup: no test has run
fn build_orchestrator(
    args: &ProvisionArgs,
    env: &EnvConfig,
) -> Result<SuiteOrchestrator<FixtureProvisioner>, SuiteResult> {
    let mut config = HarnessConfig::resolve(args.config.as_deref(), env).map_err(|e| {
        error!("Aborting suite: {:#}", e);
        SuiteResult::ProvisioningFailed
    })?;

    if args.no_store {
        config.enable_store = false;
    }
    if args.no_resources {
        config.enable_resources = false;
    }
    if let Some(dir) = &args.store_dir {
        config.store.parent_dir = Some(dir.clone());
    }

    let parallelism =
        ParallelismConfig::from_env(env).with_requested(args.test_threads.as_deref());

    Ok(SuiteOrchestrator::new(
        parallelism,
        FixtureProvisioner::new(config.provision_options()),
    ))
}

fn check(args: &ProvisionArgs, env: &EnvConfig) -> Result<()> {
    let orchestrator = build_orchestrator(args, env)
        .unwrap_or_else(|result| std::process::exit(result.exit_code()));
    info!("Checking fixtures in {} mode", orchestrator.mode());

    let result = orchestrator.execute(&mut |ctx: &SharedResourceContext| {
        println!("Fixtures provisioned ({} mode, {} worker(s)):", ctx.mode(), ctx.worker_count());
        for (key, value) in ctx.exported_env() {
            println!("  {key}={value}");
        }
        SuiteResult::Passed
    });

    match result {
        SuiteResult::Passed => {
            println!("✓ Fixtures provisioned and released");
            Ok(())
        }
        other => {
            println!("✗ Fixture check {other}");
            std::process::exit(other.exit_code())
        }
    }
}

fn manage_config(action: ConfigAction, env: &EnvConfig) -> Result<()> {
    match action {
        ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }

            HarnessConfig::example().save(&output)?;
            println!("✓ Configuration file created: {}", output.display());
        }

        ConfigAction::Show { config, format } => {
            let config = HarnessConfig::resolve(config.as_deref(), env)?;
            let output = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{output}");
        }

        ConfigAction::Validate { file } => {
            let Some(path) = file.or_else(HarnessConfig::discover) else {
                bail!("No configuration file found");
            };

            match HarnessConfig::load(&path) {
                Ok(config) => {
                    println!("✓ Configuration file is valid: {}", path.display());
                    println!(
                        "  store: {}, resources: {} stub(s), {} external",
                        config.enable_store,
                        config.resources.stubs.len(),
                        config.resources.external.len()
                    );
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {}", path.display());
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
