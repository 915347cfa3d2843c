//! Suite orchestration
//!
//! Decide → Provision → Execute → Teardown → Exit. The context is owned here
//! and lent to the runner; teardown runs on every path that returns control,
//! including a runner panic.

use anyhow::Result;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::{EnvConfig, HarnessConfig};
use crate::context::{FixtureProvisioner, Provisioner};
use crate::policy::{ExecutionMode, ParallelismConfig};
use crate::runner::{SuiteResult, SuiteRunner};
use crate::utils::Stopwatch;

/// Drives one suite invocation end to end
#[derive(Debug)]
pub struct SuiteOrchestrator<P: Provisioner = FixtureProvisioner> {
    parallelism: ParallelismConfig,
    provisioner: P,
}

impl SuiteOrchestrator<FixtureProvisioner> {
    /// Build from the environment and the discovered config file
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(None)
    }

    /// Like [`from_env`](Self::from_env) with an explicit config file
    pub fn from_env_with(config_file: Option<&Path>) -> Result<Self> {
        let env = EnvConfig::load();
        let config = HarnessConfig::resolve(config_file, &env)?;
        Ok(Self::from_config(&env, &config))
    }

    /// Build from an already resolved configuration
    pub fn from_config(env: &EnvConfig, config: &HarnessConfig) -> Self {
        Self::new(
            ParallelismConfig::from_env(env),
            FixtureProvisioner::new(config.provision_options()),
        )
    }
}

impl<P: Provisioner> SuiteOrchestrator<P> {
    pub fn new(parallelism: ParallelismConfig, provisioner: P) -> Self {
        Self {
            parallelism,
            provisioner,
        }
    }

    pub fn parallelism(&self) -> &ParallelismConfig {
        &self.parallelism
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Execution mode this orchestrator will use
    pub fn mode(&self) -> ExecutionMode {
        self.parallelism.mode()
    }

    /// Run the suite and return its aggregate result without exiting
    pub fn execute<R>(&self, runner: &mut R) -> SuiteResult
    where
        R: SuiteRunner<P::Context> + ?Sized,
    {
        let mut stopwatch = Stopwatch::new();

        let mode = self.mode();
        if mode.is_parallel() {
            info!(
                parallelism = self.parallelism.requested_parallelism,
                "Fully parallel tests enabled"
            );
        }

        let ctx = match self.provisioner.provision(mode, &self.parallelism) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("Aborting suite: {}", e);
                return SuiteResult::ProvisioningFailed;
            }
        };
        stopwatch.lap("provision");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.run(&ctx)));
        stopwatch.lap("execute");

        if let Err(e) = self.provisioner.release(ctx) {
            warn!("Teardown failed: {}", e);
        }
        stopwatch.lap("teardown");

        for (phase, elapsed) in stopwatch.lap_times() {
            debug!("{} took {}ms", phase, elapsed.as_millis());
        }

        match outcome {
            Ok(result) => {
                info!("Suite {} ({})", result, mode);
                result
            }
            Err(_) => {
                error!("Suite runner panicked");
                SuiteResult::RunnerAborted
            }
        }
    }

    /// Run the suite and exit the process with its result
    pub fn run<R>(self, runner: &mut R) -> !
    where
        R: SuiteRunner<P::Context> + ?Sized,
    {
        let result = self.execute(runner);
        std::process::exit(result.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ProvisionError, SharedResourceContext, TeardownError};
    use crate::runner::TestSuite;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct Fixture {
        mode: ExecutionMode,
    }

    /// Counts lifecycle calls; optionally fails either phase
    #[derive(Default)]
    struct CountingProvisioner {
        provisions: AtomicUsize,
        releases: AtomicUsize,
        fail_provision: bool,
        fail_release: bool,
    }

    impl Provisioner for CountingProvisioner {
        type Context = Fixture;

        fn provision(
            &self,
            mode: ExecutionMode,
            _parallelism: &ParallelismConfig,
        ) -> Result<Fixture, ProvisionError> {
            self.provisions.fetch_add(1, Ordering::SeqCst);
            if self.fail_provision {
                return Err(ProvisionError::Backend("store unreachable".into()));
            }
            Ok(Fixture { mode })
        }

        fn release(&self, _ctx: Fixture) -> Result<(), TeardownError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                return Err(TeardownError::Backend("directory busy".into()));
            }
            Ok(())
        }
    }

    fn orchestrator(
        parallelism: usize,
        enabled: bool,
        provisioner: CountingProvisioner,
    ) -> SuiteOrchestrator<CountingProvisioner> {
        SuiteOrchestrator::new(ParallelismConfig::new(parallelism, enabled), provisioner)
    }

    #[test]
    fn test_release_once_on_pass() {
        let orch = orchestrator(4, true, CountingProvisioner::default());
        let mut runs = 0;

        let result = orch.execute(&mut |ctx: &Fixture| {
            runs += 1;
            assert_eq!(ctx.mode, ExecutionMode::FullyParallel);
            SuiteResult::Passed
        });

        assert_eq!(result, SuiteResult::Passed);
        assert_eq!(runs, 1);
        assert_eq!(orch.provisioner().provisions.load(Ordering::SeqCst), 1);
        assert_eq!(orch.provisioner().releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_are_forwarded() {
        let orch = orchestrator(1, false, CountingProvisioner::default());

        let result = orch.execute(&mut |_: &Fixture| SuiteResult::Failed);

        assert_eq!(result.exit_code(), 1);
        assert_eq!(orch.provisioner().releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_once_on_runner_panic() {
        let orch = orchestrator(2, true, CountingProvisioner::default());

        let result = orch.execute(&mut |_: &Fixture| -> SuiteResult { panic!("runner blew up") });

        assert_eq!(result, SuiteResult::RunnerAborted);
        assert_ne!(result.exit_code(), 0);
        assert_eq!(orch.provisioner().releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_provisioning_failure_runs_nothing() {
        let orch = orchestrator(
            4,
            true,
            CountingProvisioner {
                fail_provision: true,
                ..Default::default()
            },
        );
        let mut runs = 0;

        let result = orch.execute(&mut |_: &Fixture| {
            runs += 1;
            SuiteResult::Passed
        });

        assert_eq!(result, SuiteResult::ProvisioningFailed);
        assert_eq!(result.exit_code(), 2);
        assert_eq!(runs, 0);
        assert_eq!(orch.provisioner().releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_teardown_error_keeps_result() {
        let provisioner = CountingProvisioner {
            fail_release: true,
            ..Default::default()
        };

        let passing = orchestrator(1, false, provisioner);
        assert_eq!(
            passing.execute(&mut |_: &Fixture| SuiteResult::Passed),
            SuiteResult::Passed
        );
        assert_eq!(
            passing.execute(&mut |_: &Fixture| SuiteResult::Exited(3)),
            SuiteResult::Exited(3)
        );
    }

    #[test]
    fn test_mode_selection() {
        let provisioner = CountingProvisioner::default;
        assert_eq!(orchestrator(1, true, provisioner()).mode(), ExecutionMode::Serialized);
        assert_eq!(orchestrator(8, false, provisioner()).mode(), ExecutionMode::Serialized);
        assert_eq!(orchestrator(8, true, provisioner()).mode(), ExecutionMode::FullyParallel);
    }

    #[test]
    #[traced_test]
    fn test_logs_parallelism_when_parallel() {
        let orch = orchestrator(4, true, CountingProvisioner::default());
        orch.execute(&mut |_: &Fixture| SuiteResult::Passed);

        assert!(logs_contain("Fully parallel tests enabled"));
        assert!(logs_contain("parallelism=4"));
    }

    #[test]
    #[traced_test]
    fn test_no_parallel_line_when_disabled() {
        let orch = orchestrator(4, false, CountingProvisioner::default());
        orch.execute(&mut |_: &Fixture| SuiteResult::Passed);

        assert!(!logs_contain("Fully parallel tests enabled"));
    }

    #[test]
    #[traced_test]
    fn test_no_parallel_line_for_single_thread() {
        let orch = orchestrator(1, true, CountingProvisioner::default());
        orch.execute(&mut |_: &Fixture| SuiteResult::Passed);

        assert!(!logs_contain("Fully parallel tests enabled"));
    }

    #[test]
    fn test_fixture_provisioner_end_to_end() {
        let parent = tempfile::TempDir::new().unwrap();
        let options = crate::context::ProvisionOptions {
            store: crate::store::StoreConfig::default()
                .with_parent_dir(parent.path())
                .with_setup_sql("CREATE TABLE visits (id INTEGER PRIMARY KEY);"),
            ..Default::default()
        }
        .without_resources();
        let orch = SuiteOrchestrator::new(
            ParallelismConfig::new(3, true),
            FixtureProvisioner::new(options),
        );

        let mut suite = TestSuite::new("visits");
        for i in 0..6 {
            suite = suite.test(format!("visit_{i}"), |scope| {
                let store = scope.store()?;
                store.execute("INSERT INTO visits DEFAULT VALUES", [])?;
                anyhow::ensure!(store.count("visits")? == 1, "namespace leaked rows");
                Ok(())
            });
        }

        let result = orch.execute(&mut suite);

        assert_eq!(result, SuiteResult::Passed);
        assert_eq!(suite.last_summary().unwrap().workers, 3);
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_context_released_after_closure_runner() {
        let orch = SuiteOrchestrator::new(
            ParallelismConfig::new(1, false),
            FixtureProvisioner::new(
                crate::context::ProvisionOptions::default()
                    .without_store()
                    .without_resources(),
            ),
        );

        let result = orch.execute(&mut |ctx: &SharedResourceContext| {
            assert!(!ctx.is_released());
            assert_eq!(ctx.worker_count(), 1);
            SuiteResult::Passed
        });
        assert!(result.is_success());
    }
}
