//! Fixture harness - shared test fixtures with parallelism gating
//!
//! Provisions a suite's shared fixtures (a SQLite store and HTTP service
//! stubs) once, decides whether they must support fully parallel test
//! execution, runs the suite against them, and always tears them down.
//!
//! ## Usage
//!
//! ```no_run
//! use fixture_harness::{EnvConfig, HarnessConfig, SuiteOrchestrator, TestSuite};
//!
//! fn main() -> anyhow::Result<()> {
//!     let env = EnvConfig::load();
//!     let config = HarnessConfig::resolve(None, &env)?;
//!
//!     let mut suite = TestSuite::from_config("orders", &config)
//!         .test("orders::create", |scope| {
//!             scope.store()?.execute_batch("INSERT INTO orders DEFAULT VALUES")?;
//!             Ok(())
//!         })
//!         .filter_from_args();
//!
//!     SuiteOrchestrator::from_config(&env, &config).run(&mut suite)
//! }
//! ```

pub mod config;
pub mod context;
pub mod orchestrator;
pub mod policy;
pub mod resources;
pub mod runner;
pub mod store;
pub mod utils;

pub use config::{EnvConfig, HarnessConfig};
pub use context::{
    FixtureProvisioner, ProvisionError, ProvisionOptions, Provisioner, SharedResourceContext,
    TeardownError, TestScope,
};
pub use orchestrator::SuiteOrchestrator;
pub use policy::{decide, ExecutionMode, ParallelismConfig};
pub use runner::{CommandRunner, SuiteResult, SuiteRunner, TestCase, TestSuite};
