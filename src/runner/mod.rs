//! Suite runners
//!
//! A runner executes the tests against a provisioned context and reports an
//! aggregate [`SuiteResult`]. Two runners ship with the crate: an in-process
//! [`TestSuite`] and a [`CommandRunner`] that drives an external test binary.

mod command;
mod report;
mod result;
mod suite;

pub use command::CommandRunner;
pub use report::{OutputFormat, ResultFormatter};
pub use result::{SuiteResult, SuiteSummary, TestResult, TestStatus};
pub use suite::{TestCase, TestSuite};

/// Executes a suite against a provisioned context
pub trait SuiteRunner<C> {
    fn run(&mut self, ctx: &C) -> SuiteResult;
}

impl<C, F> SuiteRunner<C> for F
where
    F: FnMut(&C) -> SuiteResult,
{
    fn run(&mut self, ctx: &C) -> SuiteResult {
        self(ctx)
    }
}
