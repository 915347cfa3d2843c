//! Test and suite results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::ExitStatus;

use crate::policy::ExecutionMode;

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
            TestStatus::Skip => "○",
            TestStatus::Error => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skip => write!(f, "SKIP"),
            TestStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of a single test case
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Pass,
            duration_ms,
            message: None,
        }
    }

    pub fn fail(name: impl Into<String>, duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Fail,
            duration_ms,
            message: Some(message.into()),
        }
    }

    pub fn skip(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Skip,
            duration_ms: 0,
            message: Some(reason.into()),
        }
    }

    pub fn error(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Error,
            duration_ms: 0,
            message: Some(error.into()),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.name,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Summary of one in-process suite run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub suite: String,
    pub mode: ExecutionMode,
    pub workers: usize,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl SuiteSummary {
    pub fn new(
        suite: impl Into<String>,
        mode: ExecutionMode,
        workers: usize,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        results: Vec<TestResult>,
    ) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();

        Self {
            suite: suite.into(),
            mode,
            workers,
            started_at,
            total: results.len(),
            passed: count(TestStatus::Pass),
            failed: count(TestStatus::Fail),
            skipped: count(TestStatus::Skip),
            errors: count(TestStatus::Error),
            duration_ms,
            results,
        }
    }

    /// Pass rate over tests that actually ran
    pub fn pass_rate(&self) -> f64 {
        let ran = self.total - self.skipped;
        if ran == 0 {
            0.0
        } else {
            (self.passed as f64 / ran as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Suite {} ({}, {} workers)", self.suite, self.mode, self.workers)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errors
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.duration_ms
        )
    }
}

/// Aggregate suite outcome, forwarded as the process exit status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteResult {
    Passed,
    Failed,
    /// Fixtures could not be provisioned; no test ran
    ProvisioningFailed,
    /// The runner panicked partway through
    RunnerAborted,
    /// Exit code reported by an external runner
    Exited(i32),
}

impl SuiteResult {
    pub fn exit_code(&self) -> i32 {
        match self {
            SuiteResult::Passed => 0,
            SuiteResult::Failed => 1,
            SuiteResult::ProvisioningFailed => 2,
            SuiteResult::RunnerAborted => 101,
            SuiteResult::Exited(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    /// Map an external runner's exit status; death by signal counts as failure
    pub fn from_exit_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => SuiteResult::Passed,
            Some(code) => SuiteResult::Exited(code),
            None => SuiteResult::Failed,
        }
    }
}

impl From<&SuiteSummary> for SuiteResult {
    fn from(summary: &SuiteSummary) -> Self {
        if summary.is_all_passed() {
            SuiteResult::Passed
        } else {
            SuiteResult::Failed
        }
    }
}

impl fmt::Display for SuiteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteResult::Passed => write!(f, "passed"),
            SuiteResult::Failed => write!(f, "failed"),
            SuiteResult::ProvisioningFailed => write!(f, "provisioning failed"),
            SuiteResult::RunnerAborted => write!(f, "runner aborted"),
            SuiteResult::Exited(code) => write!(f, "exited with {code}"),
        }
    }
}
