//! Parallelism policy
//!
//! Decides, once per suite invocation, whether shared fixtures must be built
//! for concurrent use.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EnvConfig;

/// How the suite's test cases will be scheduled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// At most one test case runs at a time
    Serialized,
    /// Test cases run concurrently; fixtures must isolate them
    FullyParallel,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Serialized => "serialized",
            ExecutionMode::FullyParallel => "fully_parallel",
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecutionMode::FullyParallel)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide the execution mode.
///
/// A parallelism of 1 means the runner is not parallelizing, so fully
/// parallel mode is only chosen when it is both enabled and above 1.
pub fn decide(requested_parallelism: usize, enabled: bool) -> ExecutionMode {
    if enabled && requested_parallelism > 1 {
        ExecutionMode::FullyParallel
    } else {
        ExecutionMode::Serialized
    }
}

/// Parse a runner parallelism value; missing or malformed input yields 0
pub fn parse_parallelism(raw: Option<&str>) -> usize {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Parallelism inputs, read once at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelismConfig {
    pub requested_parallelism: usize,
    pub fully_parallel_enabled: bool,
}

impl ParallelismConfig {
    pub fn new(requested_parallelism: usize, fully_parallel_enabled: bool) -> Self {
        Self {
            requested_parallelism,
            fully_parallel_enabled,
        }
    }

    /// Build from the environment snapshot
    pub fn from_env(env: &EnvConfig) -> Self {
        Self::new(
            parse_parallelism(env.test_threads.as_deref()),
            env.fully_parallel,
        )
    }

    /// Override the requested parallelism with an explicit runner flag
    pub fn with_requested(mut self, flag: Option<&str>) -> Self {
        if flag.is_some() {
            self.requested_parallelism = parse_parallelism(flag);
        }
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        decide(self.requested_parallelism, self.fully_parallel_enabled)
    }

    /// Number of runner workers allowed under `mode`
    pub fn worker_count(&self, mode: ExecutionMode) -> usize {
        match mode {
            ExecutionMode::FullyParallel => self.requested_parallelism.max(1),
            ExecutionMode::Serialized => 1,
        }
    }
}
