//! Environment variable configuration
//!
//! Snapshots the environment once at startup so the execution mode never
//! depends on mid-suite environment changes.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "FIXTURE_HARNESS";

/// Opt-in switch for fully parallel mode
pub const FULLY_PARALLEL_VAR: &str = "ENABLE_FULLY_PARALLEL_TESTS";

/// The Rust test runner's own parallelism setting
pub const TEST_THREADS_VAR: &str = "RUST_TEST_THREADS";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// ENABLE_FULLY_PARALLEL_TESTS == "true"
    pub fully_parallel: bool,
    /// Raw RUST_TEST_THREADS value
    pub test_threads: Option<String>,
    /// Config file from FIXTURE_HARNESS_CONFIG
    pub config_file: Option<String>,
    /// Log level from FIXTURE_HARNESS_LOG
    pub log_level: Option<String>,
    /// Store parent directory from FIXTURE_HARNESS_STORE_DIR
    pub store_dir: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            fully_parallel: env::var(FULLY_PARALLEL_VAR)
                .map(|v| is_enabled(&v))
                .unwrap_or(false),
            test_threads: env::var(TEST_THREADS_VAR).ok(),
            config_file: get_env("CONFIG"),
            log_level: get_env("LOG"),
            store_dir: get_env("STORE_DIR"),
        }
    }

    /// Check if any harness variables are set
    pub fn has_any(&self) -> bool {
        self.fully_parallel
            || self.test_threads.is_some()
            || self.config_file.is_some()
            || self.log_level.is_some()
            || self.store_dir.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {FULLY_PARALLEL_VAR}: {}", self.fully_parallel);
        println!("  {TEST_THREADS_VAR}:           {:?}", self.test_threads);
        println!("  {ENV_PREFIX}_CONFIG:     {:?}", self.config_file);
        println!("  {ENV_PREFIX}_LOG:        {:?}", self.log_level);
        println!("  {ENV_PREFIX}_STORE_DIR:  {:?}", self.store_dir);
    }
}

/// Only the exact string "true" enables fully parallel mode
fn is_enabled(value: &str) -> bool {
    value == "true"
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set the fully parallel opt-in to a raw value
    pub fn fully_parallel(mut self, value: impl Into<String>) -> Self {
        self.vars.push((FULLY_PARALLEL_VAR.to_string(), value.into()));
        self
    }

    /// Set the runner parallelism to a raw value
    pub fn test_threads(mut self, value: impl Into<String>) -> Self {
        self.vars.push((TEST_THREADS_VAR.to_string(), value.into()));
        self
    }

    /// Set config file
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_CONFIG"), path.into()));
        self
    }

    /// Set store parent directory
    pub fn store_dir(mut self, path: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_STORE_DIR"), path.into()));
        self
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all recognised environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {FULLY_PARALLEL_VAR}   Allow fully parallel mode (exactly \"true\")");
    println!("  {TEST_THREADS_VAR}             Runner parallelism (overridden by --test-threads)");
    println!("  {ENV_PREFIX}_CONFIG      Path to configuration file");
    println!("  {ENV_PREFIX}_LOG         Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_STORE_DIR   Parent directory for the fixture store");
    println!();
    println!("Example:");
    println!("  export {FULLY_PARALLEL_VAR}=true");
    println!("  fixture-harness run --test-threads 4 -- cargo test");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(!config.fully_parallel);
        assert!(config.test_threads.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_only_exact_true_enables() {
        assert!(is_enabled("true"));
        assert!(!is_enabled("TRUE"));
        assert!(!is_enabled("1"));
        assert!(!is_enabled("yes"));
        assert!(!is_enabled(""));
    }

    #[test]
    #[serial]
    fn test_env_builder() {
        let _guard = EnvBuilder::new()
            .fully_parallel("true")
            .test_threads("4")
            .store_dir("/tmp/fixtures")
            .apply_scoped();

        let config = EnvConfig::load();
        assert!(config.fully_parallel);
        assert_eq!(config.test_threads.as_deref(), Some("4"));
        assert_eq!(config.store_dir.as_deref(), Some("/tmp/fixtures"));
    }

    #[test]
    #[serial]
    fn test_other_values_disable() {
        let _guard = EnvBuilder::new().fully_parallel("false").apply_scoped();
        assert!(!EnvConfig::load().fully_parallel);
    }

    #[test]
    #[serial]
    fn test_guard_restores_previous_value() {
        {
            let _guard = EnvBuilder::new().config_file("harness.yaml").apply_scoped();
            assert_eq!(
                EnvConfig::load().config_file.as_deref(),
                Some("harness.yaml")
            );
        }
        assert!(env::var(format!("{ENV_PREFIX}_CONFIG")).is_err());
    }
}
