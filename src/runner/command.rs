//! External test command runner

use std::process::Command;
use tracing::{error, info};

use super::{SuiteResult, SuiteRunner};
use crate::config::TEST_THREADS_VAR;
use crate::context::SharedResourceContext;

/// Runs an external test command (e.g. `cargo test`) against the fixtures
///
/// The child inherits stdio and receives the context's exported
/// environment; its exit code becomes the suite result.
#[derive(Clone, Debug)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Build from `[program, args...]`
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self, ctx: &SharedResourceContext) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(ctx.exported_env())
            .env(TEST_THREADS_VAR, ctx.worker_count().to_string())
            .envs(self.env.iter().cloned());
        command
    }
}

impl SuiteRunner<SharedResourceContext> for CommandRunner {
    fn run(&mut self, ctx: &SharedResourceContext) -> SuiteResult {
        info!(
            "Running `{}` with {} worker(s)",
            self.command_line(),
            ctx.worker_count()
        );

        match self.command(ctx).status() {
            Ok(status) => SuiteResult::from_exit_status(status),
            Err(e) => {
                error!("Failed to start `{}`: {}", self.program, e);
                SuiteResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ExecutionMode;

    fn bare(mode: ExecutionMode, workers: usize) -> SharedResourceContext {
        SharedResourceContext::new(mode, workers, None, None)
    }

    #[test]
    fn test_from_argv() {
        let argv = vec!["cargo".to_string(), "test".to_string(), "--quiet".to_string()];
        let runner = CommandRunner::from_argv(&argv).unwrap();
        assert_eq!(runner.command_line(), "cargo test --quiet");
        assert!(CommandRunner::from_argv(&[]).is_none());
    }

    #[test]
    fn test_missing_program_fails() {
        let mut runner = CommandRunner::new("/nonexistent/test-binary");
        assert_eq!(
            runner.run(&bare(ExecutionMode::Serialized, 1)),
            SuiteResult::Failed
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_forwarded() {
        let mut runner = CommandRunner::new("sh").args(["-c", "exit 3"]);
        assert_eq!(
            runner.run(&bare(ExecutionMode::Serialized, 1)),
            SuiteResult::Exited(3)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_child_sees_fixture_env() {
        let script = r#"test "$FIXTURE_EXECUTION_MODE" = fully_parallel && test "$RUST_TEST_THREADS" = 4 && test "$EXTRA" = yes"#;
        let mut runner = CommandRunner::new("sh")
            .args(["-c", script])
            .env("EXTRA", "yes");
        assert_eq!(
            runner.run(&bare(ExecutionMode::FullyParallel, 4)),
            SuiteResult::Passed
        );
    }
}
