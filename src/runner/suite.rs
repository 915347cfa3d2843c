//! In-process test suite runner
//!
//! Runs registered test cases on a pool of scoped worker threads sized by
//! the context's worker count.

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::report::{OutputFormat, ResultFormatter};
use super::result::{SuiteResult, SuiteSummary, TestResult};
use super::SuiteRunner;
use crate::config::HarnessConfig;
use crate::context::{SharedResourceContext, TestScope};
use crate::utils::Timer;

type TestFn = Box<dyn Fn(&TestScope<'_>) -> Result<()> + Send + Sync>;

/// A named test body
pub struct TestCase {
    name: String,
    ignored: bool,
    body: TestFn,
}

impl TestCase {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&TestScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            ignored: false,
            body: Box::new(body),
        }
    }

    /// Register but do not run
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &SharedResourceContext) -> TestResult {
        if self.ignored {
            return TestResult::skip(&self.name, "ignored");
        }

        let timer = Timer::start(&self.name);
        let scope = match ctx.scope(&self.name) {
            Ok(scope) => scope,
            Err(e) => return TestResult::error(&self.name, format!("fixture scope: {e}")),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.body)(&scope)));
        let elapsed = timer.elapsed_ms();

        match outcome {
            Ok(Ok(())) => TestResult::pass(&self.name, elapsed),
            Ok(Err(e)) => TestResult::fail(&self.name, elapsed, format!("{e:#}")),
            Err(payload) => TestResult::fail(
                &self.name,
                elapsed,
                format!("panicked: {}", panic_message(payload.as_ref())),
            ),
        }
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("ignored", &self.ignored)
            .finish()
    }
}

/// Collection of test cases run against one shared context
pub struct TestSuite {
    name: String,
    cases: Vec<TestCase>,
    filter: Option<String>,
    formatter: ResultFormatter,
    last_summary: Option<SuiteSummary>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            filter: None,
            formatter: ResultFormatter::default(),
            last_summary: None,
        }
    }

    /// Suite reporting in the configured `report_format`
    pub fn from_config(name: impl Into<String>, config: &HarnessConfig) -> Self {
        Self::new(name).formatter(config.formatter())
    }

    pub fn add(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    pub fn test<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&TestScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add(TestCase::new(name, body))
    }

    /// Only run tests whose name contains `pattern`
    pub fn filter(mut self, pattern: Option<impl Into<String>>) -> Self {
        self.filter = pattern.map(Into::into);
        self
    }

    /// Filter on the first free command-line argument, libtest style
    pub fn filter_from_args(self) -> Self {
        self.filter(name_filter(std::env::args().skip(1)))
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.formatter = ResultFormatter::new(format);
        self
    }

    pub fn formatter(mut self, formatter: ResultFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Summary of the most recent run
    pub fn last_summary(&self) -> Option<&SuiteSummary> {
        self.last_summary.as_ref()
    }

    /// Rendered summary of the most recent run
    pub fn report(&self) -> Option<String> {
        self.last_summary
            .as_ref()
            .map(|summary| self.formatter.format_summary(summary))
    }

    /// Run the selected cases and collect their results in registration order
    pub fn execute(&self, ctx: &SharedResourceContext) -> SuiteSummary {
        let selected: Vec<(usize, &TestCase)> = self
            .cases
            .iter()
            .enumerate()
            .filter(|(_, case)| match &self.filter {
                Some(pattern) => case.name.contains(pattern.as_str()),
                None => true,
            })
            .collect();

        let workers = ctx.worker_count().min(selected.len()).max(1);
        info!(
            "Running {} test(s) of suite {} on {} worker(s)",
            selected.len(),
            self.name,
            workers
        );

        let started_at = Utc::now();
        let timer = Timer::start(&self.name);
        let next = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(selected.len()));

        std::thread::scope(|s| {
            for worker in 0..workers {
                let (selected, next, results) = (&selected, &next, &results);
                s.spawn(move || loop {
                    let slot = next.fetch_add(1, Ordering::Relaxed);
                    let Some((index, case)) = selected.get(slot) else {
                        break;
                    };
                    debug!("Worker {} running {}", worker, case.name);
                    let result = case.run(ctx);
                    results.lock().push((*index, result));
                });
            }
        });

        let mut results = results.into_inner();
        results.sort_by_key(|(index, _)| *index);

        SuiteSummary::new(
            &self.name,
            ctx.mode(),
            workers,
            started_at,
            timer.elapsed_ms(),
            results.into_iter().map(|(_, r)| r).collect(),
        )
    }
}

impl SuiteRunner<SharedResourceContext> for TestSuite {
    fn run(&mut self, ctx: &SharedResourceContext) -> SuiteResult {
        let summary = self.execute(ctx);
        let result = SuiteResult::from(&summary);
        self.last_summary = Some(summary);

        if let Some(report) = self.report() {
            println!("{report}");
        }
        result
    }
}

/// libtest options that take a separate value
const VALUE_OPTIONS: &[&str] = &[
    "--test-threads",
    "--skip",
    "--color",
    "--format",
    "--logfile",
    "-Z",
];

/// First argument that is neither an option nor an option's value
fn name_filter(args: impl IntoIterator<Item = String>) -> Option<String> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if VALUE_OPTIONS.contains(&arg.as_str()) {
            args.next();
        } else if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
