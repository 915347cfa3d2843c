//! Suite summary formatting

use std::io::IsTerminal;

use super::result::{SuiteSummary, TestResult, TestStatus};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
#[derive(Clone, Debug)]
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    /// Colour follows [`auto_color`](Self::auto_color)
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: false,
        }
        .auto_color()
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Colour only when stdout is a terminal and `NO_COLOR` is unset
    pub fn auto_color(mut self) -> Self {
        self.colorize = color_wanted(
            std::io::stdout().is_terminal(),
            std::env::var_os("NO_COLOR").is_some(),
        );
        self
    }

    pub fn is_colored(&self) -> bool {
        self.colorize
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format a single test result
    pub fn format_result(&self, result: &TestResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Summary => result.to_string(),
        }
    }

    fn format_result_table(&self, result: &TestResult) -> String {
        let status_str = if self.colorize {
            match result.status {
                TestStatus::Pass => "\x1b[32m✓ PASS\x1b[0m",
                TestStatus::Fail => "\x1b[31m✗ FAIL\x1b[0m",
                TestStatus::Skip => "\x1b[33m○ SKIP\x1b[0m",
                TestStatus::Error => "\x1b[31m! ERROR\x1b[0m",
            }
        } else {
            match result.status {
                TestStatus::Pass => "✓ PASS",
                TestStatus::Fail => "✗ FAIL",
                TestStatus::Skip => "○ SKIP",
                TestStatus::Error => "! ERROR",
            }
        };

        let mut line = format!(
            "{:40} {} [{:>6}ms]",
            result.name, status_str, result.duration_ms
        );
        if let (Some(msg), false) = (&result.message, result.status.is_success()) {
            line.push_str(&format!("\n      {msg}"));
        }
        line
    }

    /// Format a suite summary
    pub fn format_summary(&self, summary: &SuiteSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Summary => self.format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &SuiteSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Suite {:30} {:14} x{:<3}     ║\n",
            summary.suite,
            summary.mode.as_str(),
            summary.workers
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for result in &summary.results {
            output.push_str(&format!("  {}\n", self.format_result_table(result)));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            "║  Total: {:3} | Pass: {} | Fail: {} | Skip: {:2} | Error: {:2}\n",
            summary.total, pass_str, fail_str, summary.skipped, summary.errors
        ));
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {:6}ms\n",
            summary.pass_rate(),
            summary.duration_ms
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_summary_brief(&self, summary: &SuiteSummary) -> String {
        format!(
            "{} ({}): {}/{} passed ({:.1}%) in {}ms",
            summary.suite,
            summary.mode,
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.duration_ms
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn color_wanted(is_terminal: bool, no_color: bool) -> bool {
    is_terminal && !no_color
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ExecutionMode;
    use chrono::Utc;

    fn summary() -> SuiteSummary {
        SuiteSummary::new(
            "orders",
            ExecutionMode::FullyParallel,
            4,
            Utc::now(),
            42,
            vec![
                TestResult::pass("orders::create", 12),
                TestResult::fail("orders::cancel", 8, "expected 204"),
            ],
        )
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!(OutputFormat::from_str("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(
            OutputFormat::from_str("json-pretty"),
            Some(OutputFormat::JsonPretty)
        );
        assert_eq!(OutputFormat::from_str("csv"), None);
    }

    #[test]
    fn test_table_without_color() {
        let output = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .format_summary(&summary());
        assert!(output.contains("✓ PASS"));
        assert!(output.contains("✗ FAIL"));
        assert!(output.contains("expected 204"));
        assert!(output.contains("Pass Rate:  50.0%"));
        assert!(!output.contains("\x1b["));
    }

    #[test]
    fn test_json_roundtrips_counts() {
        let output = ResultFormatter::new(OutputFormat::Json).format_summary(&summary());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["mode"], "fully_parallel");
        assert_eq!(value["failed"], 1);
    }

    #[test]
    fn test_color_needs_terminal() {
        assert!(color_wanted(true, false));
        assert!(!color_wanted(false, false));
        assert!(!color_wanted(true, true));
    }

    #[test]
    fn test_brief() {
        let output = ResultFormatter::new(OutputFormat::Summary).format_summary(&summary());
        assert_eq!(output, "orders (fully_parallel): 1/2 passed (50.0%) in 42ms");
    }
}
