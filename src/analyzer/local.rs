use super::types::TestAnalysis;
use super::{Analyzer, code_context};
use crate::runner::{TestResult, TestStatus};
use crate::scanner::TestCase;
use async_trait::async_trait;
use std::time::Duration;

/// 基于规则的本地分析，不依赖任何外部服务
#[derive(Debug, Clone)]
pub struct LocalAnalyzer {
    slow_threshold: Duration,
}

impl LocalAnalyzer {
    pub fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }

    pub fn inspect(&self, case: &TestCase, result: &TestResult) -> TestAnalysis {
        let mut analysis = TestAnalysis::new(&case.id);

        match result.status {
            TestStatus::Errored => {
                analysis.issues.push("Test failed with an error".to_string());
                analysis
                    .suggestions
                    .push("Review test setup and dependencies".to_string());
            }
            TestStatus::Failed => {
                let issue = match (&result.failure_kind, &result.failure_summary) {
                    (Some(kind), Some(summary)) => format!("Test failed: {kind}: {summary}"),
                    (None, Some(summary)) => format!("Test failed: {summary}"),
                    _ => "Test failed".to_string(),
                };
                analysis.issues.push(issue);
                analysis
                    .suggestions
                    .push("Check the failing assertion against the expected behaviour".to_string());
            }
            TestStatus::TimedOut => {
                analysis.issues.push("Test did not finish before the timeout".to_string());
                analysis
                    .suggestions
                    .push("Look for blocking calls or raise the timeout".to_string());
            }
            TestStatus::Passed | TestStatus::Skipped => {}
        }

        if result.status != TestStatus::TimedOut && result.duration > self.slow_threshold {
            analysis.issues.push("Test execution time is high".to_string());
            analysis
                .suggestions
                .push("Consider optimizing test performance".to_string());
        }

        if result.coverage_percentage.is_none() {
            analysis
                .issues
                .push("No coverage information available".to_string());
            analysis
                .suggestions
                .push("Enable coverage reporting".to_string());
        }

        if result.captured_stdout.to_lowercase().contains("warning") {
            analysis.issues.push("Test generated warnings".to_string());
            analysis.suggestions.push("Address test warnings".to_string());
        }

        if result.captured_stderr.to_lowercase().contains("deprecation") {
            analysis
                .issues
                .push("Test uses deprecated features".to_string());
            analysis
                .suggestions
                .push("Update deprecated functionality".to_string());
        }

        analysis
            .coverage_gaps
            .push("Coverage analysis not available".to_string());
        analysis
    }
}

impl LocalAnalyzer {
    /// 未执行的用例：只检查源码中的断言和描述
    pub fn inspect_source(&self, case: &TestCase, source: &str) -> TestAnalysis {
        let mut analysis = TestAnalysis::new(&case.id);

        let context = code_context(source, case.location.line);
        if context.is_empty() {
            analysis.issues.push("Test source not available".to_string());
            analysis
                .suggestions
                .push("Check that the test file is readable".to_string());
            return analysis;
        }

        if !context.lines().any(is_assertion) {
            analysis.issues.push("Test contains no assertions".to_string());
            analysis
                .suggestions
                .push("Assert on the behaviour under test".to_string());
        }

        if case.description.is_none() {
            analysis
                .suggestions
                .push("Add a docstring describing what the test verifies".to_string());
        }

        analysis
            .coverage_gaps
            .push("Coverage analysis not available".to_string());
        analysis
    }
}

fn is_assertion(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("assert")
        || line.contains("self.assert")
        || line.contains("pytest.raises")
        || line.contains("pytest.fail")
        || line.contains(".assert_")
}

impl Default for LocalAnalyzer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Analyzer for LocalAnalyzer {
    async fn analyze(&self, case: &TestCase, result: &TestResult, _source: &str) -> TestAnalysis {
        self.inspect(case, result)
    }

    async fn analyze_source(&self, case: &TestCase, source: &str) -> TestAnalysis {
        self.inspect_source(case, source)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
