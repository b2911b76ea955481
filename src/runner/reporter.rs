use crate::report::Report;
use crate::runner::types::{TestResult, TestStatus};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};

/// 控制台输出
pub struct TestReporter {
    verbose: bool,
}

impl TestReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印测试开始
    pub fn print_header(&self, total: usize, workers: usize) {
        println!(
            "\nRunning {} tests ({} workers)...\n",
            total.to_string().bold(),
            workers
        );
    }

    /// 打印单个测试结果
    pub fn print_result(&self, result: &TestResult) {
        let symbol = match result.status {
            TestStatus::Passed => "✓".green(),
            TestStatus::Failed => "✗".red(),
            TestStatus::Errored => "!".red(),
            TestStatus::Skipped => "⊘".dimmed(),
            TestStatus::TimedOut => "⏱".yellow(),
        };

        let coverage = result
            .coverage_percentage
            .map(|c| format!(" {:.0}%", c))
            .unwrap_or_default();

        if result.status == TestStatus::Skipped {
            println!(" {} {} {}", symbol, result.test_id, "(skipped)".dimmed());
        } else {
            println!(
                " {} {} ({}ms){}",
                symbol,
                result.test_id,
                result.duration.as_millis(),
                coverage.dimmed()
            );
        }

        // 失败时显示错误信息
        if let Some(summary) = &result.failure_summary {
            let kind = result.failure_kind.as_deref().unwrap_or("Error");
            println!("   {}: {}", kind.red().bold(), summary);
        }
        if result.status == TestStatus::TimedOut {
            println!("   {}", "Test execution timed out".yellow());
        }

        if self.verbose && result.is_failure() {
            if let Some(detail) = &result.failure_detail {
                for line in detail.lines() {
                    println!("     {}", line.dimmed());
                }
            }
            if !result.captured_stdout.trim().is_empty() {
                println!("   {}", "stdout:".bold());
                for line in result.captured_stdout.lines() {
                    println!("     {}", line);
                }
            }
            if !result.captured_stderr.trim().is_empty() {
                println!("   {}", "stderr:".bold());
                for line in result.captured_stderr.lines() {
                    println!("     {}", line);
                }
            }
            println!();
        }
    }

    /// 打印测试摘要
    pub fn print_summary(&self, report: &Report) {
        println!("\n{}", "Summary".bold());

        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec![
            "Total", "Passed", "Failed", "Errored", "Skipped", "Timed out", "Duration", "Coverage",
        ]);

        let highlight = |count: usize, color: Color| {
            let cell = Cell::new(count);
            if count > 0 { cell.fg(color) } else { cell }
        };

        table.add_row(vec![
            Cell::new(report.total_tests),
            highlight(report.passed, Color::Green),
            highlight(report.failed, Color::Red),
            highlight(report.errored, Color::Red),
            highlight(report.skipped, Color::DarkGrey),
            highlight(report.timed_out, Color::Yellow),
            Cell::new(format!("{:.3}s", report.total_duration)),
            Cell::new(
                report
                    .aggregate_coverage
                    .map(|c| format!("{:.1}%", c))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
        println!("{}", table);

        if report.missing > 0 {
            println!(
                "  {}: {} tests did not finish",
                "Cancelled".yellow().bold(),
                report.missing
            );
        }
        println!();
    }
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new(false)
    }
}
