use super::types::{Report, ReportError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

/// 报告文件格式，由扩展名决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Text,
}

impl ReportFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ReportFormat::Json,
            _ => ReportFormat::Text,
        }
    }
}

#[derive(Serialize)]
struct SavedReport<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a Report,
}

/// 把报告写入磁盘
pub struct ReportWriter;

impl ReportWriter {
    /// 按扩展名保存为 JSON 或纯文本，自动创建父目录
    pub fn save(report: &Report, path: &Path) -> Result<(), ReportError> {
        let content = match ReportFormat::from_path(path) {
            ReportFormat::Json => Self::render_json(report)?,
            ReportFormat::Text => Self::render_text(report)?,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, content).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Report saved to {}", path.display());
        Ok(())
    }

    pub fn render_json(report: &Report) -> Result<String, ReportError> {
        let saved = SavedReport {
            generated_at: Utc::now(),
            report,
        };
        Ok(serde_json::to_string_pretty(&saved)?)
    }

    pub fn render_text(report: &Report) -> Result<String, ReportError> {
        let mut out = String::new();
        write_text(&mut out, report)?;
        Ok(out)
    }
}

fn write_text(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(out, "Test Report")?;
    writeln!(out, "Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out)?;
    writeln!(out, "Total:     {}", report.total_tests)?;
    writeln!(out, "Passed:    {}", report.passed)?;
    writeln!(out, "Failed:    {}", report.failed)?;
    writeln!(out, "Errored:   {}", report.errored)?;
    writeln!(out, "Skipped:   {}", report.skipped)?;
    writeln!(out, "Timed out: {}", report.timed_out)?;
    if report.missing > 0 {
        writeln!(out, "Missing:   {}", report.missing)?;
    }
    writeln!(out, "Duration:  {:.3}s", report.total_duration)?;
    writeln!(out, "Average:   {:.3}s", report.average_duration)?;
    match report.aggregate_coverage {
        Some(coverage) => writeln!(out, "Coverage:  {:.1}%", coverage)?,
        None => writeln!(out, "Coverage:  n/a")?,
    }

    if !report.file_coverage.is_empty() {
        writeln!(out)?;
        writeln!(out, "Coverage by file")?;
        for (file, coverage) in &report.file_coverage {
            writeln!(out, "  {:>6.1}%  {}", coverage, file)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Results")?;
    for (id, result) in &report.results {
        writeln!(
            out,
            "  [{}] {} ({:.3}s)",
            result.status,
            id,
            result.duration.as_secs_f64()
        )?;
        if let Some(summary) = &result.failure_summary {
            let kind = result.failure_kind.as_deref().unwrap_or("Error");
            writeln!(out, "      {}: {}", kind, summary)?;
        }
    }

    if !report.analyses.is_empty() {
        writeln!(out)?;
        writeln!(out, "Analysis")?;
        for (id, analysis) in &report.analyses {
            writeln!(out, "  {}", id)?;
            for issue in &analysis.issues {
                writeln!(out, "    issue: {}", issue)?;
            }
            for suggestion in &analysis.suggestions {
                writeln!(out, "    suggestion: {}", suggestion)?;
            }
            for fix in &analysis.fixes {
                writeln!(
                    out,
                    "    fix: {}:{}-{}",
                    fix.file_path.display(),
                    fix.line_start,
                    fix.line_end
                )?;
            }
            for gap in &analysis.coverage_gaps {
                writeln!(out, "    coverage gap: {}", gap)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{CodeFix, TestAnalysis};
    use crate::runner::{ResultMap, TestResult, TestStatus};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_report() -> Report {
        let mut failed = TestResult::new("calc::test_sub", TestStatus::Failed, Duration::from_millis(40));
        failed.failure_kind = Some("AssertionError".to_string());
        failed.failure_summary = Some("expected 5 got 4".to_string());
        let passed = TestResult::new("calc::test_add", TestStatus::Passed, Duration::from_millis(10));

        let mut results = ResultMap::new();
        results.insert(failed.test_id.clone(), failed);
        results.insert(passed.test_id.clone(), passed);

        Report {
            total_tests: 2,
            passed: 1,
            failed: 1,
            total_duration: 0.05,
            average_duration: 0.025,
            results,
            ..Report::default()
        }
    }

    fn analyzed_report() -> Report {
        let mut analysis = TestAnalysis::new("calc::test_sub");
        analysis.issues.push("Test failed: AssertionError: expected 5 got 4".to_string());
        analysis.suggestions.push("Check the expected value".to_string());
        analysis.fixes.push(CodeFix {
            file_path: PathBuf::from("test_calc.py"),
            line_start: 3,
            line_end: 4,
            original_code: "assert sub(2, 2) == 5".to_string(),
            suggested_code: "assert sub(2, 2) == 0".to_string(),
            explanation: "wrong expectation".to_string(),
            confidence: 0.8,
        });

        let mut report = sample_report().with_analyses(vec![analysis]);
        report.file_coverage.insert("calc.py".to_string(), 92.0);
        report
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ReportFormat::from_path(Path::new("out.json")), ReportFormat::Json);
        assert_eq!(ReportFormat::from_path(Path::new("OUT.JSON")), ReportFormat::Json);
        assert_eq!(ReportFormat::from_path(Path::new("out.txt")), ReportFormat::Text);
        assert_eq!(ReportFormat::from_path(Path::new("out")), ReportFormat::Text);
    }

    #[test]
    fn test_save_json_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/reports/run.json");

        ReportWriter::save(&sample_report(), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value["generated_at"].is_string());
        assert_eq!(value["total_tests"], 2);
        assert_eq!(value["results"]["calc::test_sub"]["status"], "failed");
    }

    #[test]
    fn test_save_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.txt");

        ReportWriter::save(&sample_report(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Passed:    1"));
        assert!(text.contains("[failed] calc::test_sub"));
        assert!(text.contains("AssertionError: expected 5 got 4"));
        assert!(text.contains("Coverage:  n/a"));
    }

    #[test]
    fn test_analyses_and_file_coverage_are_saved() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("run.json");
        let text_path = dir.path().join("run.txt");
        let report = analyzed_report();

        ReportWriter::save(&report, &json_path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["file_coverage"]["calc.py"], 92.0);
        let analysis = &value["analyses"]["calc::test_sub"];
        assert_eq!(analysis["suggestions"][0], "Check the expected value");
        assert_eq!(analysis["fixes"][0]["line_start"], 3);

        ReportWriter::save(&report, &text_path).unwrap();
        let text = fs::read_to_string(&text_path).unwrap();
        assert!(text.contains("Coverage by file"));
        assert!(text.contains("92.0%  calc.py"));
        assert!(text.contains("issue: Test failed: AssertionError"));
        assert!(text.contains("fix: test_calc.py:3-4"));
    }

    #[test]
    fn test_plain_report_omits_empty_sections() {
        let value: serde_json::Value =
            serde_json::from_str(&ReportWriter::render_json(&sample_report()).unwrap()).unwrap();
        assert!(value.get("analyses").is_none());
        assert!(value.get("file_coverage").is_none());

        let text = ReportWriter::render_text(&sample_report()).unwrap();
        assert!(!text.contains("Analysis"));
    }

    #[test]
    fn test_save_failure_is_report_error() {
        let dir = TempDir::new().unwrap();
        // 父路径是一个普通文件
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let report = sample_report();
        let err = ReportWriter::save(&report, &blocker.join("run.json")).unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
        // 内存中的报告不受影响
        assert_eq!(report, sample_report());
    }
}
