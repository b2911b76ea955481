use crate::analyzer::TestAnalysis;
use crate::runner::extract::extract_file_coverage;
use crate::runner::{ResultMap, TestResult, TestStatus};
use crate::scanner::TestCase;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

/// 报告持久化错误
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to render report: {0}")]
    Format(#[from] std::fmt::Error),
}

/// 一批结果的统计快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// 提交的用例数
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub timed_out: usize,

    /// 没有结果的用例数（只在取消后的部分结果中出现）
    pub missing: usize,

    /// 总耗时（秒）
    pub total_duration: f64,

    /// 平均耗时（秒），没有用例时为 0
    pub average_duration: f64,

    /// 有覆盖率的结果的平均覆盖率
    pub aggregate_coverage: Option<f64>,

    /// 按源文件的覆盖率，来自 runner 输出的覆盖率表格
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub file_coverage: BTreeMap<String, f64>,

    pub results: ResultMap,

    /// 分析结果，按用例 ID
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub analyses: BTreeMap<String, TestAnalysis>,
}

impl Report {
    /// 汇总结果
    ///
    /// 纯函数：相同输入得到逐位相同的报告。不在用例集合中的结果被忽略。
    pub fn aggregate(cases: &[TestCase], results: &ResultMap) -> Self {
        let ids: BTreeSet<&str> = cases.iter().map(|c| c.id.as_str()).collect();

        let mut report = Report {
            total_tests: ids.len(),
            ..Report::default()
        };

        for id in ids {
            match results.get(id) {
                Some(result) => {
                    report.results.insert(id.to_string(), result.clone());
                }
                None => report.missing += 1,
            }
        }

        let mut total = Duration::ZERO;
        let mut coverage_sum = 0.0;
        let mut coverage_count = 0usize;
        for result in report.results.values() {
            match result.status {
                TestStatus::Passed => report.passed += 1,
                TestStatus::Failed => report.failed += 1,
                TestStatus::Errored => report.errored += 1,
                TestStatus::Skipped => report.skipped += 1,
                TestStatus::TimedOut => report.timed_out += 1,
            }
            total += result.duration;
            if let Some(coverage) = result.coverage_percentage {
                coverage_sum += coverage;
                coverage_count += 1;
                // 按 ID 顺序合并，同一文件以后出现的为准
                report
                    .file_coverage
                    .extend(extract_file_coverage(&result.captured_stdout));
            }
        }

        report.total_duration = total.as_secs_f64();
        report.average_duration = if report.total_tests > 0 {
            report.total_duration / report.total_tests as f64
        } else {
            0.0
        };
        report.aggregate_coverage =
            (coverage_count > 0).then(|| coverage_sum / coverage_count as f64);
        report
    }

    /// 附加分析结果
    pub fn with_analyses(mut self, analyses: impl IntoIterator<Item = TestAnalysis>) -> Self {
        self.analyses = analyses
            .into_iter()
            .map(|a| (a.test_id.clone(), a))
            .collect();
        self
    }

    /// 是否有失败、出错或超时的用例
    pub fn has_failures(&self) -> bool {
        self.failed + self.errored + self.timed_out > 0
    }

    /// 失败的结果，按 ID 排序
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.values().filter(|r| r.is_failure())
    }
}
