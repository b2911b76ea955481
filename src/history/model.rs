use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::report::Report;

/// 历史记录条目，每次 `radar run` 一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 唯一 ID (UUID)
    pub id: String,

    /// 运行结束时间
    pub timestamp: DateTime<Utc>,

    /// 扫描的路径
    pub paths: Vec<String>,

    /// 统计摘要
    pub summary: RunSummary,
}

/// 运行摘要 (不包含单个用例的输出，节省空间)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub timed_out: usize,

    /// 总耗时（秒）
    pub duration_secs: f64,

    pub coverage: Option<f64>,

    #[serde(default)]
    pub cancelled: bool,
}

impl RunSummary {
    pub fn from_report(report: &Report) -> Self {
        Self {
            total: report.total_tests,
            passed: report.passed,
            failed: report.failed,
            errored: report.errored,
            skipped: report.skipped,
            timed_out: report.timed_out,
            duration_secs: report.total_duration,
            coverage: report.aggregate_coverage,
            cancelled: report.missing > 0,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed + self.errored + self.timed_out == 0
    }
}
