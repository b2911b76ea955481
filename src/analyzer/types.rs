use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 分析错误；远程分析失败时会回退到本地分析
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Analyzer service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid analyzer endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Analyzer returned an empty response")]
    EmptyResponse,

    #[error("Failed to build prompt: {0}")]
    Prompt(#[from] std::fmt::Error),
}

/// 建议的代码修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeFix {
    pub file_path: PathBuf,
    pub line_start: usize,
    pub line_end: usize,
    pub original_code: String,
    pub suggested_code: String,
    pub explanation: String,

    /// 0.0 - 1.0
    pub confidence: f64,
}

/// 单个用例的分析结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestAnalysis {
    pub test_id: String,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub fixes: Vec<CodeFix>,
    pub coverage_gaps: Vec<String>,
}

impl TestAnalysis {
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            ..Self::default()
        }
    }

    /// 没有任何发现
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.suggestions.is_empty() && self.fixes.is_empty()
    }
}
