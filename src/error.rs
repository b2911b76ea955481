use thiserror::Error;

use crate::analyzer::AnalyzerError;
use crate::config::ConfigError;
use crate::report::ReportError;
use crate::runner::{BatchCancelled, ExecutionError};
use crate::scanner::ScanError;

#[derive(Error, Debug)]
pub enum RadarError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("扫描错误: {0}")]
    Scan(#[from] ScanError),

    #[error("执行错误: {0}")]
    Execution(#[from] ExecutionError),

    #[error("{0}")]
    Cancelled(#[from] BatchCancelled),

    #[error("报告错误: {0}")]
    Report(#[from] ReportError),

    #[error("分析错误: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for RadarError {
    fn from(err: anyhow::Error) -> Self {
        RadarError::Other(err.to_string())
    }
}

/// Result type for radar crate
pub type Result<T> = std::result::Result<T, RadarError>;
