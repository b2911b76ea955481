pub mod local;
pub mod remote;
pub mod types;

pub use local::LocalAnalyzer;
pub use remote::RemoteAnalyzer;
pub use types::{AnalyzerError, CodeFix, TestAnalysis};

use crate::config::AnalyzerConfig;
use crate::runner::{ResultMap, TestResult};
use crate::scanner::{Scanner, TestCase};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// 对单个用例及其结果给出改进建议
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, case: &TestCase, result: &TestResult, source: &str) -> TestAnalysis;

    /// 不执行用例，只根据源码分析
    async fn analyze_source(&self, case: &TestCase, source: &str) -> TestAnalysis;

    fn name(&self) -> &'static str;
}

/// 按配置创建分析器：配置了 endpoint 时使用远程分析，否则只做本地分析
pub fn build_analyzer(config: &AnalyzerConfig) -> Box<dyn Analyzer> {
    let local = LocalAnalyzer::new(
        Duration::try_from_secs_f64(config.slow_threshold).unwrap_or(Duration::from_secs(2)),
    );

    let Some(endpoint) = &config.endpoint else {
        return Box::new(local);
    };

    match RemoteAnalyzer::new(
        endpoint,
        config.model.clone(),
        Duration::from_secs(config.request_timeout),
        local.clone(),
    ) {
        Ok(remote) => Box::new(remote),
        Err(e) => {
            warn!("Failed to create remote analyzer, using local analyzer: {}", e);
            Box::new(local)
        }
    }
}

/// 逐个分析有结果的用例，源码从扫描器缓存中读取
pub async fn analyze_all(
    analyzer: &dyn Analyzer,
    scanner: &Scanner,
    cases: &[TestCase],
    results: &ResultMap,
) -> Vec<TestAnalysis> {
    let mut analyses = Vec::new();
    for case in cases {
        let Some(result) = results.get(&case.id) else {
            continue;
        };
        let source = scanner
            .source(case)
            .map(|parsed| parsed.text.clone())
            .unwrap_or_default();
        analyses.push(analyzer.analyze(case, result, &source).await);
    }
    analyses
}

/// 不执行用例，逐个分析源码
pub async fn analyze_sources(
    analyzer: &dyn Analyzer,
    scanner: &Scanner,
    cases: &[TestCase],
) -> Vec<TestAnalysis> {
    let mut analyses = Vec::with_capacity(cases.len());
    for case in cases {
        let source = scanner
            .source(case)
            .map(|parsed| parsed.text.clone())
            .unwrap_or_default();
        analyses.push(analyzer.analyze_source(case, &source).await);
    }
    analyses
}

/// 建议的修改按目标文件分组
pub fn fix_targets(analyses: &[TestAnalysis]) -> BTreeMap<&Path, Vec<&CodeFix>> {
    let mut targets: BTreeMap<&Path, Vec<&CodeFix>> = BTreeMap::new();
    for fix in analyses.iter().flat_map(|a| &a.fixes) {
        targets.entry(fix.file_path.as_path()).or_default().push(fix);
    }
    targets
}

/// 截取用例函数的源码：从 `def` 所在行开始，直到缩进回到同级或更外层
///
/// 装饰器行一并包含。
pub fn code_context(source: &str, line: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if line == 0 || line > lines.len() {
        return String::new();
    }

    let indent_of = |l: &str| l.len() - l.trim_start().len();
    let def_index = line - 1;
    let def_indent = indent_of(lines[def_index]);

    let mut start = def_index;
    while start > 0 {
        let prev = lines[start - 1];
        if prev.trim_start().starts_with('@') && indent_of(prev) == def_indent {
            start -= 1;
        } else {
            break;
        }
    }

    let mut end = def_index + 1;
    while end < lines.len() {
        let l = lines[end];
        if !l.trim().is_empty() && indent_of(l) <= def_indent {
            break;
        }
        end += 1;
    }

    lines[start..end].join("\n").trim_end().to_string()
}
