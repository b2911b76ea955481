//! 从 runner 输出中提取覆盖率与失败信息

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// pytest 断言行前缀
const ASSERTION_PREFIX: &str = "E   ";

/// `Kind: message`
static KIND_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_][\w.]*): ").expect("valid kind pattern"));

/// 无详情时在整个 stderr 中查找，Kind 必须是大写开头的标识符
static STRICT_KIND_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Z][\w.]*): \S").expect("valid strict kind pattern"));

/// 失败信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureInfo {
    pub summary: Option<String>,
    pub kind: Option<String>,
    pub detail: Option<String>,
}

/// 提取覆盖率：最后一行同时包含 `TOTAL` 和 `%` 的输出，取第一个 `%` 前的数字
///
/// 超出 0-100 的值视为无效。
pub fn extract_coverage(stdout: &str) -> Option<f64> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| line.contains("TOTAL") && line.contains('%'))?;

    let (before, _) = line.split_once('%')?;
    let value: f64 = before.split_whitespace().last()?.parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

/// 按文件的覆盖率：`term-missing` 表格中首列是 `.py` 文件的行
///
/// 取第一个 `%` 前的数字，同一文件出现多次时以最后一次为准。
pub fn extract_file_coverage(stdout: &str) -> BTreeMap<String, f64> {
    let mut coverage = BTreeMap::new();
    for line in stdout.lines() {
        let Some(file) = line.split_whitespace().next() else {
            continue;
        };
        if !file.ends_with(".py") {
            continue;
        }
        let Some((before, _)) = line.split_once('%') else {
            continue;
        };
        let Some(Ok(value)) = before.split_whitespace().last().map(str::parse::<f64>) else {
            continue;
        };
        if (0.0..=100.0).contains(&value) {
            coverage.insert(file.to_string(), value);
        }
    }
    coverage
}

/// 提取失败信息
///
/// `E   ` 开头的行是断言信息，第一条作为摘要；`Traceback` 之后直到空行的内容
/// 作为调用栈。两者拼接为详情。
pub fn extract_failure(stderr: &str) -> FailureInfo {
    let mut assertions: Vec<&str> = Vec::new();
    let mut traceback: Vec<&str> = Vec::new();
    let mut in_traceback = false;
    let mut traceback_done = false;

    for line in stderr.lines() {
        if let Some(rest) = line.strip_prefix(ASSERTION_PREFIX) {
            assertions.push(rest);
        } else if !traceback_done && line.contains("Traceback") {
            in_traceback = true;
        } else if in_traceback {
            if line.trim().is_empty() {
                in_traceback = false;
                traceback_done = true;
            } else {
                traceback.push(line);
            }
        }
    }

    let detail_lines: Vec<&str> = assertions.iter().chain(traceback.iter()).copied().collect();
    if detail_lines.is_empty() {
        return fallback_failure(stderr);
    }

    let kind_line = detail_lines
        .iter()
        .find_map(|line| KIND_PATTERN.captures(line).map(|c| (*line, c[1].to_string())));

    let summary = assertions
        .first()
        .map(|line| line.trim().to_string())
        .or_else(|| kind_line.as_ref().map(|(line, _)| line.trim().to_string()))
        .or_else(|| detail_lines.last().map(|line| line.trim().to_string()));

    FailureInfo {
        summary,
        kind: kind_line.map(|(_, kind)| kind),
        detail: Some(detail_lines.join("\n")),
    }
}

fn fallback_failure(stderr: &str) -> FailureInfo {
    stderr
        .lines()
        .find_map(|line| {
            STRICT_KIND_PATTERN.captures(line).map(|c| FailureInfo {
                summary: Some(line.trim().to_string()),
                kind: Some(c[1].to_string()),
                detail: None,
            })
        })
        .unwrap_or_default()
}
