use crate::config::ConfigError;
use crate::scanner::Scanner;
use crate::scanner::types::{ScanError, TestCase};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 排除规则，按路径段逐段匹配
#[derive(Debug, Clone)]
pub enum ExcludePattern {
    Glob(glob::Pattern),
    /// 以 `re:` 开头的配置项
    Regex(regex::Regex),
}

impl ExcludePattern {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if let Some(expr) = raw.strip_prefix("re:") {
            regex::Regex::new(expr)
                .map(ExcludePattern::Regex)
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: raw.to_string(),
                    message: e.to_string(),
                })
        } else {
            glob::Pattern::new(raw)
                .map(ExcludePattern::Glob)
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: raw.to_string(),
                    message: e.to_string(),
                })
        }
    }

    pub fn matches(&self, segment: &str) -> bool {
        match self {
            ExcludePattern::Glob(pattern) => pattern.matches(segment),
            ExcludePattern::Regex(regex) => regex.is_match(segment),
        }
    }
}

/// 一次扫描的入口，可多次调用 [`Scan::iter`] 重新遍历
pub struct Scan<'a> {
    scanner: &'a Scanner,
    root: PathBuf,
}

impl<'a> Scan<'a> {
    pub(crate) fn new(scanner: &'a Scanner, root: PathBuf) -> Self {
        Self { scanner, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 从头开始一次新的惰性遍历
    pub fn iter(&self) -> ScanIter<'a> {
        ScanIter::new(self.scanner, self.root.clone())
    }
}

impl<'a> IntoIterator for &Scan<'a> {
    type Item = TestCase;
    type IntoIter = ScanIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 惰性用例序列
///
/// 单个文件的错误只记录警告并保存在 [`ScanIter::errors`] 中，不会中断遍历。
pub struct ScanIter<'a> {
    scanner: &'a Scanner,
    base: PathBuf,
    pending_dirs: Vec<PathBuf>,
    pending_files: VecDeque<PathBuf>,
    buffer: VecDeque<TestCase>,
    seen: HashSet<String>,
    errors: Vec<ScanError>,
}

impl<'a> ScanIter<'a> {
    fn new(scanner: &'a Scanner, root: PathBuf) -> Self {
        let mut iter = Self {
            scanner,
            base: root.clone(),
            pending_dirs: Vec::new(),
            pending_files: VecDeque::new(),
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            errors: Vec::new(),
        };

        if root.is_dir() {
            iter.pending_dirs.push(root);
        } else {
            iter.base = root
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            iter.pending_files.push_back(root);
        }
        iter
    }

    /// 到目前为止遇到的文件级错误
    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ScanError> {
        self.errors
    }

    fn record(&mut self, error: ScanError) {
        warn!("Skipping {}: {}", error.path().display(), error);
        self.errors.push(error);
    }

    fn expand_dir(&mut self, dir: PathBuf) {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) => {
                self.record(ScanError::Io { path: dir, source });
                return;
            }
        };

        let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        let mut subdirs = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if self.scanner.is_excluded(&name) {
                debug!("Excluded {}", entry.path().display());
                continue;
            }

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                subdirs.push(path);
            } else if (file_type.is_file() || path.is_file())
                && self.scanner.matches_file_name(&name)
            {
                self.pending_files.push_back(path);
            }
        }

        // 栈顶为字典序最小的子目录
        self.pending_dirs.extend(subdirs.into_iter().rev());
    }

    fn scan_one(&mut self, file: PathBuf) {
        let relative = file
            .strip_prefix(&self.base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| file.clone());

        let cases = match self.scanner.cases_in(&file, &relative) {
            Ok(cases) => cases,
            Err(error) => {
                self.record(error);
                return;
            }
        };

        if let Some(dup) = cases.iter().find(|c| self.seen.contains(&c.id)) {
            let error = ScanError::DuplicateId {
                id: dup.id.clone(),
                path: file.clone(),
                line: dup.location.line,
            };
            self.record(error);
            return;
        }

        debug!("Found {} tests in {}", cases.len(), file.display());
        self.seen.extend(cases.iter().map(|c| c.id.clone()));
        self.buffer.extend(cases);
    }
}

impl Iterator for ScanIter<'_> {
    type Item = TestCase;

    fn next(&mut self) -> Option<TestCase> {
        loop {
            if let Some(case) = self.buffer.pop_front() {
                return Some(case);
            }
            if let Some(file) = self.pending_files.pop_front() {
                self.scan_one(file);
                continue;
            }
            if let Some(dir) = self.pending_dirs.pop() {
                self.expand_dir(dir);
                continue;
            }
            return None;
        }
    }
}
