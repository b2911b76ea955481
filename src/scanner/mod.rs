pub mod cache;
pub mod classifier;
pub mod deps;
pub mod syntax;
pub mod types;
pub mod visitor;
pub mod walker;

// Re-export commonly used types
pub use cache::{ParsedSource, SourceCache};
pub use classifier::{DefaultClassifier, TestClassifier};
pub use types::{ScanError, ScanResult, SourceLocation, TestCase};
pub use walker::{ExcludePattern, Scan, ScanIter};

use crate::config::{ConfigError, ScannerConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use visitor::CaseCollector;

/// 多个扫描根的合并结果
#[derive(Debug, Default)]
pub struct Collected {
    pub cases: Vec<TestCase>,

    /// 文件级错误，包括不同根之间的 ID 冲突
    pub errors: Vec<ScanError>,
}

/// 基于语法树的测试用例扫描器
pub struct Scanner {
    classifier: Box<dyn TestClassifier>,
    file_pattern: glob::Pattern,
    excludes: Vec<ExcludePattern>,
    cache: SourceCache,
}

impl Scanner {
    /// 按配置创建扫描器，使用默认分类规则
    pub fn new(config: &ScannerConfig) -> Result<Self, ConfigError> {
        let file_pattern =
            glob::Pattern::new(&config.file_pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: config.file_pattern.clone(),
                message: e.to_string(),
            })?;
        let excludes = config
            .exclude_patterns
            .iter()
            .map(|p| ExcludePattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            classifier: Box::new(DefaultClassifier::new(config)),
            file_pattern,
            excludes,
            cache: SourceCache::new(),
        })
    }

    /// 替换分类规则
    pub fn with_classifier(mut self, classifier: impl TestClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// 扫描文件或目录，返回可重复遍历的惰性序列
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> ScanResult<Scan<'_>> {
        let root = root.as_ref();
        if !root.exists() {
            return Err(ScanError::MissingRoot(root.to_path_buf()));
        }
        Ok(Scan::new(self, root.to_path_buf()))
    }

    /// 依次扫描多个根并合并
    ///
    /// ID 相对各自的根生成，不同根下的同名文件会得到相同的 ID：后出现的文件
    /// 整体跳过并记为 [`ScanError::DuplicateId`]。同一文件被多个根覆盖时只保留一次。
    pub fn scan_all<P: AsRef<Path>>(&self, roots: &[P]) -> ScanResult<Collected> {
        let scans = roots
            .iter()
            .map(|root| self.scan(root))
            .collect::<ScanResult<Vec<_>>>()?;

        let mut collected = Collected::default();
        let mut owners: HashMap<String, PathBuf> = HashMap::new();
        for scan in &scans {
            let mut iter = scan.iter();
            let cases: Vec<TestCase> = iter.by_ref().collect();
            collected.errors.extend(iter.into_errors());

            for file_cases in cases.chunk_by(|a, b| a.location.file == b.location.file) {
                let file = &file_cases[0].location.file;
                let canonical = file.canonicalize().unwrap_or_else(|_| file.clone());
                let clash = file_cases.iter().find(|case| {
                    owners
                        .get(&case.id)
                        .is_some_and(|owner| *owner != canonical)
                });
                if let Some(case) = clash {
                    let error = ScanError::DuplicateId {
                        id: case.id.clone(),
                        path: case.location.file.clone(),
                        line: case.location.line,
                    };
                    warn!("Skipping {}: {}", case.location.file.display(), error);
                    collected.errors.push(error);
                    continue;
                }

                for case in file_cases {
                    if owners.contains_key(&case.id) {
                        continue;
                    }
                    owners.insert(case.id.clone(), canonical.clone());
                    collected.cases.push(case.clone());
                }
            }
        }
        Ok(collected)
    }

    /// 扫描单个文件，任何错误都直接返回
    pub fn scan_file<P: AsRef<Path>>(&self, path: P) -> ScanResult<Vec<TestCase>> {
        let path = path.as_ref();
        let relative = path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf());
        self.cases_in(path, &relative)
    }

    pub(crate) fn cases_in(&self, file: &Path, relative: &Path) -> ScanResult<Vec<TestCase>> {
        let parsed = self.cache.get_or_parse(file)?;
        CaseCollector::new(self.classifier.as_ref(), file, relative).collect(&parsed.module.body)
    }

    pub(crate) fn is_excluded(&self, segment: &str) -> bool {
        self.excludes.iter().any(|p| p.matches(segment))
    }

    pub(crate) fn matches_file_name(&self, name: &str) -> bool {
        self.file_pattern.matches(name)
    }

    /// 用例所在文件导入的、磁盘上存在的兄弟源文件
    ///
    /// Best-effort：文件无法读取或解析时只返回用例文件本身。
    pub fn dependencies(&self, case: &TestCase) -> Vec<PathBuf> {
        match self.cache.get_or_parse(&case.location.file) {
            Ok(parsed) => deps::resolve_dependencies(&parsed),
            Err(e) => {
                warn!("Failed to get dependencies for {}: {}", case.id, e);
                vec![case.location.file.clone()]
            }
        }
    }

    /// 用例所在文件的源码（走缓存）
    pub fn source(&self, case: &TestCase) -> Option<Arc<ParsedSource>> {
        self.cache.get_or_parse(&case.location.file).ok()
    }

    /// 使单个文件的缓存失效
    pub fn invalidate<P: AsRef<Path>>(&self, path: P) -> bool {
        let removed = self.cache.invalidate(path.as_ref());
        debug!("Invalidated cache for {}: {}", path.as_ref().display(), removed);
        removed
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }
}
