use crate::scanner::syntax::{self, Module};
use crate::scanner::types::{ScanError, ScanResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// 已解析的源文件
#[derive(Debug)]
pub struct ParsedSource {
    pub path: PathBuf,
    pub text: String,
    pub module: Module,
}

/// 扫描器私有的解析缓存
///
/// Key 为规范化后的路径。缓存不会自动失效，文件改动后需要调用方
/// 调用 [`SourceCache::invalidate`] 或 [`SourceCache::clear`]。
/// 解析失败的文件不会进入缓存。
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: Mutex<HashMap<PathBuf, Arc<ParsedSource>>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    /// 读取缓存，未命中时读取并解析文件
    pub fn get_or_parse(&self, path: &Path) -> ScanResult<Arc<ParsedSource>> {
        let key = Self::key(path);
        if let Some(hit) = self.lock().get(&key) {
            trace!("Source cache hit: {}", key.display());
            return Ok(Arc::clone(hit));
        }

        let text = std::fs::read_to_string(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let module = syntax::parse(&text).map_err(|source| ScanError::Syntax {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed = Arc::new(ParsedSource {
            path: path.to_path_buf(),
            text,
            module,
        });
        self.lock().insert(key, Arc::clone(&parsed));
        Ok(parsed)
    }

    /// 使单个文件的缓存失效，返回是否存在该条目
    pub fn invalidate(&self, path: &Path) -> bool {
        self.lock().remove(&Self::key(path)).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<ParsedSource>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
