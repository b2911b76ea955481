use crate::scanner::syntax::SyntaxError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// 用例 ID 各段之间的分隔符
pub const ID_SEPARATOR: &str = "::";

/// 用例在源文件中的位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 源文件路径（扫描时给出的路径，不做规范化）
    pub file: PathBuf,

    /// `def` 所在行号（从 1 开始）
    pub line: usize,
}

/// 扫描发现的单个测试用例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// 唯一 ID：`相对路径(去扩展名)::[作用域::]函数名`
    pub id: String,

    /// 函数名
    pub name: String,

    /// 源码位置
    pub location: SourceLocation,

    /// 最内层的测试类名称
    pub scope: Option<String>,

    /// 来自 docstring 的描述
    pub description: Option<String>,

    /// 来自 marker 装饰器的标签
    pub tags: BTreeSet<String>,
}

impl TestCase {
    /// 按统一规则生成用例 ID
    pub fn make_id(relative_path: &Path, scope: Option<&str>, name: &str) -> String {
        let stem = relative_path.with_extension("");
        let path = stem
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match scope {
            Some(scope) => format!("{path}{ID_SEPARATOR}{scope}{ID_SEPARATOR}{name}"),
            None => format!("{path}{ID_SEPARATOR}{name}"),
        }
    }

    /// 传给外部 runner 的用例选择器：`<file>::<scope>::<name>`
    pub fn selector(&self) -> String {
        let file = self.location.file.display();
        match &self.scope {
            Some(scope) => format!("{file}{ID_SEPARATOR}{scope}{ID_SEPARATOR}{}", self.name),
            None => format!("{file}{ID_SEPARATOR}{}", self.name),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// 扫描错误，作用范围限于单个文件
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: SyntaxError,
    },

    #[error("Duplicate test id '{id}' in {path} at line {line}")]
    DuplicateId { id: String, path: PathBuf, line: usize },

    #[error("Scan root does not exist: {0}")]
    MissingRoot(PathBuf),
}

impl ScanError {
    /// 出错的文件路径
    pub fn path(&self) -> &Path {
        match self {
            ScanError::Io { path, .. }
            | ScanError::Syntax { path, .. }
            | ScanError::DuplicateId { path, .. } => path,
            ScanError::MissingRoot(path) => path,
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_id_without_scope() {
        let id = TestCase::make_id(Path::new("calc.py"), None, "test_add");
        assert_eq!(id, "calc::test_add");
    }

    #[test]
    fn test_make_id_with_scope_and_dirs() {
        let id = TestCase::make_id(
            Path::new("pkg/tests/test_calc.py"),
            Some("TestCalculator"),
            "test_add",
        );
        assert_eq!(id, "pkg/tests/test_calc::TestCalculator::test_add");
    }

    #[test]
    fn test_selector() {
        let case = TestCase {
            id: "test_calc::TestCalc::test_add".to_string(),
            name: "test_add".to_string(),
            location: SourceLocation {
                file: PathBuf::from("tests/test_calc.py"),
                line: 10,
            },
            scope: Some("TestCalc".to_string()),
            description: None,
            tags: BTreeSet::new(),
        };
        assert_eq!(case.selector(), "tests/test_calc.py::TestCalc::test_add");
    }
}
