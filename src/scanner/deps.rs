use crate::scanner::cache::ParsedSource;
use crate::scanner::syntax::ImportRef;
use std::path::{Path, PathBuf};

/// 把 import 语句解析为磁盘上存在的兄弟源文件
///
/// 结果第一项总是源文件本身；无法解析的 import 直接忽略。
pub fn resolve_dependencies(parsed: &ParsedSource) -> Vec<PathBuf> {
    let mut deps = vec![parsed.path.clone()];
    let Some(dir) = parsed.path.parent() else {
        return deps;
    };

    for import in parsed.module.imports() {
        for candidate in candidates(dir, &import) {
            if let Some(found) = existing_module(&candidate)
                && !deps.contains(&found)
            {
                deps.push(found);
            }
        }
    }
    deps
}

/// 每条 import 可能对应的模块路径（不含扩展名）
fn candidates(dir: &Path, import: &ImportRef) -> Vec<PathBuf> {
    let mut base = dir.to_path_buf();
    for _ in 1..import.level {
        if !base.pop() {
            return Vec::new();
        }
    }

    let module_path = import
        .module
        .as_deref()
        .map(|m| m.split('.').fold(base.clone(), |p, part| p.join(part)));

    let mut out = Vec::new();
    if let Some(path) = &module_path {
        out.push(path.clone());
    }
    // `from pkg import mod` / `from . import mod` 可能导入的是子模块
    let parent = module_path.unwrap_or(base);
    out.extend(import.names.iter().map(|name| parent.join(name)));
    out
}

fn existing_module(module: &Path) -> Option<PathBuf> {
    let file = module.with_extension("py");
    if file.is_file() {
        return Some(file);
    }
    let package = module.join("__init__.py");
    package.is_file().then_some(package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::syntax;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_sibling_modules() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("helpers.py"), "").unwrap();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/__init__.py"), "").unwrap();
        fs::write(root.join("pkg/db.py"), "").unwrap();

        let source = "import os\nimport helpers\nfrom pkg import db\nfrom missing import x\n";
        let parsed = ParsedSource {
            path: root.join("test_app.py"),
            text: source.to_string(),
            module: syntax::parse(source).unwrap(),
        };

        let deps = resolve_dependencies(&parsed);
        assert_eq!(
            deps,
            vec![
                root.join("test_app.py"),
                root.join("helpers.py"),
                root.join("pkg/__init__.py"),
                root.join("pkg/db.py"),
            ]
        );
    }

    #[test]
    fn test_relative_import_levels() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("conftest.py"), "").unwrap();
        fs::write(root.join("tests/fixtures.py"), "").unwrap();

        let source = "from . import fixtures\nfrom .. import conftest\n";
        let parsed = ParsedSource {
            path: root.join("tests/test_rel.py"),
            text: source.to_string(),
            module: syntax::parse(source).unwrap(),
        };

        let deps = resolve_dependencies(&parsed);
        assert_eq!(
            deps,
            vec![
                root.join("tests/test_rel.py"),
                root.join("tests/fixtures.py"),
                root.join("conftest.py"),
            ]
        );
    }
}
