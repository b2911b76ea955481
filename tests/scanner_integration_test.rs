use radar::config::ScannerConfig;
use radar::scanner::{ScanError, Scanner};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn fixture_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(
        root,
        "test_calc.py",
        r#"
import pytest
from helpers import make_calc


def test_add():
    """Adds two numbers.

    Uses the default calculator.
    """
    assert make_calc().add(2, 2) == 4


class TestCalc:
    @pytest.mark.slow
    def test_sub(self):
        assert make_calc().sub(2, 2) == 0

    def helper(self):
        return 1


class Helpers:
    def test_not_in_scope(self):
        pass
"#,
    );
    write(root, "helpers.py", "def make_calc():\n    return None\n");
    write(root, "test_broken.py", "def test_oops(:\n    pass\n");
    write(
        root,
        "api/test_client.py",
        r#"
import unittest


class ClientTests(unittest.TestCase):
    @pytest.marker("network")
    def test_get(self):
        def test_inner():
            pass

    if True:
        def test_conditional(self):
            pass
"#,
    );
    write(root, "__pycache__/test_cached.py", "def test_stale():\n    pass\n");
    write(root, "api/not_a_test.py", "def test_ignored():\n    pass\n");
    dir
}

#[test]
fn test_directory_scan_survives_bad_file() {
    let dir = fixture_tree();
    let scanner = Scanner::new(&ScannerConfig::default()).unwrap();

    let scan = scanner.scan(dir.path()).unwrap();
    let mut iter = scan.iter();
    let ids: Vec<String> = iter.by_ref().map(|c| c.id).collect();

    assert_eq!(
        ids,
        vec![
            "test_calc::test_add",
            "test_calc::TestCalc::test_sub",
            "test_calc::test_not_in_scope",
            "api/test_client::ClientTests::test_get",
            "api/test_client::ClientTests::test_conditional",
        ]
    );

    let errors = iter.into_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], ScanError::Syntax { path, .. } if path.ends_with("test_broken.py")));
}

#[test]
fn test_scan_is_restartable() {
    let dir = fixture_tree();
    let scanner = Scanner::new(&ScannerConfig::default()).unwrap();
    let scan = scanner.scan(dir.path()).unwrap();

    let first: Vec<_> = scan.iter().collect();
    let second: Vec<_> = (&scan).into_iter().collect();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_case_metadata() {
    let dir = fixture_tree();
    let scanner = Scanner::new(&ScannerConfig::default()).unwrap();
    let cases = scanner.scan_file(dir.path().join("test_calc.py")).unwrap();

    let add = &cases[0];
    assert_eq!(add.name, "test_add");
    assert_eq!(add.location.line, 6);
    assert_eq!(add.scope, None);
    assert_eq!(
        add.description.as_deref(),
        Some("Adds two numbers.\n\nUses the default calculator.")
    );

    let sub = &cases[1];
    assert_eq!(sub.scope.as_deref(), Some("TestCalc"));
    assert!(sub.has_tag("slow"));
    assert_eq!(
        sub.selector(),
        format!("{}::TestCalc::test_sub", dir.path().join("test_calc.py").display())
    );

    let client = scanner
        .scan_file(dir.path().join("api/test_client.py"))
        .unwrap();
    assert!(client[0].has_tag("network"));
}

#[test]
fn test_single_file_errors_are_returned() {
    let dir = fixture_tree();
    let scanner = Scanner::new(&ScannerConfig::default()).unwrap();

    let err = scanner
        .scan_file(dir.path().join("test_broken.py"))
        .unwrap_err();
    assert!(matches!(err, ScanError::Syntax { .. }));

    let err = scanner.scan(dir.path().join("missing")).err().unwrap();
    assert!(matches!(err, ScanError::MissingRoot(_)));
}

#[test]
fn test_exclude_patterns() {
    let dir = fixture_tree();
    let config = ScannerConfig {
        exclude_patterns: vec![
            "__pycache__".to_string(),
            "api".to_string(),
            "re:^test_broken".to_string(),
        ],
        ..ScannerConfig::default()
    };
    let scanner = Scanner::new(&config).unwrap();

    let scan = scanner.scan(dir.path()).unwrap();
    let mut iter = scan.iter();
    let ids: Vec<String> = iter.by_ref().map(|c| c.id).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id.starts_with("test_calc::")));
    assert!(iter.errors().is_empty());
}

#[test]
fn test_dependencies_and_cache() {
    let dir = fixture_tree();
    let scanner = Scanner::new(&ScannerConfig::default()).unwrap();
    let cases = scanner.scan_file(dir.path().join("test_calc.py")).unwrap();

    let deps = scanner.dependencies(&cases[0]);
    assert_eq!(
        deps,
        vec![dir.path().join("test_calc.py"), dir.path().join("helpers.py")]
    );

    let source = scanner.source(&cases[0]).unwrap();
    assert!(source.text.contains("class TestCalc"));
    assert_eq!(scanner.cache().len(), 1);

    // 修改文件后需要显式失效缓存
    write(dir.path(), "test_calc.py", "def test_only():\n    pass\n");
    assert_eq!(scanner.scan_file(dir.path().join("test_calc.py")).unwrap().len(), 3);
    assert!(scanner.invalidate(dir.path().join("test_calc.py")));
    assert_eq!(scanner.scan_file(dir.path().join("test_calc.py")).unwrap().len(), 1);
}

#[test]
fn test_semicolons_and_type_parameters() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "test_generic.py",
        r#"import os; import sys

class TestBox[T]:
    def test_get(self):
        x = 1; assert x == 1

    def test_put[U](self, value: U):
        pass

def test_free(): assert True; assert 1
"#,
    );
    let scanner = Scanner::new(&ScannerConfig::default()).unwrap();

    let cases = scanner.scan_file(dir.path().join("test_generic.py")).unwrap();
    let ids: Vec<_> = cases.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "test_generic::TestBox::test_get",
            "test_generic::TestBox::test_put",
            "test_generic::test_free"
        ]
    );
    assert_eq!(cases[1].location.line, 7);
}

#[test]
fn test_same_file_name_in_two_roots() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a/test_x.py", "def test_one():\n    pass\n");
    write(
        dir.path(),
        "b/test_x.py",
        "def test_one():\n    pass\n\ndef test_two():\n    pass\n",
    );
    let scanner = Scanner::new(&ScannerConfig::default()).unwrap();

    let collected = scanner
        .scan_all(&[dir.path().join("a"), dir.path().join("b")])
        .unwrap();
    let ids: Vec<_> = collected.cases.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["test_x::test_one"]);
    assert!(collected.cases[0].location.file.starts_with(dir.path().join("a")));

    assert_eq!(collected.errors.len(), 1);
    match &collected.errors[0] {
        ScanError::DuplicateId { id, path, .. } => {
            assert_eq!(id, "test_x::test_one");
            assert!(path.ends_with("b/test_x.py"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_same_root_twice_is_not_a_collision() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "test_x.py", "def test_one():\n    pass\n");
    let scanner = Scanner::new(&ScannerConfig::default()).unwrap();

    let once = scanner.scan_all(&[dir.path()]).unwrap();
    let twice = scanner.scan_all(&[dir.path(), dir.path()]).unwrap();
    assert!(twice.errors.is_empty());
    assert_eq!(twice.cases, once.cases);
    assert_eq!(twice.cases.len(), 1);

    let missing = scanner.scan_all(&[dir.path().join("missing")]);
    assert!(matches!(missing, Err(ScanError::MissingRoot(_))));
}
