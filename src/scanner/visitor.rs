use crate::scanner::classifier::TestClassifier;
use crate::scanner::syntax::{Stmt, StmtKind};
use crate::scanner::types::{ScanError, ScanResult, SourceLocation, TestCase};
use std::collections::HashSet;
use std::path::Path;

/// 遍历语法树收集用例
///
/// 作用域用显式栈维护，嵌套用例取最内层测试类的名称。
/// 函数体内部不再向下查找。
pub struct CaseCollector<'a> {
    classifier: &'a dyn TestClassifier,
    file: &'a Path,
    relative: &'a Path,
    scopes: Vec<String>,
    seen: HashSet<String>,
    cases: Vec<TestCase>,
}

impl<'a> CaseCollector<'a> {
    pub fn new(classifier: &'a dyn TestClassifier, file: &'a Path, relative: &'a Path) -> Self {
        Self {
            classifier,
            file,
            relative,
            scopes: Vec::new(),
            seen: HashSet::new(),
            cases: Vec::new(),
        }
    }

    pub fn collect(mut self, body: &[Stmt]) -> ScanResult<Vec<TestCase>> {
        self.visit(body)?;
        Ok(self.cases)
    }

    fn visit(&mut self, body: &[Stmt]) -> ScanResult<()> {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Class(class) => {
                    if self.classifier.is_scope(class) {
                        self.scopes.push(class.name.clone());
                        let visited = self.visit(&class.body);
                        self.scopes.pop();
                        visited?;
                    } else {
                        self.visit(&class.body)?;
                    }
                }
                StmtKind::Function(func) if self.classifier.is_case(func) => {
                    let scope = self.scopes.last().cloned();
                    let id = TestCase::make_id(self.relative, scope.as_deref(), &func.name);
                    if !self.seen.insert(id.clone()) {
                        return Err(ScanError::DuplicateId {
                            id,
                            path: self.file.to_path_buf(),
                            line: stmt.line,
                        });
                    }

                    self.cases.push(TestCase {
                        id,
                        name: func.name.clone(),
                        location: SourceLocation {
                            file: self.file.to_path_buf(),
                            line: stmt.line,
                        },
                        scope,
                        description: func.docstring.clone().filter(|d| !d.is_empty()),
                        tags: self.classifier.tags(&func.decorators),
                    });
                }
                StmtKind::Block(inner) => self.visit(inner)?,
                _ => {}
            }
        }
        Ok(())
    }
}
