use crate::config::ScannerConfig;
use crate::scanner::syntax::{Arg, ClassDef, Decorator, DecoratorKind, FunctionDef};
use std::collections::BTreeSet;

/// 声明分类规则
///
/// 语法树遍历只通过这个接口判断"是不是用例 / 是不是作用域 / 有哪些标签"，
/// 替换规则不需要改动遍历代码。
pub trait TestClassifier: Send + Sync {
    /// 函数声明是否为测试用例
    fn is_case(&self, func: &FunctionDef) -> bool;

    /// 类声明是否为测试作用域
    fn is_scope(&self, class: &ClassDef) -> bool;

    /// 从装饰器中提取标签，无法识别的装饰器直接跳过
    fn tags(&self, decorators: &[Decorator]) -> BTreeSet<String>;
}

/// 默认规则（pytest / unittest 约定）
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    case_prefix: String,
    scope_prefix: String,
    scope_bases: Vec<String>,
    case_decorators: Vec<String>,
    marker_names: Vec<String>,
}

impl DefaultClassifier {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            case_prefix: config.case_prefix.clone(),
            scope_prefix: config.scope_prefix.clone(),
            scope_bases: config.scope_bases.clone(),
            case_decorators: config.case_decorators.clone(),
            marker_names: config.marker_names.clone(),
        }
    }

    fn is_marker_name(&self, segment: &str) -> bool {
        self.marker_names.iter().any(|m| m == segment)
    }

    /// `x.mark.<name>` 形式返回 `<name>`
    fn attribute_marker<'a>(&self, path: &'a [String]) -> Option<&'a str> {
        match path {
            [.., marker, name] if self.is_marker_name(marker) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self::new(&ScannerConfig::default())
    }
}

impl TestClassifier for DefaultClassifier {
    fn is_case(&self, func: &FunctionDef) -> bool {
        if func.name.starts_with(&self.case_prefix) {
            return true;
        }
        func.decorators.iter().any(|d| match &d.kind {
            DecoratorKind::Name(path) => self.case_decorators.contains(&path.join(".")),
            _ => false,
        })
    }

    fn is_scope(&self, class: &ClassDef) -> bool {
        class.name.starts_with(&self.scope_prefix)
            || class.bases.iter().any(|base| {
                base.last()
                    .is_some_and(|name| self.scope_bases.iter().any(|b| b == name))
            })
    }

    fn tags(&self, decorators: &[Decorator]) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        for decorator in decorators {
            match &decorator.kind {
                DecoratorKind::Name(path) => {
                    if let Some(name) = self.attribute_marker(path) {
                        tags.insert(name.to_string());
                    }
                }
                DecoratorKind::Call { callee, args } => {
                    if let Some(name) = self.attribute_marker(callee) {
                        tags.insert(name.to_string());
                    } else if callee.last().is_some_and(|last| self.is_marker_name(last)) {
                        // 只看第一个位置参数
                        let first_positional = args.iter().find(|a| !matches!(a, Arg::Keyword(_)));
                        if let Some(Arg::Literal(literal)) = first_positional {
                            tags.insert(literal.to_text());
                        }
                    }
                }
                DecoratorKind::Malformed => {}
            }
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::syntax::{self, StmtKind};

    fn first_function(source: &str) -> FunctionDef {
        let module = syntax::parse(source).unwrap();
        match module.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Function(f)) => f,
            other => panic!("expected function, got {:?}", other),
        }
    }

    fn first_class(source: &str) -> ClassDef {
        let module = syntax::parse(source).unwrap();
        match module.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Class(c)) => c,
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_case_by_prefix_and_decorator() {
        let classifier = DefaultClassifier::default();
        assert!(classifier.is_case(&first_function("def test_x():\n    pass\n")));
        assert!(classifier.is_case(&first_function("@pytest\ndef check_x():\n    pass\n")));
        assert!(!classifier.is_case(&first_function("@pytest.fixture\ndef client():\n    pass\n")));
        assert!(!classifier.is_case(&first_function("def helper():\n    pass\n")));
    }

    #[test]
    fn test_scope_by_name_and_base() {
        let classifier = DefaultClassifier::default();
        assert!(classifier.is_scope(&first_class("class TestApi:\n    pass\n")));
        assert!(classifier.is_scope(&first_class("class Calc(unittest.TestCase):\n    pass\n")));
        assert!(classifier.is_scope(&first_class("class Calc(TestCase):\n    pass\n")));
        assert!(!classifier.is_scope(&first_class("class Calculator(object):\n    pass\n")));
    }

    #[test]
    fn test_tags() {
        let classifier = DefaultClassifier::default();
        let func = first_function(
            r#"@pytest.mark.slow
@pytest.mark.parametrize("a", [1, 2])
@custom.mark("smoke")
@custom.marker(reason="x")
@custom.marker(3)
@custom.mark(value)
@broken[0]
def test_x(a):
    pass
"#,
        );
        let tags = classifier.tags(&func.decorators);
        let expected: BTreeSet<String> = ["slow", "parametrize", "smoke", "3"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tags, expected);
    }
}
