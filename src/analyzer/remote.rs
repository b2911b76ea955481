use super::local::LocalAnalyzer;
use super::types::{AnalyzerError, CodeFix, TestAnalysis};
use super::{Analyzer, code_context};
use crate::runner::TestResult;
use crate::scanner::TestCase;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// 解析出的代码修改默认置信度
const DEFAULT_FIX_CONFIDENCE: f64 = 0.8;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// 调用远程文本生成服务（Ollama `/api/generate` 风格）的分析器
///
/// 任何远程错误都会记录警告并回退到本地分析。
pub struct RemoteAnalyzer {
    http_client: reqwest::Client,
    generate_url: Url,
    model: String,
    fallback: LocalAnalyzer,
}

impl RemoteAnalyzer {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        request_timeout: Duration,
        fallback: LocalAnalyzer,
    ) -> Result<Self, AnalyzerError> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let generate_url = base.join("api/generate")?;

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            generate_url,
            model: model.into(),
            fallback,
        })
    }

    pub fn generate_url(&self) -> &Url {
        &self.generate_url
    }

    /// 发送提示词，返回生成的文本
    pub async fn generate(&self, prompt: &str) -> Result<String, AnalyzerError> {
        debug!("Sending analysis request to {}", self.generate_url);

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let http_response = self
            .http_client
            .post(self.generate_url.clone())
            .json(&body)
            .send()
            .await?;

        let status = http_response.status();
        if !status.is_success() {
            let body = http_response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let generated: GenerateResponse = http_response.json().await?;
        if generated.response.trim().is_empty() {
            return Err(AnalyzerError::EmptyResponse);
        }
        Ok(generated.response)
    }

    /// 远程分析，失败时返回错误而不回退
    ///
    /// `result` 为 None 时只根据源码分析。
    pub async fn try_analyze(
        &self,
        case: &TestCase,
        result: Option<&TestResult>,
        source: &str,
    ) -> Result<TestAnalysis, AnalyzerError> {
        let prompt = build_prompt(case, result, &code_context(source, case.location.line))?;
        let response = self.generate(&prompt).await?;
        info!(test_id = %case.id, "Remote analysis completed");
        Ok(parse_response(&response, case))
    }
}

#[async_trait]
impl Analyzer for RemoteAnalyzer {
    async fn analyze(&self, case: &TestCase, result: &TestResult, source: &str) -> TestAnalysis {
        match self.try_analyze(case, Some(result), source).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(test_id = %case.id, "Remote analysis failed, using local analyzer: {}", e);
                self.fallback.inspect(case, result)
            }
        }
    }

    async fn analyze_source(&self, case: &TestCase, source: &str) -> TestAnalysis {
        match self.try_analyze(case, None, source).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(test_id = %case.id, "Remote analysis failed, using local analyzer: {}", e);
                self.fallback.inspect_source(case, source)
            }
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// 构造分析提示词
pub fn build_prompt(
    case: &TestCase,
    result: Option<&TestResult>,
    context: &str,
) -> Result<String, std::fmt::Error> {
    let mut prompt = String::new();
    match result {
        Some(_) => writeln!(prompt, "Please analyze this Python test and its execution result:")?,
        None => writeln!(prompt, "Please analyze this Python test (it has not been run):")?,
    }
    writeln!(prompt)?;
    writeln!(prompt, "Test Information:")?;
    writeln!(prompt, "- ID: {}", case.id)?;
    writeln!(prompt, "- File: {}", case.location.file.display())?;
    writeln!(prompt, "- Line: {}", case.location.line)?;
    writeln!(prompt, "- Class: {}", case.scope.as_deref().unwrap_or("None"))?;
    writeln!(prompt)?;
    writeln!(prompt, "Code Context:\n```python\n{}\n```", context)?;

    if let Some(result) = result {
        let coverage = result
            .coverage_percentage
            .map(|c| format!("{c:.1}%"))
            .unwrap_or_else(|| "N/A".to_string());
        writeln!(prompt)?;
        writeln!(prompt, "Test Result:")?;
        writeln!(prompt, "- Status: {}", result.status)?;
        writeln!(prompt, "- Duration: {:.2}s", result.duration.as_secs_f64())?;
        writeln!(prompt, "- Coverage: {}", coverage)?;
        writeln!(prompt)?;
        writeln!(prompt, "Execution Output:\n```\n{}\n```", result.captured_stdout)?;
        writeln!(prompt, "Error Output:\n```\n{}\n```", result.captured_stderr)?;
    }

    writeln!(prompt)?;
    prompt.push_str(
        "Format your response in sections:\n\n\
         Issues:\n- Issue 1\n\n\
         Suggestions:\n- Suggestion 1\n\n\
         Code Fixes:\n```python\n# Original code\n```\n```python\n# Suggested fix\n```\n\n\
         Coverage Gaps:\n- Gap 1\n",
    );
    Ok(prompt)
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Issues,
    Suggestions,
    Fixes,
    CoverageGaps,
}

/// 解析分段格式的回复
pub fn parse_response(response: &str, case: &TestCase) -> TestAnalysis {
    let mut analysis = TestAnalysis::new(&case.id);
    let mut section = Section::None;

    let mut blocks: Vec<String> = Vec::new();
    let mut explanation: Vec<String> = Vec::new();
    let mut current_block: Option<Vec<&str>> = None;

    for line in response.lines() {
        let trimmed = line.trim();

        if let Some(block) = current_block.as_mut() {
            if trimmed.starts_with("```") {
                blocks.push(clean_code_block(block));
                current_block = None;
            } else {
                block.push(line);
            }
            continue;
        }

        let header = match trimmed {
            t if t.starts_with("Issues:") => Some(Section::Issues),
            t if t.starts_with("Suggestions:") => Some(Section::Suggestions),
            t if t.starts_with("Code Fixes:") => Some(Section::Fixes),
            t if t.starts_with("Coverage Gaps:") => Some(Section::CoverageGaps),
            _ => None,
        };
        if let Some(header) = header {
            section = header;
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }

        let item = trimmed.trim_start_matches(['-', '*', ' ']).trim().to_string();
        match section {
            Section::Issues if !item.is_empty() => analysis.issues.push(item),
            Section::Suggestions if !item.is_empty() => analysis.suggestions.push(item),
            Section::CoverageGaps if !item.is_empty() => analysis.coverage_gaps.push(item),
            Section::Fixes if trimmed.starts_with("```") => current_block = Some(Vec::new()),
            Section::Fixes => explanation.push(item),
            _ => {}
        }
    }

    let explanation = explanation.join(" ");
    for pair in blocks.chunks_exact(2) {
        analysis.fixes.push(CodeFix {
            file_path: case.location.file.clone(),
            line_start: case.location.line,
            line_end: case.location.line,
            original_code: pair[0].clone(),
            suggested_code: pair[1].clone(),
            explanation: explanation.clone(),
            confidence: DEFAULT_FIX_CONFIDENCE,
        });
    }
    analysis
}

/// 去掉代码块首行的 `# Original code` / `# Suggested fix` 注释
fn clean_code_block(lines: &[&str]) -> String {
    let skip = lines
        .first()
        .map(|l| {
            let l = l.trim();
            l.starts_with("# Original") || l.starts_with("# Suggested")
        })
        .unwrap_or(false);
    lines[usize::from(skip)..].join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TestStatus;
    use crate::scanner::SourceLocation;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn case() -> TestCase {
        TestCase {
            id: "calc::TestCalc::test_add".to_string(),
            name: "test_add".to_string(),
            location: SourceLocation {
                file: PathBuf::from("calc.py"),
                line: 7,
            },
            scope: Some("TestCalc".to_string()),
            description: None,
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn test_parse_sections() {
        let response = "\
Here is my analysis.

Issues:
- The assertion compares against a magic number
- No edge cases

Suggestions:
* Use parametrize

Code Fixes:
Replace the literal with a computed value.
```python
# Original code
assert add(2, 2) == 5
```
```python
# Suggested fix
assert add(2, 2) == 4
```

Coverage Gaps:
- Negative numbers
";
        let analysis = parse_response(response, &case());
        assert_eq!(analysis.test_id, "calc::TestCalc::test_add");
        assert_eq!(
            analysis.issues,
            vec![
                "The assertion compares against a magic number",
                "No edge cases"
            ]
        );
        assert_eq!(analysis.suggestions, vec!["Use parametrize"]);
        assert_eq!(analysis.coverage_gaps, vec!["Negative numbers"]);

        assert_eq!(analysis.fixes.len(), 1);
        let fix = &analysis.fixes[0];
        assert_eq!(fix.original_code, "assert add(2, 2) == 5");
        assert_eq!(fix.suggested_code, "assert add(2, 2) == 4");
        assert_eq!(fix.explanation, "Replace the literal with a computed value.");
        assert_eq!(fix.file_path, PathBuf::from("calc.py"));
        assert_eq!(fix.line_start, 7);
        assert_eq!(fix.confidence, DEFAULT_FIX_CONFIDENCE);
    }

    #[test]
    fn test_parse_unstructured_response() {
        let analysis = parse_response("Looks fine to me.", &case());
        assert!(analysis.is_clean());
        assert!(analysis.coverage_gaps.is_empty());
    }

    #[test]
    fn test_unpaired_code_block_is_ignored() {
        let response = "Code Fixes:\n```python\nx = 1\n```\n";
        assert!(parse_response(response, &case()).fixes.is_empty());
    }

    #[test]
    fn test_prompt_contains_context() {
        let mut result = TestResult::new(
            "calc::TestCalc::test_add",
            TestStatus::Failed,
            Duration::from_millis(250),
        );
        result.captured_stderr = "E   assert 4 == 5".to_string();

        let prompt =
            build_prompt(&case(), Some(&result), "def test_add(self):\n    assert 1").unwrap();
        assert!(prompt.contains("- ID: calc::TestCalc::test_add"));
        assert!(prompt.contains("- Class: TestCalc"));
        assert!(prompt.contains("- Status: failed"));
        assert!(prompt.contains("- Duration: 0.25s"));
        assert!(prompt.contains("- Coverage: N/A"));
        assert!(prompt.contains("E   assert 4 == 5"));
        assert!(prompt.contains("def test_add(self):"));
    }

    #[test]
    fn test_prompt_without_result() {
        let prompt = build_prompt(&case(), None, "def test_add(self):\n    pass").unwrap();
        assert!(prompt.contains("has not been run"));
        assert!(prompt.contains("def test_add(self):"));
        assert!(!prompt.contains("- Status:"));
        assert!(prompt.contains("Coverage Gaps:"));
    }

    #[test]
    fn test_generate_url_keeps_base_path() {
        let analyzer = RemoteAnalyzer::new(
            "http://localhost:11434/ollama",
            "llama3",
            Duration::from_secs(5),
            LocalAnalyzer::default(),
        )
        .unwrap();
        assert_eq!(
            analyzer.generate_url().as_str(),
            "http://localhost:11434/ollama/api/generate"
        );
    }
}
