use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// 按用例 ID 排序的结果表
pub type ResultMap = BTreeMap<String, TestResult>;

/// 用例的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
    TimedOut,
}

impl TestStatus {
    /// 是否算作失败（影响退出码）
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TestStatus::Failed | TestStatus::Errored | TestStatus::TimedOut
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Errored => "errored",
            TestStatus::Skipped => "skipped",
            TestStatus::TimedOut => "timed out",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个用例执行一次的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// 对应的用例 ID
    pub test_id: String,

    pub status: TestStatus,

    /// 执行耗时，超时时恰好等于配置的超时时间
    #[serde(with = "duration_secs")]
    pub duration: Duration,

    pub captured_stdout: String,
    pub captured_stderr: String,

    /// 覆盖率百分比（0-100）
    pub coverage_percentage: Option<f64>,

    /// 失败摘要（第一条断言信息）
    pub failure_summary: Option<String>,

    /// 失败类型，例如 AssertionError
    pub failure_kind: Option<String>,

    /// 完整的失败信息块
    pub failure_detail: Option<String>,

    /// runner 的原始退出码，被信号终止或未启动时为空
    pub exit_code: Option<i32>,
}

impl TestResult {
    pub fn new(test_id: impl Into<String>, status: TestStatus, duration: Duration) -> Self {
        Self {
            test_id: test_id.into(),
            status,
            duration,
            captured_stdout: String::new(),
            captured_stderr: String::new(),
            coverage_percentage: None,
            failure_summary: None,
            failure_kind: None,
            failure_detail: None,
            exit_code: None,
        }
    }

    /// 未能正常执行的用例（启动失败、冲突、任务 panic）
    pub fn errored(
        test_id: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let mut result = Self::new(test_id, TestStatus::Errored, duration);
        result.failure_kind = Some(kind.into());
        result.failure_summary = Some(message.into());
        result
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

/// 单个用例范围内的执行错误，批量执行时会被转换为 Errored 结果
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to launch runner '{runner}' for {test_id}: {source}")]
    Launch {
        test_id: String,
        runner: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Test {0} is already running")]
    Conflict(String),

    #[error("Failed to wait for runner of {test_id}: {source}")]
    Wait {
        test_id: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutionError {
    /// 写入结果的错误类型名
    pub fn kind(&self) -> String {
        match self {
            ExecutionError::Launch { source, .. } | ExecutionError::Wait { source, .. } => {
                format!("{:?}", source.kind())
            }
            ExecutionError::Conflict(_) => "Conflict".to_string(),
        }
    }
}

/// 整批执行被取消，携带已完成部分的结果
#[derive(Debug, thiserror::Error)]
#[error("Batch cancelled after {} of the submitted tests finished", partial.len())]
pub struct BatchCancelled {
    pub partial: ResultMap,
}

/// 以秒（浮点）序列化 Duration
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
