use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 配置错误，在任何用例执行之前就会被报告
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid timeout: {0} (must be a positive number of seconds)")]
    InvalidTimeout(f64),

    #[error("Runner executable must not be empty")]
    EmptyRunner,

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },

    #[error("Invalid analyzer endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("Path does not exist: {0}")]
    MissingPath(String),
}

/// 完整配置文件（radar.toml）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    /// 日志级别，RUST_LOG 优先
    pub log_level: String,

    /// `radar run --report` 使用相对路径时的输出目录
    pub report_dir: String,

    /// 运行历史目录
    pub history_dir: String,

    pub scanner: ScannerConfig,
    pub test: TestConfig,
    pub analyzer: AnalyzerConfig,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            report_dir: "reports".to_string(),
            history_dir: ".radar".to_string(),
            scanner: ScannerConfig::default(),
            test: TestConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

/// 用例发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// 目录扫描时匹配的文件名
    pub file_pattern: String,

    /// 逐段匹配的排除规则，`re:` 前缀表示正则
    pub exclude_patterns: Vec<String>,

    /// 用例函数名前缀
    pub case_prefix: String,

    /// 测试类名前缀
    pub scope_prefix: String,

    /// 继承后即视为测试类的基类名
    pub scope_bases: Vec<String>,

    /// 标记测试函数的装饰器（完整点分名称）
    pub case_decorators: Vec<String>,

    /// marker 装饰器的属性名
    pub marker_names: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            file_pattern: "test_*.py".to_string(),
            exclude_patterns: vec!["__pycache__".to_string(), ".pytest_cache".to_string()],
            case_prefix: "test_".to_string(),
            scope_prefix: "Test".to_string(),
            scope_bases: vec!["TestCase".to_string()],
            case_decorators: vec!["pytest".to_string()],
            marker_names: vec!["mark".to_string(), "marker".to_string()],
        }
    }
}

/// 用例执行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// 外部 runner 可执行文件
    pub runner: String,

    /// 放在用例选择器之前的参数
    pub runner_args: Vec<String>,

    /// 单个用例的超时时间（秒）
    pub timeout: f64,

    /// 并发数，0 表示按 CPU 数决定
    pub concurrency: usize,

    /// 是否请求覆盖率报告
    pub coverage: bool,

    /// runner 表示"跳过"的退出码
    pub skip_exit_code: i32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            runner: "python3".to_string(),
            runner_args: ["-m", "pytest", "-v", "--tb=short"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout: 300.0,
            concurrency: 0,
            coverage: true,
            skip_exit_code: 5,
        }
    }
}

impl TestConfig {
    /// 校验超时与 runner，失败时不应开始任何执行
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(ConfigError::InvalidTimeout(self.timeout));
        }
        if Duration::try_from_secs_f64(self.timeout).is_err() {
            return Err(ConfigError::InvalidTimeout(self.timeout));
        }
        if self.runner.trim().is_empty() {
            return Err(ConfigError::EmptyRunner);
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::ZERO)
    }

    /// 实际使用的并发数
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency > 0 {
            return self.concurrency;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// 分析器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub enabled: bool,

    /// 远程文本生成服务地址，为空时只做本地分析
    pub endpoint: Option<String>,

    pub model: String,

    /// 远程请求超时（秒）
    pub request_timeout: u64,

    /// 超过该耗时（秒）的用例会被标记为慢
    pub slow_threshold: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            model: "llama3".to_string(),
            request_timeout: 60,
            slow_threshold: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_test_config_is_valid() {
        let config = TestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout_duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_timeouts() {
        for timeout in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = TestConfig {
                timeout,
                ..TestConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidTimeout(_))
            ));
        }
    }

    #[test]
    fn test_empty_runner() {
        let config = TestConfig {
            runner: "  ".to_string(),
            ..TestConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyRunner)));
    }

    #[test]
    fn test_effective_concurrency() {
        let config = TestConfig {
            concurrency: 3,
            ..TestConfig::default()
        };
        assert_eq!(config.effective_concurrency(), 3);

        let auto = TestConfig::default();
        assert!(auto.effective_concurrency() >= 1);
    }
}
