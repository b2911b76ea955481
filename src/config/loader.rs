use crate::config::types::{ConfigError, RadarConfig};
use crate::scanner::ExcludePattern;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "radar.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<RadarConfig, ConfigError> {
        let display = path.as_ref().display().to_string();
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: display.clone(),
            message: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: display,
            message: e.to_string(),
        })
    }

    /// 加载配置并应用环境变量覆盖
    ///
    /// 查找顺序：
    /// 1. 显式传入的路径（不存在时报错）
    /// 2. 当前目录及其父目录
    /// 3. 用户配置目录 ~/.config/radar/
    /// 4. 默认配置
    pub fn load(explicit: Option<&Path>) -> Result<RadarConfig, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None => match Self::find_config_file() {
                Some(path) => {
                    debug!("Using config file {}", path.display());
                    Self::load_from_path(&path)?
                }
                None => RadarConfig::default(),
            },
        };

        Self::apply_overrides(&mut config, |key| std::env::var(key).ok())?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// 查找配置文件路径
    pub fn find_config_file() -> Option<PathBuf> {
        Self::find_in_ancestors().or_else(Self::find_in_user_dir)
    }

    fn find_in_ancestors() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            let config_path = current.join(Self::CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            // 尝试父目录
            if !current.pop() {
                break;
            }
        }

        None
    }

    fn find_in_user_dir() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let config_path = home.join(".config").join("radar").join(Self::CONFIG_FILE);
        config_path.exists().then_some(config_path)
    }

    /// 应用环境变量覆盖，`lookup` 通常是 `std::env::var`
    pub fn apply_overrides<F>(config: &mut RadarConfig, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidOverride {
                    key: key.to_string(),
                    value,
                })
        }

        if let Some(runner) = lookup("RADAR_RUNNER") {
            config.test.runner = runner;
        }
        if let Some(value) = lookup("RADAR_TIMEOUT") {
            config.test.timeout = parsed("RADAR_TIMEOUT", value)?;
        }
        if let Some(value) = lookup("RADAR_CONCURRENCY") {
            config.test.concurrency = parsed("RADAR_CONCURRENCY", value)?;
        }
        if let Some(value) = lookup("RADAR_COVERAGE") {
            config.test.coverage = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        key: "RADAR_COVERAGE".to_string(),
                        value,
                    });
                }
            };
        }
        if let Some(level) = lookup("RADAR_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(endpoint) = lookup("RADAR_ANALYZER_ENDPOINT") {
            config.analyzer.endpoint = Some(endpoint).filter(|e| !e.trim().is_empty());
        }
        Ok(())
    }

    /// 校验整个配置
    pub fn validate(config: &RadarConfig) -> Result<(), ConfigError> {
        config.test.validate()?;

        glob::Pattern::new(&config.scanner.file_pattern).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: config.scanner.file_pattern.clone(),
                message: e.to_string(),
            }
        })?;
        for pattern in &config.scanner.exclude_patterns {
            ExcludePattern::parse(pattern)?;
        }

        if let Some(endpoint) = &config.analyzer.endpoint {
            let url = url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidEndpoint {
                    endpoint: endpoint.clone(),
                    message: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
        }
        Ok(())
    }
}
