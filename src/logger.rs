use tracing_subscriber::{EnvFilter, fmt};

/// 初始化日志系统
///
/// RUST_LOG 环境变量优先，其次是传入的级别（通常来自 radar.toml 的 log_level）
///
/// 示例:
/// - RUST_LOG=debug radar run tests/
/// - RUST_LOG=radar::runner=trace radar run tests/
pub fn init_logger(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // 重复初始化（例如测试中）直接忽略
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!("Logger initialized");
}
