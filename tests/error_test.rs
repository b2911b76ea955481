use radar::config::ConfigError;
use radar::runner::{BatchCancelled, ExecutionError, ResultMap};
use radar::scanner::ScanError;
use radar::{RadarError, Result};
use std::path::PathBuf;

#[test]
fn test_config_error() {
    let err: RadarError = ConfigError::InvalidTimeout(-1.0).into();
    assert_eq!(
        err.to_string(),
        "配置错误: Invalid timeout: -1 (must be a positive number of seconds)"
    );
}

#[test]
fn test_scan_error() {
    let err: RadarError = ScanError::MissingRoot(PathBuf::from("nowhere")).into();
    assert_eq!(err.to_string(), "扫描错误: Scan root does not exist: nowhere");
}

#[test]
fn test_execution_error() {
    let err: RadarError = ExecutionError::Conflict("calc::test_add".to_string()).into();
    assert_eq!(err.to_string(), "执行错误: Test calc::test_add is already running");
}

#[test]
fn test_cancelled_carries_partial_results() {
    let err: RadarError = BatchCancelled {
        partial: ResultMap::new(),
    }
    .into();
    match err {
        RadarError::Cancelled(cancelled) => assert!(cancelled.partial.is_empty()),
        other => panic!("Expected Cancelled, got {other:?}"),
    }
}

#[test]
fn test_error_conversion_from_anyhow() {
    let anyhow_err = anyhow::anyhow!("test anyhow error");
    let radar_err: RadarError = anyhow_err.into();
    assert!(radar_err.to_string().contains("test anyhow error"));
}

#[test]
fn test_result_type() {
    fn returns_error() -> Result<()> {
        Err(RadarError::Other("test".to_string()))
    }

    match returns_error() {
        Err(RadarError::Other(msg)) => assert_eq!(msg, "test"),
        _ => panic!("Expected Other"),
    }
}
