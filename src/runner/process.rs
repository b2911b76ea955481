use crate::config::TestConfig;
use crate::runner::cancel::BatchCancel;
use crate::runner::types::ExecutionError;
use crate::scanner::TestCase;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 子进程结束后等待输出管道读完的时间
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// 子进程的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ending {
    /// 正常退出；被信号终止时退出码为空
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
}

/// 一次 runner 调用的原始输出
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub ending: Ending,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// runner 的完整参数列表
pub(crate) fn runner_args(config: &TestConfig, case: &TestCase) -> Vec<String> {
    let mut args = config.runner_args.clone();
    args.push(case.selector());
    args.push(format!("--timeout={}", config.timeout));
    if config.coverage {
        args.push("--cov".to_string());
        args.push("--cov-report=term-missing".to_string());
    }
    args
}

/// 启动 runner 并等待其退出、超时或被取消
///
/// 超时与取消时子进程会被 kill 并回收，已经输出的内容保留。
pub(crate) async fn run_process(
    config: &TestConfig,
    case: &TestCase,
    cancel: &BatchCancel,
) -> Result<ProcessOutput, ExecutionError> {
    let args = runner_args(config, case);
    debug!(test_id = %case.id, runner = %config.runner, ?args, "Spawning runner");

    let start = Instant::now();
    let mut child = Command::new(&config.runner)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutionError::Launch {
            test_id: case.id.clone(),
            runner: config.runner.clone(),
            source,
        })?;

    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let readers = [
        child
            .stdout
            .take()
            .map(|pipe| spawn_reader(pipe, Arc::clone(&stdout_buf))),
        child
            .stderr
            .take()
            .map(|pipe| spawn_reader(pipe, Arc::clone(&stderr_buf))),
    ];

    let deadline = tokio::time::Instant::now() + config.timeout_duration();
    let ending = tokio::select! {
        waited = tokio::time::timeout_at(deadline, child.wait()) => match waited {
            Ok(Ok(status)) => Ending::Exited(status.code()),
            Ok(Err(source)) => {
                terminate(&mut child).await;
                return Err(ExecutionError::Wait {
                    test_id: case.id.clone(),
                    source,
                });
            }
            Err(_) => Ending::TimedOut,
        },
        _ = cancel.cancelled() => Ending::Cancelled,
    };

    if ending == Ending::TimedOut {
        warn!(test_id = %case.id, timeout = config.timeout, "Test timed out, killing runner");
    }
    if matches!(ending, Ending::TimedOut | Ending::Cancelled) {
        terminate(&mut child).await;
    }
    let elapsed = start.elapsed();

    for reader in readers.into_iter().flatten() {
        drain(reader).await;
    }

    Ok(ProcessOutput {
        ending,
        stdout: take_lossy(&stdout_buf),
        stderr: take_lossy(&stderr_buf),
        elapsed,
    })
}

fn spawn_reader<R>(mut pipe: R, buffer: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
            }
        }
    })
}

/// 等待读取任务结束；孙进程仍占用管道时放弃等待
async fn drain(mut reader: JoinHandle<()>) {
    if tokio::time::timeout(OUTPUT_GRACE, &mut reader).await.is_err() {
        reader.abort();
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Failed to kill runner: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap runner: {}", e);
    }
}

fn take_lossy(buffer: &Mutex<Vec<u8>>) -> String {
    let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::SourceLocation;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn case(scope: Option<&str>) -> TestCase {
        TestCase {
            id: "tests/test_calc::test_add".to_string(),
            name: "test_add".to_string(),
            location: SourceLocation {
                file: PathBuf::from("tests/test_calc.py"),
                line: 3,
            },
            scope: scope.map(String::from),
            description: None,
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn test_runner_args_with_coverage() {
        let config = TestConfig::default();
        let args = runner_args(&config, &case(Some("TestCalc")));
        assert_eq!(
            args,
            vec![
                "-m",
                "pytest",
                "-v",
                "--tb=short",
                "tests/test_calc.py::TestCalc::test_add",
                "--timeout=300",
                "--cov",
                "--cov-report=term-missing",
            ]
        );
    }

    #[test]
    fn test_runner_args_without_coverage() {
        let config = TestConfig {
            runner_args: Vec::new(),
            timeout: 2.5,
            coverage: false,
            ..TestConfig::default()
        };
        let args = runner_args(&config, &case(None));
        assert_eq!(args, vec!["tests/test_calc.py::test_add", "--timeout=2.5"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let config = TestConfig {
            runner: "/bin/sh".to_string(),
            runner_args: vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
            coverage: false,
            ..TestConfig::default()
        };

        let output = run_process(&config, &case(None), &BatchCancel::new())
            .await
            .unwrap();
        assert_eq!(output.ending, Ending::Exited(Some(3)));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_runner() {
        let config = TestConfig {
            runner: "/bin/sh".to_string(),
            runner_args: vec!["-c".to_string(), "echo started; sleep 5".to_string()],
            timeout: 0.3,
            coverage: false,
            ..TestConfig::default()
        };

        let started = Instant::now();
        let output = run_process(&config, &case(None), &BatchCancel::new())
            .await
            .unwrap();
        assert_eq!(output.ending, Ending::TimedOut);
        assert_eq!(output.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_missing_runner_is_launch_error() {
        let config = TestConfig {
            runner: "/definitely/not/a/runner".to_string(),
            ..TestConfig::default()
        };
        let err = run_process(&config, &case(None), &BatchCancel::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Launch { .. }));
        assert_eq!(err.kind(), "NotFound");
    }
}
