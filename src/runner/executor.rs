use crate::config::{ConfigError, TestConfig};
use crate::runner::cancel::BatchCancel;
use crate::runner::extract::{extract_coverage, extract_failure};
use crate::runner::inflight::InFlightRegistry;
use crate::runner::process::{self, Ending, ProcessOutput};
use crate::runner::types::{BatchCancelled, ExecutionError, ResultMap, TestResult, TestStatus};
use crate::scanner::TestCase;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// 单个用例的执行结局
#[derive(Debug)]
enum CaseOutcome {
    Finished(TestResult),
    Cancelled,
}

/// 用例执行器
///
/// 每个用例在独立子进程中执行，最多 N 个同时运行。可克隆，所有副本共享
/// 同一个在途用例表。
#[derive(Debug, Clone)]
pub struct TestExecutor {
    config: Arc<TestConfig>,
    in_flight: Arc<InFlightRegistry>,
}

impl TestExecutor {
    pub fn new(config: TestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            in_flight: Arc::new(InFlightRegistry::new()),
        })
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// 用例是否正在执行
    pub fn is_running(&self, test_id: &str) -> bool {
        self.in_flight.is_running(test_id)
    }

    /// 批量执行，返回每个用例恰好一条结果
    pub async fn run(&self, cases: &[TestCase]) -> ResultMap {
        match self.run_cancellable(cases, &BatchCancel::new()).await {
            Ok(results) => results,
            Err(cancelled) => cancelled.partial,
        }
    }

    /// 可取消的批量执行
    ///
    /// 取消后 worker 不再领取新用例，正在执行的子进程被终止并回收，
    /// 返回已完成部分的结果。
    pub async fn run_cancellable(
        &self,
        cases: &[TestCase],
        cancel: &BatchCancel,
    ) -> Result<ResultMap, BatchCancelled> {
        let executor = self.clone();
        run_batch(
            cases,
            self.config.effective_concurrency(),
            cancel,
            move |case, cancel| {
                let executor = executor.clone();
                async move { executor.attempt(&case, &cancel).await }
            },
        )
        .await
    }

    /// 执行单个用例；同一用例已在执行中时返回 Conflict
    pub async fn execute(&self, case: &TestCase) -> Result<TestResult, ExecutionError> {
        let start = Instant::now();
        match self.attempt(case, &BatchCancel::new()).await? {
            CaseOutcome::Finished(result) => Ok(result),
            // 新建的取消信号不会被触发
            CaseOutcome::Cancelled => Ok(TestResult::errored(
                case.id.clone(),
                "Cancelled",
                "Execution was cancelled",
                start.elapsed(),
            )),
        }
    }

    async fn attempt(
        &self,
        case: &TestCase,
        cancel: &BatchCancel,
    ) -> Result<CaseOutcome, ExecutionError> {
        let _guard = self.in_flight.acquire(&case.id)?;
        debug!(test_id = %case.id, "Starting test");

        let output = process::run_process(&self.config, case, cancel).await?;
        if output.ending == Ending::Cancelled {
            debug!(test_id = %case.id, "Test cancelled");
            return Ok(CaseOutcome::Cancelled);
        }

        let result = build_result(&self.config, &case.id, output);
        info!(
            test_id = %result.test_id,
            status = %result.status,
            "Finished in {:.3}s",
            result.duration.as_secs_f64()
        );
        Ok(CaseOutcome::Finished(result))
    }
}

/// 由 N 个 worker 从共享队列领取用例，`run_one` 执行单个用例
async fn run_batch<F, Fut>(
    cases: &[TestCase],
    width: usize,
    cancel: &BatchCancel,
    run_one: F,
) -> Result<ResultMap, BatchCancelled>
where
    F: Fn(TestCase, BatchCancel) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<CaseOutcome, ExecutionError>> + Send + 'static,
{
    let mut seen = HashSet::new();
    let mut pending = VecDeque::with_capacity(cases.len());
    for case in cases {
        if seen.insert(case.id.as_str()) {
            pending.push_back(case.clone());
        } else {
            error!(
                test_id = %case.id,
                file = %case.location.file.display(),
                "Duplicate test id in batch, only the first case with this id runs"
            );
        }
    }

    let total = pending.len();
    if total == 0 {
        return Ok(ResultMap::new());
    }

    let workers = width.min(total).max(1);
    info!("Running {} tests with {} workers", total, workers);

    let pending = Arc::new(Mutex::new(pending));
    let results = Arc::new(Mutex::new(ResultMap::new()));

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let pending = Arc::clone(&pending);
        let results = Arc::clone(&results);
        let cancel = cancel.clone();
        let run_one = run_one.clone();
        set.spawn(async move {
            worker_loop(worker, pending, results, cancel, run_one).await;
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            error!("Worker task failed: {}", e);
        }
    }

    let mut results =
        std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
    if cancel.is_cancelled() {
        warn!("Batch cancelled, {} of {} tests finished", results.len(), total);
        return Err(BatchCancelled { partial: results });
    }

    // worker 异常退出时补齐缺失的结果
    for case in cases {
        if !results.contains_key(&case.id) {
            results.insert(
                case.id.clone(),
                TestResult::errored(
                    case.id.clone(),
                    "WorkerFailure",
                    "Worker stopped before running this test",
                    Duration::ZERO,
                ),
            );
        }
    }
    Ok(results)
}

async fn worker_loop<F, Fut>(
    worker: usize,
    pending: Arc<Mutex<VecDeque<TestCase>>>,
    results: Arc<Mutex<ResultMap>>,
    cancel: BatchCancel,
    run_one: F,
) where
    F: Fn(TestCase, BatchCancel) -> Fut,
    Fut: Future<Output = Result<CaseOutcome, ExecutionError>> + Send + 'static,
{
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let next = pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(case) = next else {
            break;
        };

        debug!(worker, test_id = %case.id, "Picked up test");
        let test_id = case.id.clone();
        match contained(test_id, run_one(case, cancel.clone())).await {
            Some(result) => {
                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(result.test_id.clone(), result);
            }
            None => break,
        }
    }
}

/// 在独立任务中执行，任何错误或 panic 都转换为 Errored 结果；被取消时返回 None
async fn contained<Fut>(test_id: String, attempt: Fut) -> Option<TestResult>
where
    Fut: Future<Output = Result<CaseOutcome, ExecutionError>> + Send + 'static,
{
    let start = Instant::now();

    let mut task = JoinSet::new();
    task.spawn(attempt);

    match task.join_next().await {
        Some(Ok(Ok(CaseOutcome::Finished(result)))) => Some(result),
        Some(Ok(Ok(CaseOutcome::Cancelled))) => None,
        Some(Ok(Err(e))) => {
            warn!(test_id = %test_id, "{}", e);
            Some(TestResult::errored(
                test_id,
                e.kind(),
                e.to_string(),
                start.elapsed(),
            ))
        }
        Some(Err(e)) => {
            error!(test_id = %test_id, "Test task failed: {}", e);
            Some(TestResult::errored(
                test_id,
                join_error_kind(&e),
                e.to_string(),
                start.elapsed(),
            ))
        }
        None => Some(TestResult::errored(
            test_id,
            "WorkerFailure",
            "Test task vanished",
            start.elapsed(),
        )),
    }
}

fn join_error_kind(e: &JoinError) -> &'static str {
    if e.is_panic() { "Panic" } else { "Cancelled" }
}

/// 退出码到状态的映射
pub(crate) fn classify(config: &TestConfig, exit_code: Option<i32>) -> TestStatus {
    match exit_code {
        Some(0) => TestStatus::Passed,
        Some(1) => TestStatus::Failed,
        Some(code) if code == config.skip_exit_code => TestStatus::Skipped,
        _ => TestStatus::Errored,
    }
}

/// 由子进程输出构造结果
pub(crate) fn build_result(config: &TestConfig, test_id: &str, output: ProcessOutput) -> TestResult {
    let (status, duration, exit_code) = match output.ending {
        Ending::TimedOut => (TestStatus::TimedOut, config.timeout_duration(), None),
        Ending::Exited(code) => (classify(config, code), output.elapsed, code),
        Ending::Cancelled => (TestStatus::Errored, output.elapsed, None),
    };

    let mut result = TestResult::new(test_id, status, duration);
    result.exit_code = exit_code;
    result.coverage_percentage = extract_coverage(&output.stdout);

    if matches!(status, TestStatus::Failed | TestStatus::Errored) {
        let failure = extract_failure(&output.stderr);
        result.failure_summary = failure.summary;
        result.failure_kind = failure.kind;
        result.failure_detail = failure.detail;

        if exit_code.is_none() && result.failure_summary.is_none() {
            result.failure_kind = Some("Signal".to_string());
            result.failure_summary = Some("Runner was terminated by a signal".to_string());
        }
    }

    result.captured_stdout = output.stdout;
    result.captured_stderr = output.stderr;
    result
}
