use crate::history::model::{HistoryEntry, RunSummary};
use crate::history::storage::HistoryStorage;
use crate::report::Report;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

/// 记录一次运行
///
/// 这是一个 Best-effort 操作，如果写入失败会打印警告，但不会返回错误。
pub fn record_run(storage: &HistoryStorage, paths: &[String], report: &Report) -> Option<String> {
    let entry = HistoryEntry {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        paths: paths.to_vec(),
        summary: RunSummary::from_report(report),
    };

    match storage.append(&entry) {
        Ok(()) => Some(entry.id),
        Err(e) => {
            warn!("Failed to save run history: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report() -> Report {
        Report {
            total_tests: 3,
            passed: 2,
            failed: 1,
            total_duration: 1.25,
            average_duration: 1.25 / 3.0,
            aggregate_coverage: Some(88.0),
            ..Report::default()
        }
    }

    #[test]
    fn test_record_run() {
        let temp_dir = TempDir::new().unwrap();
        let storage = HistoryStorage::new_with_path(temp_dir.path().join("history.jsonl"));

        let id = record_run(&storage, &["tests".to_string()], &report()).unwrap();

        let entries = storage.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].paths, vec!["tests"]);
        assert_eq!(entries[0].summary.failed, 1);
        assert!(!entries[0].summary.is_success());
    }

    #[test]
    fn test_record_failure_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let storage = HistoryStorage::new_with_path(blocker.join("history.jsonl"));

        assert!(record_run(&storage, &[], &report()).is_none());
    }
}
