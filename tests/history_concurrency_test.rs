use chrono::Utc;
use radar::history::{HistoryEntry, HistoryStorage, RunSummary};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn create_dummy_entry(id: String) -> HistoryEntry {
    HistoryEntry {
        id,
        timestamp: Utc::now(),
        paths: vec!["tests".to_string()],
        summary: RunSummary {
            total: 4,
            passed: 3,
            failed: 1,
            errored: 0,
            skipped: 0,
            timed_out: 0,
            duration_secs: 1.5,
            coverage: Some(75.0),
            cancelled: false,
        },
    }
}

#[test]
fn test_concurrent_writes() {
    let temp_dir = TempDir::new().unwrap();
    let history_file = Arc::new(temp_dir.path().join("history.jsonl"));

    let thread_count = 10;
    let entries_per_thread = 50;

    // 每个线程使用独立的 storage，模拟多个进程
    let handles: Vec<_> = (0..thread_count)
        .map(|i| {
            let path = Arc::clone(&history_file);
            thread::spawn(move || {
                let storage = HistoryStorage::new_with_path((*path).clone());
                for j in 0..entries_per_thread {
                    storage.append(&create_dummy_entry(format!("{i}-{j}"))).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let storage = HistoryStorage::new_with_path((*history_file).clone());
    let entries = storage.list().unwrap();
    assert_eq!(entries.len(), thread_count * entries_per_thread);

    // 没有行被交错写坏
    let ids: HashSet<_> = entries.iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids.len(), thread_count * entries_per_thread);
}
