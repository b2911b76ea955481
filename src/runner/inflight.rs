use crate::runner::types::ExecutionError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// 正在执行的用例 ID 集合，防止同一用例被并发启动两次
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    running: Mutex<HashSet<String>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记用例，已在执行中时返回 Conflict
    ///
    /// 返回的 guard 被 drop 时自动注销。
    pub fn acquire(self: &Arc<Self>, test_id: &str) -> Result<InFlightGuard, ExecutionError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(test_id.to_string()) {
            return Err(ExecutionError::Conflict(test_id.to_string()));
        }
        Ok(InFlightGuard {
            registry: Arc::clone(self),
            test_id: test_id.to_string(),
        })
    }

    pub fn is_running(&self, test_id: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(test_id)
    }

    pub fn len(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, test_id: &str) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(test_id);
    }
}

/// 用例处于 Running 状态的凭证
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    test_id: String,
}

impl InFlightGuard {
    pub fn test_id(&self) -> &str {
        &self.test_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(&self.test_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_conflicts() {
        let registry = Arc::new(InFlightRegistry::new());
        let guard = registry.acquire("calc::test_add").unwrap();
        assert!(registry.is_running("calc::test_add"));

        let err = registry.acquire("calc::test_add").unwrap_err();
        assert!(matches!(err, ExecutionError::Conflict(id) if id == "calc::test_add"));

        // 其他用例不受影响
        let other = registry.acquire("calc::test_sub").unwrap();
        assert_eq!(registry.len(), 2);

        drop(guard);
        drop(other);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_allows_rerun() {
        let registry = Arc::new(InFlightRegistry::new());
        {
            let guard = registry.acquire("a::test_x").unwrap();
            assert_eq!(guard.test_id(), "a::test_x");
        }
        assert!(!registry.is_running("a::test_x"));
        assert!(registry.acquire("a::test_x").is_ok());
    }

    #[test]
    fn test_concurrent_acquire_exactly_one_wins() {
        let registry = Arc::new(InFlightRegistry::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // 持有 guard 直到所有线程都尝试过
                    let guard = registry.acquire("a::test_x").ok();
                    let won = guard.is_some();
                    std::thread::sleep(std::time::Duration::from_millis(200));
                    won
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
