//! 进程内按键划分的锁，串行化对同一上传的写入。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;

/// 以 `(username, filename)` 为键的异步互斥锁。
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 最多等待 `timeout` 获取文件锁，超时返回 `Err`。
    pub async fn lock_file_with_timeout(
        &self,
        username: &str,
        filename: &str,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, ()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry((username.to_string(), filename.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| ())
    }

    /// 清理无人持有或等待的条目，返回清理数量。
    pub async fn prune_idle(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
