//! 内存上传锁的定期清理任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::LOCK_PRUNE_INTERVAL_SECS;
use crate::storage::FileStore;

/// 启动后台任务，清理无人写入的上传锁。
pub fn spawn_background_tasks(storage: Arc<FileStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(LOCK_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let pruned = storage.locks().prune_idle().await;
            if pruned > 0 {
                debug!(pruned, "pruned idle upload locks");
            }
        }
    });
}
