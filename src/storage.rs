//! 按用户划分的上传存储，分为未关闭（`.part`）与已关闭两种形态。
//!
//! 上传在接收追加数据期间位于 `{root}/{username}/{filename}.part`，
//! 关闭时仅重命名一次为 `{root}/{username}/{filename}`。
//! 已关闭文件优先于残留的同名 `.part` 文件。

use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::debug;

use crate::config::DEFAULT_LOCK_WAIT_TIMEOUT_SECS;
use crate::locking::LockManager;

pub const PART_SUFFIX: &str = ".part";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid file name")]
    InvalidFileName,

    #[error("appending on closed file")]
    AppendToClosed,

    #[error("file not found")]
    FileNotFound,

    #[error("file already closed")]
    AlreadyClosed,

    #[error("file is busy")]
    Busy,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// 上传文件当前在磁盘上的形态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub closed: bool,
    /// 尚未写入任何数据时为 `None`。
    pub size: Option<u64>,
}

impl LocalFile {
    pub fn exists(&self) -> bool {
        self.size.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
}

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    locks: LockManager,
    lock_timeout: Duration,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            locks: LockManager::new(),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS),
        }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    fn user_dir(&self, username: &str) -> Result<PathBuf, UploadError> {
        let mut components = Path::new(username).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(username)),
            _ => Err(UploadError::InvalidFileName),
        }
    }

    fn full_path(&self, username: &str, filename: &str) -> Result<PathBuf, UploadError> {
        validate_file_name(filename)?;
        Ok(self.user_dir(username)?.join(filename))
    }

    async fn probe(path: PathBuf, closed: bool) -> Result<LocalFile, UploadError> {
        let size = match fs::symlink_metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Some(metadata.len()),
            Ok(_) => return Err(UploadError::InvalidFileName),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        Ok(LocalFile { path, closed, size })
    }

    /// 先解析已关闭路径，再解析现有或将来的 `.part` 路径。
    pub async fn local_file(
        &self,
        username: &str,
        filename: &str,
    ) -> Result<LocalFile, UploadError> {
        let closed_path = self.full_path(username, filename)?;
        let closed = Self::probe(closed_path, true).await?;
        if closed.exists() {
            return Ok(closed);
        }
        let part_path = self
            .full_path(username, filename)?
            .with_file_name(part_name(filename));
        Self::probe(part_path, false).await
    }

    pub async fn file_info(
        &self,
        username: &str,
        filename: &str,
    ) -> Result<FileInfo, UploadError> {
        let file = self.local_file(username, filename).await?;
        Ok(FileInfo {
            size: file.size.unwrap_or(0),
        })
    }

    /// 将读取器内容全部追加到未关闭文件，必要时创建。
    /// 返回本次写入的字节数。
    pub async fn append_file<R>(
        &self,
        username: &str,
        filename: &str,
        reader: &mut R,
    ) -> Result<u64, UploadError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let _guard = self.lock(username, filename).await?;
        let local = self.local_file(username, filename).await?;
        if local.closed {
            return Err(UploadError::AppendToClosed);
        }

        fs::create_dir_all(self.user_dir(username)?).await?;
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o644);
        let mut file = options.open(&local.path).await?;

        let copied = tokio::io::copy(reader, &mut file).await;
        file.flush().await?;
        let copied = copied?;
        debug!(username, filename, bytes = copied, "appended to open file");
        Ok(copied)
    }

    /// 将 `.part` 文件重命名为最终名称，这是唯一的 未关闭 -> 已关闭 转换。
    pub async fn close_file(&self, username: &str, filename: &str) -> Result<(), UploadError> {
        let _guard = self.lock(username, filename).await?;
        let local = self.local_file(username, filename).await?;
        if !local.exists() {
            return Err(UploadError::FileNotFound);
        }
        if local.closed {
            return Err(UploadError::AlreadyClosed);
        }
        let target = self.full_path(username, filename)?;
        fs::rename(&local.path, &target).await?;
        debug!(username, filename, "file closed");
        Ok(())
    }

    /// 删除用户的全部上传文件；用户没有文件不视为错误。
    pub async fn remove_user_dir(&self, username: &str) -> Result<(), UploadError> {
        match fs::remove_dir_all(self.user_dir(username)?).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn lock(
        &self,
        username: &str,
        filename: &str,
    ) -> Result<tokio::sync::OwnedMutexGuard<()>, UploadError> {
        self.locks
            .lock_file_with_timeout(username, filename, self.lock_timeout)
            .await
            .map_err(|_| UploadError::Busy)
    }
}

fn part_name(filename: &str) -> String {
    format!("{filename}{PART_SUFFIX}")
}

/// 只接受单个普通路径组件，且不能是隐藏文件或 `.part` 名称。
pub fn validate_file_name(filename: &str) -> Result<(), UploadError> {
    if filename.is_empty()
        || filename.starts_with('.')
        // `x.part` 会与 `x` 的未关闭上传重名。
        || filename.ends_with(PART_SUFFIX)
        || filename.contains(['/', '\\', '\0'])
    {
        return Err(UploadError::InvalidFileName);
    }
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(UploadError::InvalidFileName),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (tempfile::TempDir, FileStore) {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::new(temp.path().join("files"));
        (temp, store)
    }

    async fn append(store: &FileStore, name: &str, bytes: &[u8]) -> Result<u64, UploadError> {
        let mut reader = bytes;
        store.append_file("alice", name, &mut reader).await
    }

    #[tokio::test]
    async fn unknown_file_is_empty_and_open() {
        let (_temp, store) = make_store();
        let info = store.file_info("alice", "new.bin").await.expect("info");
        assert_eq!(info.size, 0);

        let local = store.local_file("alice", "new.bin").await.expect("local");
        assert!(!local.closed);
        assert!(!local.exists());
        assert!(local.path.ends_with("alice/new.bin.part"));
    }

    #[tokio::test]
    async fn lifecycle_append_close_and_reject() {
        let (_temp, store) = make_store();

        assert_eq!(append(&store, "report.txt", b"hello ").await.expect("append"), 6);
        assert_eq!(store.file_info("alice", "report.txt").await.expect("info").size, 6);
        append(&store, "report.txt", b"world").await.expect("append");
        assert_eq!(store.file_info("alice", "report.txt").await.expect("info").size, 11);

        store.close_file("alice", "report.txt").await.expect("close");
        let closed = store.local_file("alice", "report.txt").await.expect("local");
        assert!(closed.closed);
        assert!(!store.root_path().join("alice/report.txt.part").exists());

        assert!(matches!(
            append(&store, "report.txt", b"more").await,
            Err(UploadError::AppendToClosed)
        ));
        assert_eq!(store.file_info("alice", "report.txt").await.expect("info").size, 11);
        assert!(matches!(
            store.close_file("alice", "report.txt").await,
            Err(UploadError::AlreadyClosed)
        ));

        let contents = fs::read(store.root_path().join("alice/report.txt"))
            .await
            .expect("read closed file");
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn closing_missing_file_fails() {
        let (_temp, store) = make_store();
        assert!(matches!(
            store.close_file("alice", "ghost.bin").await,
            Err(UploadError::FileNotFound)
        ));
    }

    #[tokio::test]
    async fn closed_file_wins_over_stale_part() {
        let (_temp, store) = make_store();
        let dir = store.root_path().join("alice");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("a.bin"), b"final").expect("write closed");
        std::fs::write(dir.join("a.bin.part"), b"stale-bytes").expect("write part");

        let local = store.local_file("alice", "a.bin").await.expect("local");
        assert!(local.closed);
        assert_eq!(local.size, Some(5));
    }

    #[tokio::test]
    async fn rejects_unsafe_names() {
        let (_temp, store) = make_store();
        for name in ["", ".credentials", "..", "a/b", "x.part", "../escape"] {
            assert!(
                matches!(
                    store.file_info("alice", name).await,
                    Err(UploadError::InvalidFileName)
                ),
                "{name} should be rejected"
            );
        }
        assert!(matches!(
            append(&store, ".hidden", b"x").await,
            Err(UploadError::InvalidFileName)
        ));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let (_temp, store) = make_store();
        append(&store, "shared.txt", b"abc").await.expect("append");
        assert_eq!(store.file_info("bob", "shared.txt").await.expect("info").size, 0);
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let (_temp, store) = make_store();
        let store = std::sync::Arc::new(store);
        let first = vec![b'a'; 256 * 1024];
        let second = vec![b'b'; 256 * 1024];

        let (left, right) = tokio::join!(
            {
                let store = store.clone();
                let data = first.clone();
                async move { store.append_file("alice", "big.bin", &mut data.as_slice()).await }
            },
            {
                let store = store.clone();
                let data = second.clone();
                async move { store.append_file("alice", "big.bin", &mut data.as_slice()).await }
            }
        );
        left.expect("left append");
        right.expect("right append");

        let contents = fs::read(store.root_path().join("alice/big.bin.part"))
            .await
            .expect("read part");
        assert_eq!(contents.len(), first.len() + second.len());
        let head = contents[0];
        let split = first.len();
        assert!(contents[..split].iter().all(|b| *b == head));
        assert!(contents[split..].iter().all(|b| *b != head));
    }

    #[tokio::test]
    async fn remove_user_dir_tolerates_missing() {
        let (_temp, store) = make_store();
        store.remove_user_dir("nobody").await.expect("missing dir");
        append(&store, "f.txt", b"x").await.expect("append");
        store.remove_user_dir("alice").await.expect("remove");
        assert!(!store.root_path().join("alice").exists());
    }
}
