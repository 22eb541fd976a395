//! 凭据仓库接口与后端选择。

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Backend;
use crate::fs_repository::FsCredentialRepository;
use crate::kv_repository::KvCredentialRepository;
use crate::user::UserAuth;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("user not found")]
    NotFound,

    #[error("user already exists")]
    AlreadyExists,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::Error),
}

/// 每个用户名存储一条凭据记录。
///
/// `create` 是独占的：记录已存在时返回 [`RepositoryError::AlreadyExists`]，
/// 不会覆盖已有记录。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn create(&self, user: &UserAuth) -> Result<(), RepositoryError>;
    async fn read(&self, username: &str) -> Result<UserAuth, RepositoryError>;
    async fn update(&self, user: &UserAuth) -> Result<(), RepositoryError>;
    async fn delete(&self, username: &str) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<UserAuth>, RepositoryError>;
}

/// 打开命令行选择的后端。
pub fn open_repository(
    backend: Backend,
    files_root: &Path,
    db_path: &Path,
) -> Result<Arc<dyn CredentialRepository>, RepositoryError> {
    let repository: Arc<dyn CredentialRepository> = match backend {
        Backend::File => Arc::new(FsCredentialRepository::new(files_root.to_path_buf())),
        Backend::Kv => Arc::new(KvCredentialRepository::open(db_path)?),
    };
    Ok(repository)
}
