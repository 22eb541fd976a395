//! 基于 [`CredentialRepository`] 的凭据业务规则。

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::repository::{CredentialRepository, RepositoryError};
use crate::storage::{FileStore, UploadError};
use crate::user::{
    UserAuth, UserRole, hash_password, valid_password, valid_user_and_password, valid_username,
    verify_password,
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username invalid")]
    InvalidUsername,

    #[error("password invalid")]
    InvalidPassword,

    #[error("username or password are invalid")]
    InvalidUsernameOrPassword,

    #[error("username already exist")]
    DuplicatedUsername,

    #[error("user not found")]
    NotFound,

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("repository error: {0}")]
    Repository(RepositoryError),

    #[error("failed to remove user files: {0}")]
    Files(#[from] UploadError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<RepositoryError> for AuthError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => AuthError::NotFound,
            RepositoryError::AlreadyExists => AuthError::DuplicatedUsername,
            other => AuthError::Repository(other),
        }
    }
}

pub struct CredentialManager {
    repository: Arc<dyn CredentialRepository>,
    files: Arc<FileStore>,
    hash_cost: u32,
}

impl CredentialManager {
    pub fn new(
        repository: Arc<dyn CredentialRepository>,
        files: Arc<FileStore>,
        hash_cost: u32,
    ) -> Self {
        Self {
            repository,
            files,
            hash_cost,
        }
    }

    /// 查询格式合法的用户名对应的存储记录。
    pub async fn has_username(&self, username: &str) -> Result<UserAuth, AuthError> {
        if !valid_username(username) {
            return Err(AuthError::InvalidUsername);
        }
        Ok(self.repository.read(username).await?)
    }

    /// 注册新用户。唯一性同时由仓库的独占创建保证。
    pub async fn add(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if !valid_username(username) {
            return Err(AuthError::InvalidUsername);
        }
        match self.has_username(username).await {
            Ok(_) => return Err(AuthError::DuplicatedUsername),
            Err(AuthError::NotFound) => {}
            Err(err) => return Err(err),
        }

        let password_hash = self.hash(password).await?;
        self.repository
            .create(&UserAuth {
                username: username.to_string(),
                password_hash,
                is_admin: false,
            })
            .await?;
        info!(username, "user added");
        Ok(())
    }

    pub async fn change_password(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if !valid_user_and_password(username, password) {
            return Err(AuthError::InvalidUsernameOrPassword);
        }
        let mut user = self.has_username(username).await?;
        user.password_hash = self.hash(password).await?;
        self.repository.update(&user).await?;
        info!(username, "password changed");
        Ok(())
    }

    /// 删除凭据记录及该用户的全部上传文件。
    pub async fn delete(&self, username: &str) -> Result<(), AuthError> {
        self.has_username(username).await?;
        match self.repository.delete(username).await {
            Ok(()) | Err(RepositoryError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
        self.files.remove_user_dir(username).await?;
        info!(username, "user deleted");
        Ok(())
    }

    /// 仅当用户存在且哈希与 `password` 匹配时返回 `Ok(true)`。
    pub async fn check_password(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        if !valid_user_and_password(username, password) {
            return Err(AuthError::InvalidUsernameOrPassword);
        }
        let user = self.repository.read(username).await?;
        let password = password.to_string();
        let valid =
            tokio::task::spawn_blocking(move || verify_password(&password, &user.password_hash))
                .await??;
        if !valid {
            debug!(username, "password mismatch");
        }
        Ok(valid)
    }

    pub async fn list(&self) -> Result<Vec<UserRole>, AuthError> {
        let users = self.repository.list().await?;
        Ok(users.into_iter().map(UserRole::from).collect())
    }

    pub async fn set_administrator_permits(
        &self,
        username: &str,
        is_admin: bool,
    ) -> Result<(), AuthError> {
        let mut user = self.has_username(username).await?;
        user.is_admin = is_admin;
        self.repository.update(&user).await?;
        info!(username, is_admin, "role changed");
        Ok(())
    }

    pub async fn is_admin(&self, username: &str) -> Result<bool, AuthError> {
        Ok(self.has_username(username).await?.is_admin)
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        if !valid_password(password) {
            return Err(AuthError::InvalidPassword);
        }
        let password = password.to_string();
        let cost = self.hash_cost;
        Ok(tokio::task::spawn_blocking(move || hash_password(&password, cost)).await??)
    }
}
