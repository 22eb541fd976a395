//! 每个用户一个目录的凭据后端：`{root}/{username}/.credentials`。

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::atomic::{write_atomic, write_new};
use crate::repository::{CredentialRepository, RepositoryError};
use crate::user::UserAuth;

pub const CREDENTIALS_FILE: &str = ".credentials";

#[derive(Clone, Debug)]
pub struct FsCredentialRepository {
    root: PathBuf,
}

impl FsCredentialRepository {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn user_dir(&self, username: &str) -> PathBuf {
        self.root.join(username)
    }

    fn credentials_path(&self, username: &str) -> PathBuf {
        self.user_dir(username).join(CREDENTIALS_FILE)
    }

    async fn has_credentials(&self, username: &str) -> bool {
        fs::metadata(self.credentials_path(username))
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CredentialRepository for FsCredentialRepository {
    async fn create(&self, user: &UserAuth) -> Result<(), RepositoryError> {
        let dir = self.user_dir(&user.username);
        fs::create_dir_all(&dir).await?;

        let path = self.credentials_path(&user.username);
        let contents = serde_json::to_vec_pretty(user)?;
        match write_new(&path, &contents).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(RepositoryError::AlreadyExists);
            }
            Err(err) => return Err(err.into()),
        }
        debug!(username = user.username, "credentials created");
        Ok(())
    }

    async fn read(&self, username: &str) -> Result<UserAuth, RepositoryError> {
        let path = self.credentials_path(username);
        debug!(username, path = ?path, "reading credentials");
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(RepositoryError::NotFound),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice::<UserAuth>(&raw) {
            Ok(auth) if auth.is_complete() => Ok(auth),
            Ok(_) | Err(_) => {
                debug!(username, "credentials file is malformed");
                Err(RepositoryError::NotFound)
            }
        }
    }

    async fn update(&self, user: &UserAuth) -> Result<(), RepositoryError> {
        let contents = serde_json::to_vec_pretty(user)?;
        write_atomic(&self.credentials_path(&user.username), &contents).await?;
        debug!(username = user.username, "credentials updated");
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), RepositoryError> {
        let dir = self.user_dir(username);
        debug!(username, path = ?dir, "deleting user directory");
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(RepositoryError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> Result<Vec<UserAuth>, RepositoryError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut usernames = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.has_credentials(&name).await {
                usernames.push(name);
            }
        }
        usernames.sort();

        let mut users = Vec::with_capacity(usernames.len());
        for username in usernames {
            users.push(self.read(&username).await?);
        }
        Ok(users)
    }
}
