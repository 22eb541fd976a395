//! 基于 redb 的单文件键值凭据后端。
//!
//! 记录以 JSON 形式存放在同一张表中，键为用户名。所有 redb 调用
//! 均为同步操作，在阻塞线程池中执行。

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::repository::{CredentialRepository, RepositoryError};
use crate::user::UserAuth;

const CREDENTIALS: TableDefinition<&str, &str> = TableDefinition::new("credentials");

#[derive(Clone)]
pub struct KvCredentialRepository {
    db: Arc<Database>,
}

impl KvCredentialRepository {
    /// 创建或打开数据库文件，并确保表已存在。
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(redb::Error::from)?;
        let write_txn = db.begin_write().map_err(redb::Error::from)?;
        {
            let _ = write_txn.open_table(CREDENTIALS).map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn with_db<T, F>(&self, op: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, redb::Error> + Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|err| io::Error::other(err.to_string()))?;
        Ok(result?)
    }
}

fn get_raw(db: &Database, username: &str) -> Result<Option<String>, redb::Error> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(CREDENTIALS)?;
    Ok(table.get(username)?.map(|guard| guard.value().to_string()))
}

/// 设置 `exclusive` 且键已存在时返回 false。
fn put_raw(db: &Database, username: &str, raw: &str, exclusive: bool) -> Result<bool, redb::Error> {
    let write_txn = db.begin_write()?;
    let written = {
        let mut table = write_txn.open_table(CREDENTIALS)?;
        if exclusive && table.get(username)?.is_some() {
            false
        } else {
            table.insert(username, raw)?;
            true
        }
    };
    if written {
        write_txn.commit()?;
    } else {
        write_txn.abort()?;
    }
    Ok(written)
}

fn remove_raw(db: &Database, username: &str) -> Result<bool, redb::Error> {
    let write_txn = db.begin_write()?;
    let removed = {
        let mut table = write_txn.open_table(CREDENTIALS)?;
        table.remove(username)?.is_some()
    };
    write_txn.commit()?;
    Ok(removed)
}

fn list_raw(db: &Database) -> Result<Vec<String>, redb::Error> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(CREDENTIALS)?;
    let mut values = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        values.push(value.value().to_string());
    }
    Ok(values)
}

fn decode(raw: &str) -> Result<UserAuth, RepositoryError> {
    match serde_json::from_str::<UserAuth>(raw) {
        Ok(auth) if auth.is_complete() => Ok(auth),
        _ => Err(RepositoryError::NotFound),
    }
}

#[async_trait]
impl CredentialRepository for KvCredentialRepository {
    async fn create(&self, user: &UserAuth) -> Result<(), RepositoryError> {
        let raw = serde_json::to_string(user)?;
        let username = user.username.clone();
        let created = self
            .with_db(move |db| put_raw(db, &username, &raw, true))
            .await?;
        if !created {
            return Err(RepositoryError::AlreadyExists);
        }
        debug!(username = user.username, "credentials created in store");
        Ok(())
    }

    async fn read(&self, username: &str) -> Result<UserAuth, RepositoryError> {
        let key = username.to_string();
        let raw = self.with_db(move |db| get_raw(db, &key)).await?;
        match raw {
            Some(raw) => decode(&raw),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn update(&self, user: &UserAuth) -> Result<(), RepositoryError> {
        let raw = serde_json::to_string(user)?;
        let username = user.username.clone();
        self.with_db(move |db| put_raw(db, &username, &raw, false))
            .await?;
        debug!(username = user.username, "credentials updated in store");
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), RepositoryError> {
        let key = username.to_string();
        let removed = self.with_db(move |db| remove_raw(db, &key)).await?;
        if !removed {
            return Err(RepositoryError::NotFound);
        }
        debug!(username, "credentials deleted from store");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UserAuth>, RepositoryError> {
        let values = self.with_db(list_raw).await?;
        values.iter().map(|raw| decode(raw)).collect()
    }
}
