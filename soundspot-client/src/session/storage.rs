use std::{collections::HashMap, io::ErrorKind, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// A string key-value store for the persisted session blobs
#[async_trait]
pub trait Storage
where
    Self: 'static + Send + Sync,
{
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;
    /// Removing a key that does not exist is not an error
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<S> Storage for Arc<S>
where
    S: Storage,
{
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.as_ref().get_item(key).await
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.as_ref().set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.as_ref().remove_item(key).await
    }
}

/// Stores every key as `<dir>/<key>.json`
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new<P>(dir: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;

        match tokio::fs::read_to_string(path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(path, value).await?;

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps everything in memory, for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read, handy for asserting on what was persisted
    pub fn peek(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.peek(key))
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.items.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.lock().remove(key);
        Ok(())
    }
}
