use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{KvStore, StorageError};

pub struct SledStore {
    db: sled::Db,
    path: PathBuf,
}

impl SledStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let db = sled::open(&path)?;

        log::info!("Sled storage engine opened at {:?}", path);

        Ok(Self { db, path })
    }

    /// The underlying database, shared with the Raft hard-state store.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }
}

#[async_trait]
impl KvStore for SledStore {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db.insert(key, value)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db.remove(key)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_async().await?;
        log::debug!("Flushed sled storage at {:?}", self.path);
        Ok(())
    }
}
