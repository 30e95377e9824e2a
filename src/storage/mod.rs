mod error;
mod sled_engine;

pub use self::error::StorageError;
pub use self::sled_engine::SledStore;

use async_trait::async_trait;

/// Durable byte-oriented key-value engine behind the client-facing service.
///
/// Writes are on disk when the call returns. Deleting a missing key is not
/// an error.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Owned copy of the value, or `None` if the key is absent.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    async fn flush(&self) -> Result<(), StorageError>;
}
