//! Latest-reading persistence for the dashboard.
//!
//! Each decoded reading overwrites the previous blob for its entity inside a
//! per-class collection, and the entity is registered in a reverse index so
//! the dashboard can list every known site.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Error type for persistence backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store operation failed: {0}")]
    Backend(String),
}

/// Key/value store holding the most recent reading per entity.
#[async_trait]
pub trait ReadingStore: Send + Sync + 'static {
    /// Replace the blob stored for `entity` in `collection`.
    async fn write(&self, collection: &str, entity: &str, blob: &str) -> Result<(), StoreError>;

    /// Record which collection `entity` lives in.
    async fn register_entity(&self, entity: &str, collection: &str) -> Result<(), StoreError>;
}
