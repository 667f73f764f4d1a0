//! Redis-backed [`ReadingStore`].
//!
//! Layout, shared with the dashboard:
//!
//! | Key        | Type | Field    | Value                     |
//! |------------|------|----------|---------------------------|
//! | `Usina`    | hash | entity   | latest plant `Data` JSON  |
//! | `Central`  | hash | entity   | latest hospital `Data` JSON |
//! | `Entities` | hash | entity   | collection name           |

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;

use o2watch_core::topics::ENTITY_INDEX;

use super::{ReadingStore, StoreError};

/// Maximum pooled connections; writes are small and infrequent.
const MAX_CONNECTIONS: usize = 8;

pub struct RedisStore {
    pool: Pool,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisStore")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Build a pool for `url` and verify the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PoolConfig::from_url(url)
            .builder()
            .map_err(|e| StoreError::Connection(format!("Failed to create pool config: {e}")))?
            .max_size(MAX_CONNECTIONS)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Connection(format!("Failed to build pool: {e}")))?;

        let store = Self { pool };
        let mut conn = store.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| StoreError::Connection(format!("Redis PING failed: {e}")))?;

        tracing::info!("Connected to Redis");
        Ok(store)
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to get connection: {e}")))
    }
}

#[async_trait]
impl ReadingStore for RedisStore {
    async fn write(&self, collection: &str, entity: &str, blob: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(collection, entity, blob)
            .await
            .map_err(|e| StoreError::Backend(format!("Redis HSET {collection} failed: {e}")))
    }

    async fn register_entity(&self, entity: &str, collection: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(ENTITY_INDEX, entity, collection)
            .await
            .map_err(|e| StoreError::Backend(format!("Redis HSET {ENTITY_INDEX} failed: {e}")))
    }
}
