use async_trait::async_trait;
use bytes::Bytes;
use shared::{Result, TtlSeconds};
use std::collections::HashMap;

// Ports are the pluggable extension points for the byte-oriented cache tiers

/// Port for the size-limited bulk key-value backends that hold encoded cache
/// entries: the distributed cache and the durable store.
///
/// All operations are namespace-aware. `set` and `set_multi` must fail with
/// [`shared::Error::TooLarge`] for any single value above the backend's item
/// cap, so the engine can fall back to chunked storage. Bulk writes are not
/// atomic; readers detect torn chunk sets via generation tokens.
#[async_trait]
pub trait ChunkStore: Send + Sync + 'static {
    async fn get(&self, key: &str, namespace: Option<&str>) -> Result<Option<Bytes>>;

    async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, Bytes>>;

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: TtlSeconds,
        namespace: Option<&str>,
    ) -> Result<()>;

    async fn set_multi(
        &self,
        mapping: HashMap<String, Bytes>,
        ttl: TtlSeconds,
        namespace: Option<&str>,
    ) -> Result<()>;

    async fn delete(&self, key: &str, namespace: Option<&str>) -> Result<()>;

    async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> Result<()>;
}
