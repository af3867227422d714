use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use shared::{Error, Result, TtlSeconds};
use std::collections::HashMap;
use strata::domain::MAX_ITEM_BYTES;
use strata::ports::ChunkStore;

type MapKey = (Option<String>, String);

/// In-process implementation of the distributed-cache contract: namespace
/// aware, per-entry expiry checked lazily on read, and the same 1MB item cap
/// a shared cache node enforces. Deployments that spread the cache across
/// machines swap this for a networked client behind the same port.
pub struct ClusterCache {
    entries: DashMap<MapKey, StoredItem>,
}

struct StoredItem {
    value: Bytes,
    expires_at: Option<i64>,
}

impl StoredItem {
    fn new(value: Bytes, ttl: TtlSeconds) -> Self {
        let expires_at = ttl
            .as_duration()
            .map(|d| Utc::now().timestamp() + d.as_secs() as i64);
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now().timestamp() > at)
    }
}

impl ClusterCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn map_key(key: &str, namespace: Option<&str>) -> MapKey {
        (namespace.map(str::to_string), key.to_string())
    }

    fn check_size(value: &Bytes) -> Result<()> {
        if value.len() > MAX_ITEM_BYTES {
            return Err(Error::TooLarge {
                size: value.len(),
                limit: MAX_ITEM_BYTES,
            });
        }
        Ok(())
    }

    fn live_value(&self, map_key: &MapKey) -> Option<Bytes> {
        let item = self.entries.get(map_key)?;
        if item.is_expired() {
            drop(item);
            self.entries.remove(map_key);
            return None;
        }
        Some(item.value.clone())
    }
}

impl Default for ClusterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClusterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[async_trait]
impl ChunkStore for ClusterCache {
    async fn get(&self, key: &str, namespace: Option<&str>) -> Result<Option<Bytes>> {
        Ok(self.live_value(&Self::map_key(key, namespace)))
    }

    async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, Bytes>> {
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.live_value(&Self::map_key(key, namespace))
                    .map(|value| (key.clone(), value))
            })
            .collect())
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: TtlSeconds,
        namespace: Option<&str>,
    ) -> Result<()> {
        Self::check_size(&value)?;
        self.entries
            .insert(Self::map_key(key, namespace), StoredItem::new(value, ttl));
        Ok(())
    }

    async fn set_multi(
        &self,
        mapping: HashMap<String, Bytes>,
        ttl: TtlSeconds,
        namespace: Option<&str>,
    ) -> Result<()> {
        for value in mapping.values() {
            Self::check_size(value)?;
        }
        // entries land one by one; readers detect a torn chunk set via the
        // generation token in each chunk
        for (key, value) in mapping {
            self.entries
                .insert(Self::map_key(&key, namespace), StoredItem::new(value, ttl));
        }
        Ok(())
    }

    async fn delete(&self, key: &str, namespace: Option<&str>) -> Result<()> {
        self.entries.remove(&Self::map_key(key, namespace));
        Ok(())
    }

    async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> Result<()> {
        for key in keys {
            self.entries.remove(&Self::map_key(key, namespace));
        }
        Ok(())
    }
}
