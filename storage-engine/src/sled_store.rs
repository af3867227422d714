use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use shared::{Error, Result, TtlSeconds};
use std::collections::HashMap;
use std::path::Path;
use strata::domain::MAX_ITEM_BYTES;
use strata::ports::ChunkStore;
use tracing::warn;

/// Durable `ChunkStore` over sled.
///
/// Every row persists its created/expires timestamps and is treated as
/// absent once past `expires`, even while still physically stored; dead rows
/// are reaped lazily on read. The store has no native namespace support, so
/// every key carries its namespace as a prefix.
pub struct SledStore {
    db: sled::Db,
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    value: ByteBuf,
    created: i64,
    expires: Option<i64>,
    // `None` on rows written before this flag existed; read as enveloped.
    // Drop the fallback once every pre-flag row has aged past the default
    // TTL horizon.
    enveloped: Option<bool>,
}

impl StoredRecord {
    fn new(value: Bytes, ttl: TtlSeconds) -> Self {
        let now = Utc::now().timestamp();
        Self {
            value: ByteBuf::from(value.to_vec()),
            created: now,
            expires: ttl.as_duration().map(|d| now + d.as_secs() as i64),
            enveloped: Some(true),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| Utc::now().timestamp() > at)
    }
}

impl SledStore {
    /// Open (or create) the store, creating the parent directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("failed to create directory: {e}")))?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::Internal(format!("failed to open sled database: {e}")))?;

        Ok(Self { db })
    }

    fn namespaced(key: &str, namespace: Option<&str>) -> String {
        format!("{}:{}", namespace.unwrap_or(""), key)
    }

    fn live_record(&self, key: &str, namespace: Option<&str>) -> Result<Option<StoredRecord>> {
        let namespaced = Self::namespaced(key, namespace);
        let Some(bytes) = self
            .db
            .get(&namespaced)
            .map_err(|e| Error::Internal(format!("failed to read row: {e}")))?
        else {
            return Ok(None);
        };

        let Ok(record) = bincode::deserialize::<StoredRecord>(&bytes) else {
            warn!(key, "discarding undecodable durable cache row");
            return Ok(None);
        };

        if record.is_expired() {
            self.db
                .remove(&namespaced)
                .map_err(|e| Error::Internal(format!("failed to reap row: {e}")))?;
            return Ok(None);
        }

        // rows written raw by pre-envelope deployments cannot be decoded by
        // the current codec, treat them as absent
        if !record.enveloped.unwrap_or(true) {
            return Ok(None);
        }

        Ok(Some(record))
    }

    fn put_record(
        &self,
        key: &str,
        value: Bytes,
        ttl: TtlSeconds,
        namespace: Option<&str>,
    ) -> Result<()> {
        if value.len() > MAX_ITEM_BYTES {
            return Err(Error::TooLarge {
                size: value.len(),
                limit: MAX_ITEM_BYTES,
            });
        }

        let record = StoredRecord::new(value, ttl);
        let encoded = bincode::serialize(&record)
            .map_err(|e| Error::Internal(format!("failed to serialize row: {e}")))?;
        self.db
            .insert(Self::namespaced(key, namespace), encoded)
            .map_err(|e| Error::Internal(format!("failed to write row: {e}")))?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::Internal(format!("failed to flush database: {e}")))?;
        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("rows", &self.db.len())
            .finish()
    }
}

#[async_trait]
impl ChunkStore for SledStore {
    async fn get(&self, key: &str, namespace: Option<&str>) -> Result<Option<Bytes>> {
        Ok(self
            .live_record(key, namespace)?
            .map(|record| Bytes::from(record.value.into_vec())))
    }

    async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, Bytes>> {
        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.live_record(key, namespace)? {
                values.insert(key.clone(), Bytes::from(record.value.into_vec()));
            }
        }
        Ok(values)
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: TtlSeconds,
        namespace: Option<&str>,
    ) -> Result<()> {
        self.put_record(key, value, ttl, namespace)?;
        self.flush()
    }

    async fn set_multi(
        &self,
        mapping: HashMap<String, Bytes>,
        ttl: TtlSeconds,
        namespace: Option<&str>,
    ) -> Result<()> {
        // rows land one by one, not in a transaction; readers detect a torn
        // chunk set via the generation token in each chunk
        for (key, value) in mapping {
            self.put_record(&key, value, ttl, namespace)?;
        }
        self.flush()
    }

    async fn delete(&self, key: &str, namespace: Option<&str>) -> Result<()> {
        self.db
            .remove(Self::namespaced(key, namespace))
            .map_err(|e| Error::Internal(format!("failed to delete row: {e}")))?;
        self.flush()
    }

    async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> Result<()> {
        for key in keys {
            self.db
                .remove(Self::namespaced(key, namespace))
                .map_err(|e| Error::Internal(format!("failed to delete row: {e}")))?;
        }
        self.flush()
    }
}
