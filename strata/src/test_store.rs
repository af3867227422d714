//! In-memory `ChunkStore` used by the unit tests: enforces the per-item size
//! cap like the real backends, counts backend round-trips, and exposes raw
//! entries so tests can simulate torn writes and scan for orphaned chunks.

use crate::domain::MAX_ITEM_BYTES;
use crate::ports::ChunkStore;
use async_trait::async_trait;
use bytes::Bytes;
use shared::{Error, Result, TtlSeconds};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type MapKey = (Option<String>, String);

#[derive(Default)]
pub struct MemStore {
    entries: Mutex<HashMap<MapKey, (Bytes, TtlSeconds)>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
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

    fn check_failure(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Internal("injected write failure".to_string()));
        }
        Ok(())
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::Relaxed);
    }

    pub fn key_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn contains(&self, key: &str, namespace: Option<&str>) -> bool {
        self.entries
            .lock()
            .unwrap()
            .contains_key(&Self::map_key(key, namespace))
    }

    pub fn ttl_of(&self, key: &str, namespace: Option<&str>) -> Option<TtlSeconds> {
        self.entries
            .lock()
            .unwrap()
            .get(&Self::map_key(key, namespace))
            .map(|(_, ttl)| *ttl)
    }

    pub fn raw_values(&self) -> Vec<Bytes> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .map(|(bytes, _)| bytes.clone())
            .collect()
    }

    pub fn overwrite_raw(&self, key: &str, namespace: Option<&str>, value: Bytes) {
        self.entries
            .lock()
            .unwrap()
            .insert(Self::map_key(key, namespace), (value, TtlSeconds(3600)));
    }
}

#[async_trait]
impl ChunkStore for MemStore {
    async fn get(&self, key: &str, namespace: Option<&str>) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&Self::map_key(key, namespace))
            .map(|(bytes, _)| bytes.clone()))
    }

    async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(&Self::map_key(key, namespace))
                    .map(|(bytes, _)| (key.clone(), bytes.clone()))
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
        self.writes.fetch_add(1, Ordering::Relaxed);
        Self::check_size(&value)?;
        self.check_failure()?;
        self.entries
            .lock()
            .unwrap()
            .insert(Self::map_key(key, namespace), (value, ttl));
        Ok(())
    }

    async fn set_multi(
        &self,
        mapping: HashMap<String, Bytes>,
        ttl: TtlSeconds,
        namespace: Option<&str>,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        for value in mapping.values() {
            Self::check_size(value)?;
        }
        self.check_failure()?;
        let mut entries = self.entries.lock().unwrap();
        for (key, value) in mapping {
            entries.insert(Self::map_key(&key, namespace), (value, ttl));
        }
        Ok(())
    }

    async fn delete(&self, key: &str, namespace: Option<&str>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap()
            .remove(&Self::map_key(key, namespace));
        Ok(())
    }

    async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.remove(&Self::map_key(key, namespace));
        }
        Ok(())
    }
}
