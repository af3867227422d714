//! Layered cache engine.
//!
//! [`LayerCache`] owns the two byte-oriented tiers and the deployment version
//! used to namespace their entries. [`CachedCall`] wraps one cacheable
//! computation: its policy, its key functions, and its typed in-process
//! memory tier. Lookups walk the tiers fastest to slowest and repopulate the
//! faster tiers on a hit in a slower one; misses run the computation and fill
//! every requested tier.

use crate::chunked;
use crate::domain::{CachePolicy, Computed, StoredEntry, TierSet};
use crate::ports::ChunkStore;
use crate::scope::RequestScope;
use moka::Expiry;
use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::{Error, Result, TtlSeconds};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// The shared tiers, wired once at process startup and handed to every
/// [`CachedCall`].
pub struct LayerCache {
    cluster: Arc<dyn ChunkStore>,
    durable: Arc<dyn ChunkStore>,
    version: String,
    memory_max_entries: Option<u64>,
}

impl LayerCache {
    pub fn new(
        cluster: Arc<dyn ChunkStore>,
        durable: Arc<dyn ChunkStore>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            durable,
            version: version.into(),
            memory_max_entries: None,
        }
    }

    /// Bound the in-process memory tier of every call built on this cache.
    pub fn with_memory_capacity(mut self, max_entries: u64) -> Self {
        self.memory_max_entries = Some(max_entries);
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl std::fmt::Debug for LayerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerCache")
            .field("version", &self.version)
            .field("memory_max_entries", &self.memory_max_entries)
            .finish()
    }
}

/// Memory-tier entry carrying its own time-to-live; permanent fallback
/// values are stored with `ttl: None` and never expire.
#[derive(Clone)]
struct MemEntry<T> {
    value: T,
    ttl: Option<Duration>,
}

struct PerEntryTtl;

impl<K, T> Expiry<K, MemEntry<T>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &K,
        entry: &MemEntry<T>,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &K,
        entry: &MemEntry<T>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

type KeyFn<A> = Box<dyn Fn(&A) -> Option<String> + Send + Sync>;
type PermanentKeyFn<A> = Box<dyn Fn(&A) -> String + Send + Sync>;

/// One cacheable computation: policy, key derivation, and the typed
/// in-process memory tier.
///
/// The key function may return `None` to skip caching for a particular set
/// of arguments, and is re-evaluated after the computation runs in case the
/// computation changed the state it derives the key from.
pub struct CachedCall<A, T> {
    layers: Arc<LayerCache>,
    policy: CachePolicy,
    key_fn: KeyFn<A>,
    permanent_key_fn: Option<PermanentKeyFn<A>>,
    memory: Cache<String, MemEntry<T>>,
}

impl<A, T> CachedCall<A, T>
where
    A: Clone,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        layers: Arc<LayerCache>,
        policy: CachePolicy,
        key_fn: impl Fn(&A) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        let mut builder = Cache::builder().expire_after(PerEntryTtl);
        if let Some(max) = layers.memory_max_entries {
            builder = builder.max_capacity(max);
        }
        Self {
            layers,
            policy,
            key_fn: Box::new(key_fn),
            permanent_key_fn: None,
            memory: builder.build(),
        }
    }

    /// Register a secondary never-expiring key, consulted only when the
    /// computation fails.
    pub fn with_permanent_key(
        mut self,
        key_fn: impl Fn(&A) -> String + Send + Sync + 'static,
    ) -> Self {
        self.permanent_key_fn = Some(Box::new(key_fn));
        self
    }

    fn namespace(&self) -> Option<&str> {
        if self.policy.persist_across_versions {
            None
        } else {
            Some(self.layers.version.as_str())
        }
    }

    /// Look the key up in the requested tiers; on a total miss run `compute`
    /// and fill every requested tier with its result.
    ///
    /// `bust_cache` skips the lookup but still refills the tiers with the
    /// freshly computed value. A computation failure propagates unless a
    /// permanent fallback entry exists and decodes, in which case the
    /// fallback is returned and the primary key's tiers are refilled with it.
    pub async fn invoke<F, Fut>(
        &self,
        scope: &RequestScope,
        bust_cache: bool,
        args: A,
        compute: F,
    ) -> Result<T>
    where
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = anyhow::Result<Computed<T>>>,
    {
        if scope.is_disabled() {
            return Ok(compute(args).await.map_err(Error::Compute)?.into_inner());
        }

        let Some(key) = (self.key_fn)(&args) else {
            return Ok(compute(args).await.map_err(Error::Compute)?.into_inner());
        };

        let namespace = self.namespace();

        if !bust_cache {
            if let Some(hit) = self.lookup(&key, namespace).await? {
                return Ok(hit);
            }
        }

        let outcome = match compute(args.clone()).await {
            Ok(outcome) => outcome,
            Err(cause) => {
                if let Some(permanent_key_fn) = &self.permanent_key_fn {
                    let permanent_key = permanent_key_fn(&args);
                    if let Some(fallback) = self.lookup(&permanent_key, namespace).await? {
                        info!(
                            key = %permanent_key,
                            "recomputation failed, restoring from permanent cache"
                        );
                        // the computation may have changed what the primary
                        // key evaluates to
                        if let Some(key) = (self.key_fn)(&args) {
                            self.fill_tiers(&key, namespace, self.policy.ttl, &fallback)
                                .await?;
                        }
                        return Ok(fallback);
                    }
                }
                error!(%key, "cached computation failed: {cause:#}");
                return Err(Error::Compute(cause));
            }
        };

        let value = match outcome {
            Computed::DoNotCache(value) => return Ok(value),
            Computed::Value(value) => value,
        };

        if let Some(permanent_key_fn) = &self.permanent_key_fn {
            let permanent_key = permanent_key_fn(&args);
            self.fill_tiers(&permanent_key, namespace, TtlSeconds::NEVER, &value)
                .await?;
        }

        // the computation may have changed what the key evaluates to
        if let Some(key) = (self.key_fn)(&args) {
            self.fill_tiers(&key, namespace, self.policy.ttl, &value).await?;
        }

        Ok(value)
    }

    /// Walk the requested tiers fastest to slowest, repopulating faster
    /// tiers after a hit in a slower one. Undecodable entries fall through
    /// to the next tier.
    async fn lookup(&self, key: &str, namespace: Option<&str>) -> Result<Option<T>> {
        let tiers = self.policy.tiers;

        if tiers.contains(TierSet::IN_APP_MEMORY) {
            if let Some(entry) = self.memory.get(key).await {
                return Ok(Some(entry.value));
            }
        }

        if tiers.contains(TierSet::DISTRIBUTED_CACHE) {
            if let Some(bytes) = self.layers.cluster.get(key, namespace).await? {
                if let Some(entry) = chunked::decode_entry(&bytes) {
                    if let Some(value) = chunked::fetch::<T>(
                        self.layers.cluster.as_ref(),
                        &entry,
                        namespace,
                    )
                    .await?
                    {
                        if tiers.contains(TierSet::IN_APP_MEMORY) {
                            self.fill_memory(key, self.policy.ttl, &value).await;
                        }
                        return Ok(Some(value));
                    }
                }
                // undecodable or torn entry: fall through to the next tier
            }
        }

        if tiers.contains(TierSet::DURABLE_STORE) {
            if let Some(bytes) = self.layers.durable.get(key, namespace).await? {
                if let Some(entry) = chunked::decode_entry(&bytes) {
                    if let Some(value) = chunked::fetch::<T>(
                        self.layers.durable.as_ref(),
                        &entry,
                        namespace,
                    )
                    .await?
                    {
                        if tiers.contains(TierSet::IN_APP_MEMORY) {
                            self.fill_memory(key, self.policy.ttl, &value).await;
                        }
                        if tiers.contains(TierSet::DISTRIBUTED_CACHE) {
                            match &entry {
                                StoredEntry::Chunked { .. } => {
                                    // the durable copy needed chunking, the
                                    // distributed copy will too
                                    chunked::store(
                                        self.layers.cluster.as_ref(),
                                        key,
                                        &value,
                                        self.policy.ttl,
                                        namespace,
                                        self.policy.compress,
                                    )
                                    .await?;
                                }
                                StoredEntry::Whole { .. } => {
                                    // fit one unit in the durable store, so a
                                    // plain set succeeds here too
                                    self.layers
                                        .cluster
                                        .set(key, bytes.clone(), self.policy.ttl, namespace)
                                        .await?;
                                }
                            }
                        }
                        return Ok(Some(value));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Write one value into one byte-oriented tier, falling back to chunked
    /// storage when the backend rejects the direct set as oversized.
    async fn store_into(
        &self,
        backend: &dyn ChunkStore,
        key: &str,
        namespace: Option<&str>,
        ttl: TtlSeconds,
        value: &T,
    ) -> Result<()> {
        if self.policy.use_chunks {
            // the caller knows this value exceeds a single storage unit,
            // skip the direct set attempt
            return chunked::store(backend, key, value, ttl, namespace, self.policy.compress)
                .await;
        }

        match chunked::store_direct(backend, key, value, ttl, namespace).await {
            Err(Error::TooLarge { .. }) => {
                chunked::store(backend, key, value, ttl, namespace, self.policy.compress).await
            }
            other => other,
        }
    }

    /// Fill every requested tier in priority order. A failing tier does not
    /// stop the remaining tiers from being attempted, but the first failure
    /// is propagated once they have been.
    async fn fill_tiers(
        &self,
        key: &str,
        namespace: Option<&str>,
        ttl: TtlSeconds,
        value: &T,
    ) -> Result<()> {
        let tiers = self.policy.tiers;
        let mut first_failure = None;

        if tiers.contains(TierSet::IN_APP_MEMORY) {
            self.fill_memory(key, ttl, value).await;
        }

        if tiers.contains(TierSet::DISTRIBUTED_CACHE) {
            if let Err(e) = self
                .store_into(self.layers.cluster.as_ref(), key, namespace, ttl, value)
                .await
            {
                error!(key, "distributed cache fill failed: {e}");
                first_failure.get_or_insert(e);
            }
        }

        if tiers.contains(TierSet::DURABLE_STORE) {
            if let Err(e) = self
                .store_into(self.layers.durable.as_ref(), key, namespace, ttl, value)
                .await
            {
                error!(key, "durable store fill failed: {e}");
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fill_memory(&self, key: &str, ttl: TtlSeconds, value: &T) {
        let entry = MemEntry {
            value: value.clone(),
            ttl: ttl.as_duration(),
        };
        self.memory.insert(key.to_string(), entry).await;
    }
}

impl<A, T> std::fmt::Debug for CachedCall<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCall")
            .field("policy", &self.policy)
            .field("memory_entries", &self.memory.entry_count())
            .finish()
    }
}
