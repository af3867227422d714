#![deny(clippy::all)]

//! The pluggable `ChunkStore` backends behind the layered cache: an
//! in-process stand-in for the distributed cache and a sled-backed durable
//! store, plus the startup factory that wires them into a
//! [`strata::LayerCache`].

pub mod cluster_cache;
pub mod sled_store;

pub use cluster_cache::ClusterCache;
pub use sled_store::SledStore;

use shared::Result;
use shared::config::Config;
use std::path::Path;
use std::sync::Arc;
use strata::LayerCache;

/// Wire the byte-oriented tiers once at process startup. Everything built on
/// the returned [`LayerCache`] shares the same backends.
pub fn open_layer_cache(config: &Config) -> Result<LayerCache> {
    let cluster = Arc::new(ClusterCache::new());
    let durable = Arc::new(SledStore::open(
        Path::new(&config.data_dir).join("layer-cache"),
    )?);
    Ok(
        LayerCache::new(cluster, durable, config.deploy_version.clone())
            .with_memory_capacity(config.memory_max_entries),
    )
}
