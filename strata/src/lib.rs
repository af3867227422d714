#![deny(clippy::all)]

//! strata caches the result of expensive computations across requests, in up
//! to three tiers: an in-process memory cache, a shared distributed cache,
//! and a durable key-value store.
//!
//! Unless a policy says otherwise, the memory and distributed tiers are used.
//! The durable tier must be requested explicitly.
//!
//! Rough guidance for picking tiers: results that are not user-specific and
//! read on almost every request belong in `IN_APP_MEMORY`; anything read
//! frequently across users belongs in `DISTRIBUTED_CACHE`; user-specific
//! results that tolerate a storage round-trip belong in `DURABLE_STORE`.
//!
//! Values whose encoded form exceeds a single storage unit are transparently
//! split into chunks and reassembled on read; see [`chunked`].

pub mod chunked;
pub mod domain;
pub mod engine;
pub mod payload;
pub mod ports;
pub mod scope;

pub use domain::{CachePolicy, Computed, StoredEntry, TierSet};
pub use engine::{CachedCall, LayerCache};
pub use ports::ChunkStore;
pub use scope::RequestScope;

#[cfg(test)]
pub(crate) mod test_store;
