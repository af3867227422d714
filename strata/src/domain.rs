use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use shared::TtlSeconds;

/// Largest chunk the codec will write: the backend item cap minus envelope
/// overhead. Shared by both bulk backends.
pub const MAX_CHUNK_BYTES: usize = 999_900;

/// Hard cap on one encoded value across all of its chunks (the bulk-write
/// limit of the distributed cache, minus envelope overhead). Writes beyond
/// this are dropped with a warning, never truncated.
pub const MAX_TOTAL_BYTES: usize = 33_300_000;

/// Length of the random token prepended to every chunk of one logical write.
pub const CHUNK_GENERATION_LEN: usize = 16;

/// Per-item size cap enforced by the backends themselves.
pub const MAX_ITEM_BYTES: usize = 1_000_000;

/// Expire after 25 days unless a policy overrides it.
pub const DEFAULT_TTL: TtlSeconds = TtlSeconds(60 * 60 * 24 * 25);

/// Bitmask over the three storage tiers, ordered fastest to slowest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierSet(u8);

impl TierSet {
    pub const NONE: TierSet = TierSet(0);
    pub const IN_APP_MEMORY: TierSet = TierSet(0b001);
    pub const DISTRIBUTED_CACHE: TierSet = TierSet(0b010);
    pub const DURABLE_STORE: TierSet = TierSet(0b100);
    pub const ALL: TierSet = TierSet(0b111);

    pub fn contains(self, tier: TierSet) -> bool {
        self.0 & tier.0 != 0
    }
}

impl Default for TierSet {
    fn default() -> Self {
        TierSet::IN_APP_MEMORY | TierSet::DISTRIBUTED_CACHE
    }
}

impl std::ops::BitOr for TierSet {
    type Output = TierSet;

    fn bitor(self, rhs: TierSet) -> TierSet {
        TierSet(self.0 | rhs.0)
    }
}

/// Per-computation cache configuration.
#[derive(Clone, Debug)]
pub struct CachePolicy {
    /// Tiers to read from and fill on a miss.
    pub tiers: TierSet,
    /// Time-to-live for primary entries. Permanent fallback entries always
    /// use [`TtlSeconds::NEVER`].
    pub ttl: TtlSeconds,
    /// Namespace entries under `None` instead of the deployment version, so
    /// they survive redeploys.
    pub persist_across_versions: bool,
    /// Skip the direct set attempt and go straight to chunked storage. Saves
    /// a round trip for values known to exceed a single storage unit.
    pub use_chunks: bool,
    /// Compress chunked payloads. Turn off for values that are large but
    /// incompressible.
    pub compress: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            tiers: TierSet::default(),
            ttl: DEFAULT_TTL,
            persist_across_versions: false,
            use_chunks: false,
            compress: true,
        }
    }
}

/// Outcome of a cached computation: cache the value, or hand it back to the
/// caller without writing any tier.
#[derive(Clone, Debug)]
pub enum Computed<T> {
    Value(T),
    DoNotCache(T),
}

impl<T> Computed<T> {
    pub fn into_inner(self) -> T {
        match self {
            Computed::Value(value) | Computed::DoNotCache(value) => value,
        }
    }
}

/// Envelope written under a cache key in the byte-oriented tiers.
///
/// `Whole` carries the payload inline. `Chunked` is an index entry listing
/// the chunk keys of a payload too large for one storage unit; each chunk
/// value is `generation || payload_slice`, stored raw. The generation token
/// is the only defense against reading a mix of two overlapping non-atomic
/// bulk writes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum StoredEntry {
    Whole {
        data: ByteBuf,
        compressed: bool,
    },
    Chunked {
        chunk_keys: Vec<String>,
        generation: [u8; CHUNK_GENERATION_LEN],
        compressed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers_are_memory_and_distributed() {
        let tiers = TierSet::default();
        assert!(tiers.contains(TierSet::IN_APP_MEMORY));
        assert!(tiers.contains(TierSet::DISTRIBUTED_CACHE));
        assert!(!tiers.contains(TierSet::DURABLE_STORE));
    }

    #[test]
    fn tier_sets_combine() {
        let tiers = TierSet::DISTRIBUTED_CACHE | TierSet::DURABLE_STORE;
        assert!(!tiers.contains(TierSet::IN_APP_MEMORY));
        assert!(tiers.contains(TierSet::DURABLE_STORE));
        assert!(TierSet::ALL.contains(TierSet::IN_APP_MEMORY));
        assert!(!TierSet::NONE.contains(TierSet::IN_APP_MEMORY));
    }

    #[test]
    fn computed_unwraps_both_variants() {
        assert_eq!(Computed::Value(5).into_inner(), 5);
        assert_eq!(Computed::DoNotCache(7).into_inner(), 7);
    }
}
