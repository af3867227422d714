//! Chunked value codec.
//!
//! The bulk backends cap every item around 1MB and offer no multi-key
//! transaction. Values that exceed the cap are split into bounded slices,
//! each prefixed with a random generation token, and written together with an
//! index entry in one non-atomic bulk write. On read, a missing chunk or a
//! token mismatch means a torn or partially evicted set, and the value is
//! treated as a miss rather than spliced together from two writers.

use crate::domain::{
    CHUNK_GENERATION_LEN, MAX_CHUNK_BYTES, MAX_TOTAL_BYTES, StoredEntry,
};
use crate::payload;
use crate::ports::ChunkStore;
use bytes::{BufMut, Bytes, BytesMut};
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_bytes::ByteBuf;
use shared::{Error, Result, TtlSeconds};
use std::collections::HashMap;
use tracing::warn;

pub fn encode_entry(entry: &StoredEntry) -> Result<Bytes> {
    bincode::serialize(entry)
        .map(Bytes::from)
        .map_err(|e| Error::Internal(format!("serialize envelope: {e}")))
}

/// Returns `None` for bytes that do not parse as an envelope, which covers
/// both corruption and entries written by something other than this codec.
pub fn decode_entry(data: &[u8]) -> Option<StoredEntry> {
    match bincode::deserialize(data) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("could not decode cache envelope: {e}");
            None
        }
    }
}

/// Store a value without compression as a single `Whole` envelope. The
/// backend rejects it with [`Error::TooLarge`] when it exceeds the item cap,
/// at which point the engine retries through [`store`].
pub async fn store_direct<T: Serialize>(
    backend: &dyn ChunkStore,
    key: &str,
    value: &T,
    ttl: TtlSeconds,
    namespace: Option<&str>,
) -> Result<()> {
    let data = payload::encode(value, false)?;
    let entry = StoredEntry::Whole {
        data: ByteBuf::from(data),
        compressed: false,
    };
    backend.set(key, encode_entry(&entry)?, ttl, namespace).await
}

/// Store a value of any size, compressing first when asked.
///
/// A payload that still fits one storage unit after compression is written as
/// a single `Whole` envelope, saving a round trip on every read. Anything
/// larger is sliced into chunks tagged with a fresh generation token and
/// written alongside a `Chunked` index entry in one bulk write. Payloads over
/// the absolute cap are dropped with a warning and the computed value is
/// still returned to the caller upstream.
pub async fn store<T: Serialize>(
    backend: &dyn ChunkStore,
    key: &str,
    value: &T,
    ttl: TtlSeconds,
    namespace: Option<&str>,
    compress: bool,
) -> Result<()> {
    let data = payload::encode(value, compress)?;
    let size = data.len();

    if size > MAX_TOTAL_BYTES {
        warn!(
            key,
            size,
            limit = MAX_TOTAL_BYTES,
            "not caching: encoded value exceeds the absolute size limit"
        );
        return Ok(());
    }

    if size < MAX_CHUNK_BYTES {
        let entry = StoredEntry::Whole {
            data: ByteBuf::from(data),
            compressed: compress,
        };
        return backend.set(key, encode_entry(&entry)?, ttl, namespace).await;
    }

    let mut generation = [0u8; CHUNK_GENERATION_LEN];
    rand::rng().fill_bytes(&mut generation);

    let slice_len = MAX_CHUNK_BYTES - CHUNK_GENERATION_LEN;
    let mut mapping = HashMap::new();
    let mut chunk_keys = Vec::new();
    for (i, slice) in data.chunks(slice_len).enumerate() {
        let chunk_key = format!("{key}__chunk{i}__");
        let mut chunk = BytesMut::with_capacity(CHUNK_GENERATION_LEN + slice.len());
        chunk.put_slice(&generation);
        chunk.put_slice(slice);
        mapping.insert(chunk_key.clone(), chunk.freeze());
        chunk_keys.push(chunk_key);
    }

    let index = StoredEntry::Chunked {
        chunk_keys,
        generation,
        compressed: compress,
    };
    mapping.insert(key.to_string(), encode_entry(&index)?);

    // set_multi is not atomic; readers verify the generation token to make
    // sure every chunk came from this write
    backend.set_multi(mapping, ttl, namespace).await
}

/// Reassemble and decode a previously fetched envelope.
///
/// `Ok(None)` means the value is unrecoverable (missing chunk, generation
/// mismatch, corruption) and must be treated as a miss. Errors are backend
/// failures only.
pub async fn fetch<T: DeserializeOwned>(
    backend: &dyn ChunkStore,
    entry: &StoredEntry,
    namespace: Option<&str>,
) -> Result<Option<T>> {
    match entry {
        StoredEntry::Whole { data, compressed } => Ok(payload::decode(data, *compressed)),
        StoredEntry::Chunked {
            chunk_keys,
            generation,
            compressed,
        } => {
            let chunks = backend.get_multi(chunk_keys, namespace).await?;

            let mut data = Vec::new();
            for chunk_key in chunk_keys {
                let Some(chunk) = chunks.get(chunk_key) else {
                    // a chunk the backend no longer has makes the payload
                    // unrecoverable
                    return Ok(None);
                };
                if chunk.len() < CHUNK_GENERATION_LEN
                    || chunk[..CHUNK_GENERATION_LEN] != generation[..]
                {
                    warn!(%chunk_key, "invalid chunk: wrong generation token");
                    return Ok(None);
                }
                data.extend_from_slice(&chunk[CHUNK_GENERATION_LEN..]);
            }

            Ok(payload::decode(&data, *compressed))
        }
    }
}

/// Delete a key and, for chunked values, every chunk it references, in one
/// bulk delete. Chunks orphaned by an earlier torn write are left to the
/// backend's own expiry.
pub async fn delete(backend: &dyn ChunkStore, key: &str, namespace: Option<&str>) -> Result<()> {
    let Some(bytes) = backend.get(key, namespace).await? else {
        return Ok(());
    };

    match decode_entry(&bytes) {
        Some(StoredEntry::Chunked { mut chunk_keys, .. }) => {
            chunk_keys.push(key.to_string());
            backend.delete_multi(&chunk_keys, namespace).await
        }
        _ => backend.delete(key, namespace).await,
    }
}
