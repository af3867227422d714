use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::{Error, Result};
use std::io::{Read, Write};
use tracing::warn;

/// Serialize a value, compressing the result when asked.
///
/// Failures here are caller bugs (an unserializable value), so they surface
/// as errors rather than cache misses.
pub fn encode<T: Serialize>(value: &T, compress: bool) -> Result<Vec<u8>> {
    let raw =
        bincode::serialize(value).map_err(|e| Error::Internal(format!("serialize: {e}")))?;

    if !compress {
        return Ok(raw);
    }

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| Error::Internal(format!("compress: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Internal(format!("compress: {e}")))
}

/// Inverse of [`encode`]. Returns `None` on any decompression or
/// deserialization failure: corrupted bytes coming back from a cache are a
/// miss, never an error, and the caller recomputes.
pub fn decode<T: DeserializeOwned>(data: &[u8], compressed: bool) -> Option<T> {
    let raw;
    let bytes = if compressed {
        let mut buf = Vec::new();
        if let Err(e) = ZlibDecoder::new(data).read_to_end(&mut buf) {
            warn!("could not decompress cached payload: {e}");
            return None;
        }
        raw = buf;
        raw.as_slice()
    } else {
        data
    };

    match bincode::deserialize(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("could not deserialize cached payload: {e}");
            None
        }
    }
}
