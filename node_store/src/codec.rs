//! Reversible payload transform: zlib compression followed by base64, so the
//! result fits a text-typed stored field.

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{write::ZlibEncoder, Compression, Decompress, FlushDecompress, Status};

use crate::{NodeStoreError, NodeStoreResult};

/// Compress and base64-encode a payload.
pub fn encode(data: &[u8]) -> NodeStoreResult<String> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| NodeStoreError::Other { source: e.into() })?;
    let compressed = encoder
        .finish()
        .map_err(|e| NodeStoreError::Other { source: e.into() })?;
    Ok(STANDARD.encode(compressed))
}

/// Reverse [`encode`]. Malformed base64 or a truncated/invalid zlib stream
/// yields `NodeStoreError::CorruptData`.
pub fn decode(encoded: &str) -> NodeStoreResult<Vec<u8>> {
    let compressed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| NodeStoreError::CorruptData {
            reason: format!("invalid base64: {}", e),
        })?;
    let mut decompress = Decompress::new(true);
    let mut data = Vec::with_capacity(compressed.len() * 4);
    loop {
        if data.len() == data.capacity() {
            data.reserve(data.capacity().max(256));
        }
        let (in_before, out_before) = (decompress.total_in(), decompress.total_out());
        let status = decompress
            .decompress_vec(
                &compressed[in_before as usize..],
                &mut data,
                FlushDecompress::Finish,
            )
            .map_err(|e| NodeStoreError::CorruptData {
                reason: format!("invalid zlib stream: {}", e),
            })?;
        if status == Status::StreamEnd {
            return Ok(data);
        }
        // Output space was available, so no progress means the input ran out.
        if decompress.total_in() == in_before && decompress.total_out() == out_before {
            return Err(NodeStoreError::CorruptData {
                reason: "truncated zlib stream".to_string(),
            });
        }
    }
}
