//! Seal/unseal: compression and framing of byte payloads.
//!
//! A payload whose stored size equals its uncompressed size is raw; a
//! smaller one is a zstd frame. The writer guarantees it never stores a
//! compressed payload that failed to shrink, so the sizes recorded in the
//! anchor and descriptors are enough to pick the decode path.

use crate::page::Page;
use crate::types::SealedPage;
use tupkv_result::{Error, Result};

/// Compress `src` at the given level. Level 0 disables compression, as
/// does any compression result that fails to shrink the input.
pub fn zip(src: &[u8], level: i32) -> Vec<u8> {
    if level > 0 {
        if let Ok(z) = zstd::bulk::compress(src, level) {
            if z.len() < src.len() {
                return z;
            }
        }
    }
    src.to_vec()
}

/// Decompress `src` back to exactly `expected_len` bytes.
pub fn unzip(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    if src.len() == expected_len {
        return Ok(src.to_vec());
    }
    let out = zstd::bulk::decompress(src, expected_len)
        .map_err(|e| Error::corrupt(format!("zstd decode: {e}")))?;
    if out.len() != expected_len {
        return Err(Error::corrupt(format!(
            "decompressed {} bytes, expected {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}

/// Seal a page: compress its buffer and record the element count needed
/// to unseal it.
pub fn seal_page(page: &Page, level: i32) -> SealedPage {
    SealedPage {
        buf: zip(page.as_bytes(), level),
        n_elements: page.n_elements() as u32,
    }
}

/// Unseal a page payload back into a raw element buffer.
pub fn unseal_page(sealed: &[u8], n_elements: usize, element_size: usize) -> Result<Vec<u8>> {
    unzip(sealed, n_elements * element_size)
}
