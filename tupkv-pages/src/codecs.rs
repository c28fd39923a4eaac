//! Manual little-endian codecs for fixed-width record fields.

#![allow(dead_code)]

use tupkv_result::{Error, Result};

#[inline(always)]
pub fn write_u32_le(dst: &mut Vec<u8>, v: u32) {
    dst.extend_from_slice(&v.to_le_bytes());
}

#[inline(always)]
pub fn write_u64_le(dst: &mut Vec<u8>, v: u64) {
    dst.extend_from_slice(&v.to_le_bytes());
}

#[inline(always)]
pub fn read_u32_le(src: &[u8], o: &mut usize) -> u32 {
    let v = u32::from_le_bytes(src[*o..*o + 4].try_into().unwrap());
    *o += 4;
    v
}

#[inline(always)]
pub fn read_u64_le(src: &[u8], o: &mut usize) -> u64 {
    let v = u64::from_le_bytes(src[*o..*o + 8].try_into().unwrap());
    *o += 8;
    v
}

/// Bounds-checked variants for bytes read back from storage. The plain
/// readers above are for buffers whose length was already validated.
#[inline]
pub fn try_read_u32_le(src: &[u8], o: &mut usize) -> Result<u32> {
    if src.len() < *o + 4 {
        return Err(Error::corrupt("unexpected end of record"));
    }
    Ok(read_u32_le(src, o))
}

#[inline]
pub fn try_read_u64_le(src: &[u8], o: &mut usize) -> Result<u64> {
    if src.len() < *o + 8 {
        return Err(Error::corrupt("unexpected end of record"));
    }
    Ok(read_u64_le(src, o))
}
