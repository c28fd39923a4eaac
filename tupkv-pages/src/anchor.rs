//! The dataset anchor: a small fixed-layout record written last, whose
//! presence marks the dataset as committed.

use crate::codecs::{read_u32_le, write_u32_le};
use tupkv_result::{Error, Result};
use tupkv_storage::MAX_OBJECT_CLASS_NAME_LEN;

/// Anchor layout version this crate writes and understands.
pub const ANCHOR_VERSION: u32 = 1;

/// Bootstrap record for a dataset (little-endian on storage):
///
/// ```text
/// offset 0  : u32 version
/// offset 4  : u32 n_bytes_header   (compressed header size)
/// offset 8  : u32 len_header       (uncompressed header size)
/// offset 12 : u32 n_bytes_footer
/// offset 16 : u32 len_footer
/// offset 20 : u32 class-name length, then that many bytes of UTF-8
/// ```
///
/// Anchors are always written and read in buffers of [`DatasetAnchor::max_size`]
/// bytes; trailing bytes beyond the serialized record are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetAnchor {
    pub version: u32,
    pub n_bytes_header: u32,
    pub len_header: u32,
    pub n_bytes_footer: u32,
    pub len_footer: u32,
    pub object_class: String,
}

impl Default for DatasetAnchor {
    fn default() -> Self {
        Self {
            version: ANCHOR_VERSION,
            n_bytes_header: 0,
            len_header: 0,
            n_bytes_footer: 0,
            len_footer: 0,
            object_class: String::new(),
        }
    }
}

impl DatasetAnchor {
    /// Size of the five fixed u32 fields.
    pub const FIXED_SIZE: usize = 20;

    /// Exact byte length `serialize` produces for this anchor.
    pub fn serialized_size(&self) -> usize {
        Self::FIXED_SIZE + 4 + self.object_class.len()
    }

    /// Upper bound across all valid anchors; the buffer size used for
    /// every anchor write and read.
    pub const fn max_size() -> usize {
        Self::FIXED_SIZE + 4 + MAX_OBJECT_CLASS_NAME_LEN
    }

    /// Serialize into a fresh buffer of exactly `serialized_size()` bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        write_u32_le(&mut buf, self.version);
        write_u32_le(&mut buf, self.n_bytes_header);
        write_u32_le(&mut buf, self.len_header);
        write_u32_le(&mut buf, self.n_bytes_footer);
        write_u32_le(&mut buf, self.len_footer);
        write_u32_le(&mut buf, self.object_class.len() as u32);
        buf.extend_from_slice(self.object_class.as_bytes());
        buf
    }

    /// Deserialize from `buf`, returning the anchor and the number of
    /// bytes consumed. The class-name string is bounded by what remains
    /// of `buf` after the fixed fields.
    pub fn deserialize(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < Self::FIXED_SIZE {
            return Err(Error::AnchorTooShort);
        }
        let mut o = 0usize;
        let version = read_u32_le(buf, &mut o);
        let n_bytes_header = read_u32_le(buf, &mut o);
        let len_header = read_u32_le(buf, &mut o);
        let n_bytes_footer = read_u32_le(buf, &mut o);
        let len_footer = read_u32_le(buf, &mut o);

        if buf.len() < o + 4 {
            return Err(Error::AnchorDecodeFailed(
                "truncated class-name length".to_string(),
            ));
        }
        let name_len = read_u32_le(buf, &mut o) as usize;
        if buf.len() < o + name_len {
            return Err(Error::AnchorDecodeFailed(
                "truncated class-name string".to_string(),
            ));
        }
        let object_class = std::str::from_utf8(&buf[o..o + name_len])
            .map_err(|e| Error::AnchorDecodeFailed(e.to_string()))?
            .to_string();
        o += name_len;

        Ok((
            Self {
                version,
                n_bytes_header,
                len_header,
                n_bytes_footer,
                len_footer,
                object_class,
            },
            o,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DatasetAnchor {
        DatasetAnchor {
            version: ANCHOR_VERSION,
            n_bytes_header: 120,
            len_header: 400,
            n_bytes_footer: 33,
            len_footer: 64,
            object_class: "SX".to_string(),
        }
    }

    #[test]
    fn round_trip() {
        let anchor = sample();
        let bytes = anchor.serialize();
        assert_eq!(bytes.len(), anchor.serialized_size());
        let (back, consumed) = DatasetAnchor::deserialize(&bytes).unwrap();
        assert_eq!(back, anchor);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let anchor = sample();
        let mut bytes = anchor.serialize();
        bytes.resize(DatasetAnchor::max_size(), 0xAB);
        let (back, consumed) = DatasetAnchor::deserialize(&bytes).unwrap();
        assert_eq!(back, anchor);
        assert_eq!(consumed, anchor.serialized_size());
    }

    #[test]
    fn short_buffer_fails() {
        let bytes = sample().serialize();
        assert!(matches!(
            DatasetAnchor::deserialize(&bytes[..16]),
            Err(Error::AnchorTooShort)
        ));
    }

    #[test]
    fn truncated_string_fails() {
        let bytes = sample().serialize();
        assert!(matches!(
            DatasetAnchor::deserialize(&bytes[..22]),
            Err(Error::AnchorDecodeFailed(_))
        ));
        assert!(matches!(
            DatasetAnchor::deserialize(&bytes[..bytes.len() - 1]),
            Err(Error::AnchorDecodeFailed(_))
        ));
    }

    #[test]
    fn max_size_bounds_every_anchor() {
        let mut anchor = sample();
        anchor.object_class = "X".repeat(tupkv_storage::MAX_OBJECT_CLASS_NAME_LEN);
        assert!(anchor.serialized_size() <= DatasetAnchor::max_size());
    }
}
