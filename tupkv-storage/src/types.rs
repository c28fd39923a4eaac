//! Core type definitions for the KV object-store contract.

use std::fmt;

/// 128-bit object identifier in the store namespace.
///
/// Treated as an opaque handle by higher layers; the page-storage core
/// reserves the top of the `lo` space for metadata objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub lo: u64,
    pub hi: u64,
}

impl ObjectId {
    pub const fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}.{:016x}", self.hi, self.lo)
    }
}

/// First key level below an object id.
pub type DistributionKey = u64;

/// Second key level below an object id.
pub type AttributeKey = u64;

/// Grouping key for vectored I/O: all values sharing an object id and
/// distribution key travel in one driver request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OidDkey {
    pub oid: ObjectId,
    pub dkey: DistributionKey,
}

impl OidDkey {
    pub const fn new(oid: ObjectId, dkey: DistributionKey) -> Self {
        Self { oid, dkey }
    }
}

/// Upper bound on object-class names accepted by drivers. Fixed by the
/// on-storage anchor layout, which reserves this many bytes for the name.
pub const MAX_OBJECT_CLASS_NAME_LEN: usize = 64;

/// A driver-level object class: a short ASCII name selecting replication
/// and placement for an object. Unknown names are rejected by the driver.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectClass(String);

impl ObjectClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectClass {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}
