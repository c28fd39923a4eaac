//! The driver traits: containers of two-level KV objects with single and
//! vectored I/O.

use crate::types::{AttributeKey, DistributionKey, ObjectClass, ObjectId, OidDkey};
use rustc_hash::FxHashMap;
use std::fmt;

/// Driver error code: no such pool, container, or value.
pub const ERR_NONEXIST: i32 = -1005;
/// Driver error code: operation not permitted (e.g. write to a read-only
/// container).
pub const ERR_NO_PERM: i32 = -1001;
/// Driver error code: invalid argument.
pub const ERR_INVAL: i32 = -1003;
/// Driver error code: record does not fit the provided buffer.
pub const ERR_REC2BIG: i32 = -1007;

/// Translate a driver error code into a short human-readable string.
pub fn strerror(code: i32) -> &'static str {
    match code {
        ERR_NONEXIST => "no such pool, container, or value",
        ERR_NO_PERM => "operation not permitted",
        ERR_INVAL => "invalid argument",
        ERR_REC2BIG => "record too big for buffer",
        _ => "unknown driver error",
    }
}

/// Error surfaced by a KV driver: an integer code plus call context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverError {
    pub code: i32,
    pub context: String,
}

impl DriverError {
    pub fn new(code: i32, context: impl Into<String>) -> Self {
        Self {
            code,
            context: context.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, strerror(self.code))
    }
}

impl std::error::Error for DriverError {}

/// Result alias for driver-level operations.
pub type KvResult<T> = std::result::Result<T, DriverError>;

/// How to open a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Pool and container must already exist; writes are rejected.
    ReadOnly,
    /// Create the pool/container if absent; writes allowed.
    CreateIfAbsent,
}

/// A vectored write request: `(oid, dkey)` → attribute key → value bytes.
/// One driver round-trip per call regardless of how many groups it holds.
pub type WriteSet<'a> = FxHashMap<OidDkey, FxHashMap<AttributeKey, &'a [u8]>>;

/// A vectored read request: `(oid, dkey)` → attribute key → destination
/// slice. The driver fills each slice with the stored value.
pub type ReadSet<'a> = FxHashMap<OidDkey, FxHashMap<AttributeKey, &'a mut [u8]>>;

/// Entry point to a KV store deployment: opens containers by pool and
/// container label.
pub trait KvDriver: Send + Sync + 'static {
    type Container: KvContainer;

    fn open_container(
        &self,
        pool_label: &str,
        container_label: &str,
        mode: OpenMode,
    ) -> KvResult<Self::Container>;

    /// Whether `name` is an object class this driver recognizes.
    fn object_class_known(&self, name: &str) -> bool;
}

/// An open container: a namespace of two-level KV objects.
pub trait KvContainer: Send + Sync + 'static {
    /// Set the object class applied to values written without an explicit
    /// class.
    fn set_default_object_class(&self, class: &ObjectClass) -> KvResult<()>;

    fn default_object_class(&self) -> ObjectClass;

    fn write_single(
        &self,
        oid: ObjectId,
        dkey: DistributionKey,
        akey: AttributeKey,
        class: Option<&ObjectClass>,
        value: &[u8],
    ) -> KvResult<()>;

    /// Read the value at a key into `buf`. Copies at most `buf.len()`
    /// bytes and returns the number copied.
    fn read_single(
        &self,
        oid: ObjectId,
        dkey: DistributionKey,
        akey: AttributeKey,
        class: Option<&ObjectClass>,
        buf: &mut [u8],
    ) -> KvResult<usize>;

    /// Grouped batched write; all groups land in one driver request.
    fn write_v(&self, requests: &WriteSet<'_>) -> KvResult<()>;

    /// Grouped batched read; fills every destination slice or fails as a
    /// whole.
    fn read_v(&self, requests: &mut ReadSet<'_>) -> KvResult<()>;
}
