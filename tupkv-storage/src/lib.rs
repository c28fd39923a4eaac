//! Driver contract for the two-level KV object store tupkv persists into.
//!
//! A store exposes objects identified by a 128-bit [`ObjectId`]; each
//! object holds a two-level map (distribution key → attribute key →
//! opaque byte value). Drivers provide single-value reads/writes plus
//! vectored I/O batched by `(object id, distribution key)`.
//!
//! [`MemKvDriver`] is the in-process reference driver used by tests and
//! embedders; production drivers implement [`KvDriver`]/[`KvContainer`]
//! over the real transport.

pub mod kv;
pub mod mem_kv;
pub mod types;

pub use kv::{
    DriverError, KvContainer, KvDriver, KvResult, OpenMode, ReadSet, WriteSet, ERR_INVAL,
    ERR_NONEXIST, ERR_NO_PERM, ERR_REC2BIG,
};
pub use mem_kv::{MemKvContainer, MemKvDriver};
pub use types::{
    AttributeKey, DistributionKey, ObjectClass, ObjectId, OidDkey, MAX_OBJECT_CLASS_NAME_LEN,
};
