//! Well-known KV coordinates and the page key mapping.
//!
//! The constants below are compatibility-critical: they must stay fixed
//! for any implementation that interoperates with existing datasets.

use crate::types::{ClusterId, ColumnId};
use tupkv_storage::{AttributeKey, DistributionKey, ObjectClass, ObjectId};

/// Distribution key for metadata and pagelist values; also used for pages
/// under the `OidPerPage` mapping.
pub const DKEY_DEFAULT: DistributionKey = 0x5a3c_69f0_cafe_4a11;

/// Attribute key for pages under the `OidPerPage` mapping.
pub const AKEY_DEFAULT: AttributeKey = 0x4243_544b_5344_4229;
/// Attribute key of the anchor record.
pub const AKEY_ANCHOR: AttributeKey = 0x4243_544b_5344_422a;
/// Attribute key of the compressed header.
pub const AKEY_HEADER: AttributeKey = 0x4243_544b_5344_422b;
/// Attribute key of the compressed footer.
pub const AKEY_FOOTER: AttributeKey = 0x4243_544b_5344_422c;

/// Object holding anchor, header, and footer.
pub const OID_METADATA: ObjectId = ObjectId::new(u64::MAX, 0);
/// Object holding the per-cluster-group pagelists, keyed by group
/// sequence number.
pub const OID_PAGE_LIST: ObjectId = ObjectId::new(u64::MAX - 1, 0);

/// Object class used for all metadata payloads, independent of the
/// dataset's default class.
pub const METADATA_CLASS_NAME: &str = "SX";

pub fn metadata_class() -> ObjectClass {
    ObjectClass::new(METADATA_CLASS_NAME)
}

/// How pages are laid out across KV coordinates. A build-time choice:
/// readers must use the variant the writer used; it is not recorded in
/// the anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyMapping {
    /// One object per cluster; columns spread over distribution keys and
    /// pages over attribute keys.
    #[default]
    OidPerCluster,
    /// One object per page, under the default distribution/attribute
    /// keys.
    OidPerPage,
}

/// Default mapping used by the sink and the source.
pub const DEFAULT_KEY_MAPPING: KeyMapping = KeyMapping::OidPerCluster;

/// Full KV coordinate of one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KvKey {
    pub oid: ObjectId,
    pub dkey: DistributionKey,
    pub akey: AttributeKey,
}

/// Deterministic `(cluster, column, page-seq) → (oid, dkey, akey)`
/// mapping, stable across sessions.
pub fn page_key(
    mapping: KeyMapping,
    cluster_id: ClusterId,
    column_id: ColumnId,
    page_seq: u64,
) -> KvKey {
    match mapping {
        KeyMapping::OidPerCluster => KvKey {
            oid: ObjectId::new(cluster_id, 0),
            dkey: column_id,
            akey: page_seq,
        },
        KeyMapping::OidPerPage => KvKey {
            oid: ObjectId::new(page_seq, 0),
            dkey: DKEY_DEFAULT,
            akey: AKEY_DEFAULT,
        },
    }
}
