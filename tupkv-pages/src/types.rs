//! Core identifier and payload types shared by the sink and the source.

/// Logical column identifier within a dataset.
pub type ColumnId = u64;

/// Cluster identifier; clusters are numbered sequentially from zero in
/// commit order.
pub type ClusterId = u64;

/// Global element index within a column.
pub type EntryIndex = u64;

/// Address of an element relative to the start of one cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterIndex {
    pub cluster_id: ClusterId,
    pub index: u64,
}

impl ClusterIndex {
    pub const fn new(cluster_id: ClusterId, index: u64) -> Self {
        Self { cluster_id, index }
    }
}

/// Where a payload lives: `position` is the page sequence number (for
/// pages) or the cluster-group sequence number (for pagelists);
/// `bytes_on_storage` is the stored (compressed) size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Locator {
    pub position: u64,
    pub bytes_on_storage: u64,
}

/// A caller's handle to an active column: its id plus the in-memory
/// element size used to size decompressed pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnHandle {
    pub id: ColumnId,
    pub element_size: usize,
}

/// A page after seal: the compressed+framed bytes and the element count
/// needed to unseal it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPage {
    pub buf: Vec<u8>,
    pub n_elements: u32,
}

impl SealedPage {
    pub fn size(&self) -> usize {
        self.buf.len()
    }
}

/// A run of sealed pages belonging to one column, used by the batched
/// commit path.
#[derive(Clone, Copy, Debug)]
pub struct SealedPageGroup<'a> {
    pub column_id: ColumnId,
    pub pages: &'a [SealedPage],
}

impl<'a> SealedPageGroup<'a> {
    pub fn new(column_id: ColumnId, pages: &'a [SealedPage]) -> Self {
        Self { column_id, pages }
    }
}

/// Size and element count of a sealed page, as reported by
/// `load_sealed_page`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SealedPageInfo {
    pub size: u64,
    pub n_elements: u32,
}
