//! Logical pages and the heap allocator backing them.

use crate::types::{ClusterId, ColumnId};

/// The element window a page covers once it is attached to a cluster:
/// the global index of its first element plus the cluster coordinates
/// needed for cluster-local lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub global_first: u64,
    pub cluster_id: ClusterId,
    /// Global index of the first element the column stores in this
    /// cluster.
    pub column_offset: u64,
}

/// A contiguous run of column values; the unit of I/O and compression.
/// The page owns its buffer; dropping the page releases it.
#[derive(Debug, Default)]
pub struct Page {
    column_id: ColumnId,
    buf: Box<[u8]>,
    element_size: usize,
    n_elements: usize,
    window: Option<PageWindow>,
}

impl Page {
    pub(crate) fn new(
        column_id: ColumnId,
        buf: Box<[u8]>,
        element_size: usize,
        n_elements: usize,
    ) -> Self {
        debug_assert_eq!(buf.len(), element_size * n_elements);
        Self {
            column_id,
            buf,
            element_size,
            n_elements,
            window: None,
        }
    }

    /// A page with no buffer; drops nothing.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.n_elements == 0
    }

    pub fn column_id(&self) -> ColumnId {
        self.column_id
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    pub fn n_bytes(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Attach the element window; called once the page's place in the
    /// dataset is known.
    pub fn set_window(&mut self, global_first: u64, cluster_id: ClusterId, column_offset: u64) {
        self.window = Some(PageWindow {
            global_first,
            cluster_id,
            column_offset,
        });
    }

    pub fn window(&self) -> Option<PageWindow> {
        self.window
    }

    /// Whether this page covers the given global element index.
    pub fn contains_global(&self, index: u64) -> bool {
        match self.window {
            Some(w) => index >= w.global_first && index < w.global_first + self.n_elements as u64,
            None => false,
        }
    }

    /// Whether this page covers the given cluster-local element index.
    pub fn contains_local(&self, cluster_id: ClusterId, index_in_cluster: u64) -> bool {
        match self.window {
            Some(w) => {
                w.cluster_id == cluster_id
                    && self.contains_global(w.column_offset + index_in_cluster)
            }
            None => false,
        }
    }
}

/// Heap allocator for page memory.
pub struct PageAllocator;

impl PageAllocator {
    /// Allocate an empty page with capacity for `n_elements` values.
    pub fn new_page(column_id: ColumnId, element_size: usize, n_elements: usize) -> Page {
        let buf = vec![0u8; element_size * n_elements].into_boxed_slice();
        Page::new(column_id, buf, element_size, n_elements)
    }

    /// Wrap an existing buffer, taking ownership of it.
    pub fn new_page_from_buf(
        column_id: ColumnId,
        buf: Vec<u8>,
        element_size: usize,
        n_elements: usize,
    ) -> Page {
        Page::new(column_id, buf.into_boxed_slice(), element_size, n_elements)
    }
}
