//! Thread-safe registry of decompressed pages.
//!
//! Pages enter the pool with a reference count of one (`register_page`,
//! the synchronous populate path) or zero (`preload_page`, background
//! decompression). Every `get_page_*` hit bumps the count; `return_page`
//! drops it and evicts the entry at zero.

use crate::page::Page;
use crate::types::{ClusterIndex, ColumnId};
use std::sync::{Arc, Mutex};

struct Entry {
    page: Arc<Page>,
    refs: usize,
}

#[derive(Default)]
pub struct PagePool {
    entries: Mutex<Vec<Entry>>,
}

impl PagePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a page on behalf of a caller that keeps using it; returns
    /// the shared handle.
    pub fn register_page(&self, page: Page) -> Arc<Page> {
        let page = Arc::new(page);
        let mut entries = self.entries.lock().unwrap();
        entries.push(Entry {
            page: Arc::clone(&page),
            refs: 1,
        });
        page
    }

    /// Insert a page nobody holds yet. Observable to subsequent gets;
    /// evicted once a holder returns it.
    pub fn preload_page(&self, page: Page) {
        let mut entries = self.entries.lock().unwrap();
        entries.push(Entry {
            page: Arc::new(page),
            refs: 0,
        });
    }

    /// Look up a page covering `global_index` of `column_id`.
    pub fn get_page_global(&self, column_id: ColumnId, global_index: u64) -> Option<Arc<Page>> {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            if entry.page.column_id() == column_id && entry.page.contains_global(global_index) {
                entry.refs += 1;
                return Some(Arc::clone(&entry.page));
            }
        }
        None
    }

    /// Look up a page covering a cluster-local index of `column_id`.
    pub fn get_page_local(&self, column_id: ColumnId, index: ClusterIndex) -> Option<Arc<Page>> {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            if entry.page.column_id() == column_id
                && entry.page.contains_local(index.cluster_id, index.index)
            {
                entry.refs += 1;
                return Some(Arc::clone(&entry.page));
            }
        }
        None
    }

    /// Give back a page obtained from this pool. The entry is evicted
    /// once its count reaches zero.
    pub fn return_page(&self, page: &Arc<Page>) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(pos) = entries.iter().position(|e| Arc::ptr_eq(&e.page, page)) {
            let refs = entries[pos].refs.saturating_sub(1);
            if refs == 0 {
                entries.remove(pos);
            } else {
                entries[pos].refs = refs;
            }
        }
    }

    /// Number of pages currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageAllocator;

    fn page_with_window(column_id: ColumnId, first: u64, n: usize) -> Page {
        let mut page = PageAllocator::new_page(column_id, 4, n);
        page.set_window(first, 0, 0);
        page
    }

    #[test]
    fn register_get_return() {
        let pool = PagePool::new();
        let held = pool.register_page(page_with_window(1, 0, 8));

        let hit = pool.get_page_global(1, 3).expect("should hit");
        assert!(Arc::ptr_eq(&held, &hit));
        assert!(pool.get_page_global(1, 8).is_none());
        assert!(pool.get_page_global(2, 3).is_none());

        // Two holders: caller + get. Entry survives one return.
        pool.return_page(&hit);
        assert_eq!(pool.len(), 1);
        pool.return_page(&held);
        assert!(pool.is_empty());
    }

    #[test]
    fn preloaded_pages_are_observable_then_evicted() {
        let pool = PagePool::new();
        pool.preload_page(page_with_window(1, 0, 4));

        let got = pool.get_page_global(1, 0).expect("preload observable");
        pool.return_page(&got);
        assert!(pool.is_empty());
    }
}
