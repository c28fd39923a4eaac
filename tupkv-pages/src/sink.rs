//! The page sink: writes a dataset into a KV container.
//!
//! Pages are sealed, given monotonically increasing sequence numbers, and
//! written either one key at a time or as vectored writes grouped by
//! `(object id, distribution key)`. Finalization writes the cluster-group
//! pagelists, the footer, and last of all the anchor; the anchor write is
//! the dataset's commit point.

use crate::anchor::DatasetAnchor;
use crate::keys::{
    metadata_class, page_key, AKEY_ANCHOR, AKEY_FOOTER, AKEY_HEADER, DEFAULT_KEY_MAPPING,
    DKEY_DEFAULT, OID_METADATA, OID_PAGE_LIST,
};
use crate::metrics::SinkMetrics;
use crate::options::WriteOptions;
use crate::page::{Page, PageAllocator};
use crate::types::{ColumnHandle, Locator, SealedPage, SealedPageGroup};
use crate::uri::DatasetUri;
use crate::zip::{seal_page, zip};
use tupkv_result::{Error, Result};
use tupkv_storage::{
    AttributeKey, KvContainer, KvDriver, ObjectClass, OidDkey, OpenMode, WriteSet,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Writer for one dataset. Single-writer: one sink per dataset at a time.
pub struct PageSink<D: KvDriver> {
    name: String,
    uri: DatasetUri,
    options: WriteOptions,
    driver: Arc<D>,
    container: OnceLock<D::Container>,
    anchor: Mutex<DatasetAnchor>,
    page_seq: AtomicU64,
    cluster_group_seq: AtomicU64,
    n_clusters_committed: AtomicU64,
    n_bytes_current_cluster: AtomicU64,
    metrics: SinkMetrics,
}

impl<D: KvDriver> PageSink<D> {
    /// Bind a dataset name and URI. The pool and container are opened
    /// lazily by [`PageSink::create`].
    pub fn new(
        name: impl Into<String>,
        uri: &str,
        options: WriteOptions,
        driver: Arc<D>,
    ) -> Result<Self> {
        let name = name.into();
        let uri = DatasetUri::parse(uri)?;
        tracing::warn!(
            dataset = %name,
            "the KV page-storage backend is experimental; do not store real data yet"
        );
        Ok(Self {
            name,
            uri,
            options,
            driver,
            container: OnceLock::new(),
            anchor: Mutex::new(DatasetAnchor::default()),
            page_seq: AtomicU64::new(0),
            cluster_group_seq: AtomicU64::new(0),
            n_clusters_committed: AtomicU64::new(0),
            n_bytes_current_cluster: AtomicU64::new(0),
            metrics: SinkMetrics::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    /// Snapshot of the anchor as it would be written right now.
    pub fn anchor(&self) -> DatasetAnchor {
        self.anchor.lock().unwrap().clone()
    }

    fn container(&self) -> Result<&D::Container> {
        self.container
            .get()
            .ok_or_else(|| Error::Internal("create() has not been called".to_string()))
    }

    fn write_meta(&self, akey: AttributeKey, bytes: &[u8]) -> Result<()> {
        self.container()?
            .write_single(
                OID_METADATA,
                DKEY_DEFAULT,
                akey,
                Some(&metadata_class()),
                bytes,
            )
            .map_err(|e| Error::write_failed(e.code, e))
    }

    /// Commit the schema: resolve the object class, open the pool and
    /// create the container, then compress and write the header.
    pub fn create(&self, serialized_header: &[u8]) -> Result<()> {
        let class_name = self.options.object_class.clone();
        if !self.driver.object_class_known(&class_name) {
            return Err(Error::UnknownObjectClass(class_name));
        }

        let container = self
            .driver
            .open_container(&self.uri.pool, &self.uri.container, OpenMode::CreateIfAbsent)
            .map_err(|e| Error::write_failed(e.code, e))?;
        container
            .set_default_object_class(&ObjectClass::new(class_name.as_str()))
            .map_err(|e| Error::write_failed(e.code, e))?;
        if self.container.set(container).is_err() {
            return Err(Error::Internal("create() called twice".to_string()));
        }

        let zipped = zip(serialized_header, self.options.compression_level);
        self.write_meta(AKEY_HEADER, &zipped)?;

        let mut anchor = self.anchor.lock().unwrap();
        anchor.object_class = class_name;
        anchor.len_header = serialized_header.len() as u32;
        anchor.n_bytes_header = zipped.len() as u32;
        tracing::debug!(dataset = %self.name, n_bytes = zipped.len(), "header committed");
        Ok(())
    }

    /// Allocate a fresh page for the caller to fill.
    pub fn reserve_page(&self, handle: ColumnHandle, n_elements: usize) -> Result<Page> {
        if n_elements == 0 {
            return Err(Error::EmptyPage);
        }
        Ok(PageAllocator::new_page(
            handle.id,
            handle.element_size,
            n_elements,
        ))
    }

    /// Seal and commit one page; returns its locator.
    pub fn commit_page(&self, handle: ColumnHandle, page: &Page) -> Result<Locator> {
        let sealed = {
            let _t = self.metrics.time_wall_zip.start();
            seal_page(page, self.options.compression_level)
        };
        self.metrics.sz_zip.add(page.n_bytes() as u64);
        self.commit_sealed_page(handle.id, &sealed)
    }

    /// Commit an already-sealed page at the next page sequence number.
    pub fn commit_sealed_page(&self, column_id: u64, sealed: &SealedPage) -> Result<Locator> {
        let seq = self.page_seq.fetch_add(1, Ordering::Relaxed);
        let cluster_id = self.n_clusters_committed.load(Ordering::Relaxed);
        let key = page_key(DEFAULT_KEY_MAPPING, cluster_id, column_id, seq);

        {
            let _t = self.metrics.time_wall_write.start();
            self.container()?
                .write_single(key.oid, key.dkey, key.akey, None, &sealed.buf)
                .map_err(|e| Error::write_failed(e.code, e))?;
        }

        self.metrics.n_page_committed.inc();
        self.metrics.sz_write_payload.add(sealed.size() as u64);
        self.n_bytes_current_cluster
            .fetch_add(sealed.size() as u64, Ordering::Relaxed);
        Ok(Locator {
            position: seq,
            bytes_on_storage: sealed.size() as u64,
        })
    }

    /// Commit a batch of sealed pages in one vectored write. Requests are
    /// grouped by `(oid, dkey)`; the returned locators match the
    /// flattened `(range, page)` input order.
    pub fn commit_sealed_pages(&self, ranges: &[SealedPageGroup<'_>]) -> Result<Vec<Locator>> {
        let n_pages: usize = ranges.iter().map(|r| r.pages.len()).sum();
        let mut locators = Vec::with_capacity(n_pages);
        let mut requests: WriteSet<'_> = WriteSet::default();

        let cluster_id = self.n_clusters_committed.load(Ordering::Relaxed);
        let mut sz_payload = 0u64;
        for range in ranges {
            for sealed in range.pages {
                let seq = self.page_seq.fetch_add(1, Ordering::Relaxed);
                let key = page_key(DEFAULT_KEY_MAPPING, cluster_id, range.column_id, seq);
                requests
                    .entry(OidDkey::new(key.oid, key.dkey))
                    .or_default()
                    .insert(key.akey, sealed.buf.as_slice());
                locators.push(Locator {
                    position: seq,
                    bytes_on_storage: sealed.size() as u64,
                });
                sz_payload += sealed.size() as u64;
            }
        }
        self.n_bytes_current_cluster
            .fetch_add(sz_payload, Ordering::Relaxed);

        {
            let _t = self.metrics.time_wall_write.start();
            self.container()?
                .write_v(&requests)
                .map_err(|e| Error::write_failed(e.code, e))?;
        }

        self.metrics.n_page_committed.add(n_pages as u64);
        self.metrics.sz_write_payload.add(sz_payload);
        Ok(locators)
    }

    /// Close the current cluster. Writes nothing; subsequent page commits
    /// belong to the next cluster. Returns the sealed bytes accumulated
    /// since the previous commit.
    pub fn commit_cluster(&self, _n_entries: u64) -> u64 {
        self.n_clusters_committed.fetch_add(1, Ordering::Relaxed);
        self.n_bytes_current_cluster.swap(0, Ordering::Relaxed)
    }

    /// Compress and write one cluster-group pagelist at the next group
    /// sequence number.
    pub fn commit_cluster_group(&self, serialized_page_list: &[u8]) -> Result<Locator> {
        let zipped = zip(serialized_page_list, self.options.compression_level);
        let seq = self.cluster_group_seq.fetch_add(1, Ordering::Relaxed);
        self.container()?
            .write_single(
                OID_PAGE_LIST,
                DKEY_DEFAULT,
                seq,
                Some(&metadata_class()),
                &zipped,
            )
            .map_err(|e| Error::write_failed(e.code, e))?;
        self.metrics.sz_write_payload.add(zipped.len() as u64);
        Ok(Locator {
            position: seq,
            bytes_on_storage: zipped.len() as u64,
        })
    }

    /// Finalize the dataset: write the footer, then the anchor. The
    /// anchor only starts after the footer write completed, so a visible
    /// anchor implies a complete dataset.
    pub fn commit_dataset(&self, serialized_footer: &[u8]) -> Result<()> {
        let zipped = zip(serialized_footer, self.options.compression_level);
        self.write_meta(AKEY_FOOTER, &zipped)?;
        {
            let mut anchor = self.anchor.lock().unwrap();
            anchor.len_footer = serialized_footer.len() as u32;
            anchor.n_bytes_footer = zipped.len() as u32;
        }
        self.write_anchor()?;
        tracing::debug!(dataset = %self.name, "dataset committed");
        Ok(())
    }

    fn write_anchor(&self) -> Result<()> {
        let mut buf = self.anchor.lock().unwrap().serialize();
        buf.resize(DatasetAnchor::max_size(), 0);
        self.write_meta(AKEY_ANCHOR, &buf)
    }
}
