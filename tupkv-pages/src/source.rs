//! The page source: reads a dataset back out of a KV container.
//!
//! `attach` bootstraps from the anchor and rebuilds the descriptor; page
//! populates go either through direct single-key reads (cluster cache
//! off) or through the prefetching cluster pool, with decompression on
//! the caller thread or fanned out over rayon workers.

use crate::anchor::{DatasetAnchor, ANCHOR_VERSION};
use crate::cluster::{Cluster, ClusterKey, OnDiskPage, OnDiskPageKey};
use crate::cluster_pool::{ClusterFetcher, ClusterPool};
use crate::descriptor::{DatasetDescriptor, DescriptorBuilder, PageDetail};
use crate::keys::{
    metadata_class, page_key, AKEY_ANCHOR, AKEY_FOOTER, AKEY_HEADER, DEFAULT_KEY_MAPPING,
    DKEY_DEFAULT, OID_METADATA, OID_PAGE_LIST,
};
use crate::metrics::SourceMetrics;
use crate::options::ReadOptions;
use crate::page::{Page, PageAllocator};
use crate::pool::PagePool;
use crate::types::{ClusterId, ClusterIndex, ColumnHandle, ColumnId, SealedPageInfo};
use crate::uri::DatasetUri;
use crate::zip::{unseal_page, unzip};
use rustc_hash::{FxHashMap, FxHashSet};
use tupkv_result::{Error, Result};
use tupkv_storage::{
    AttributeKey, KvContainer, KvDriver, ObjectClass, OidDkey, OpenMode, ReadSet,
};

use std::sync::{Arc, Mutex, RwLock};

struct SourceInner<D: KvDriver> {
    name: String,
    options: ReadOptions,
    driver: Arc<D>,
    container: D::Container,
    descriptor: RwLock<Option<DatasetDescriptor>>,
    anchor: Mutex<Option<DatasetAnchor>>,
    page_pool: PagePool,
    metrics: SourceMetrics,
}

impl<D: KvDriver> SourceInner<D> {
    fn read_meta(&self, akey: AttributeKey, buf: &mut [u8]) -> Result<usize> {
        self.metrics.n_read.inc();
        self.container
            .read_single(OID_METADATA, DKEY_DEFAULT, akey, Some(&metadata_class()), buf)
            .map_err(|e| Error::read_failed(e.code, e))
    }

    /// Read a compressed metadata blob of known stored size and
    /// decompress it to its recorded length.
    fn read_meta_blob(&self, akey: AttributeKey, n_bytes: u32, len: u32) -> Result<Vec<u8>> {
        let mut zipped = vec![0u8; n_bytes as usize];
        let n = self.read_meta(akey, &mut zipped)?;
        if n != zipped.len() {
            return Err(Error::corrupt(format!(
                "metadata record holds {n} bytes, expected {}",
                zipped.len()
            )));
        }
        unzip(&zipped, len as usize)
    }

    fn with_descriptor<T>(&self, f: impl FnOnce(&DatasetDescriptor) -> Result<T>) -> Result<T> {
        let guard = self.descriptor.read().unwrap();
        let desc = guard
            .as_ref()
            .ok_or_else(|| Error::Internal("attach() has not been called".to_string()))?;
        f(desc)
    }
}

impl<D: KvDriver> ClusterFetcher for SourceInner<D> {
    /// Vectored load: one arena per requested cluster, one `read_v` for
    /// the whole request, results in input order.
    fn load_clusters(&self, keys: &[ClusterKey]) -> Result<Vec<Cluster>> {
        struct SealedLoc {
            cluster_id: ClusterId,
            column_id: ColumnId,
            position: u64,
            size: usize,
            buf_pos: usize,
        }

        let mut per_cluster: Vec<(Vec<SealedLoc>, FxHashMap<OnDiskPageKey, OnDiskPage>)> =
            Vec::with_capacity(keys.len());
        let mut arena_sizes = Vec::with_capacity(keys.len());
        let mut n_pages = 0u64;
        let mut sz_payload = 0u64;
        {
            let guard = self.descriptor.read().unwrap();
            let desc = guard
                .as_ref()
                .ok_or_else(|| Error::Internal("attach() has not been called".to_string()))?;
            for key in keys {
                self.metrics.n_cluster_loaded.inc();
                let cluster_desc = desc.cluster(key.cluster_id)?;
                let mut locs = Vec::new();
                let mut page_map = FxHashMap::default();
                let mut buf_sz = 0usize;
                let mut column_ids: Vec<ColumnId> = key.columns.iter().copied().collect();
                column_ids.sort_unstable();
                for column_id in column_ids {
                    let page_range = cluster_desc.page_range(column_id)?;
                    for (page_no, pi) in page_range.page_infos.iter().enumerate() {
                        let size = pi.locator.bytes_on_storage as usize;
                        locs.push(SealedLoc {
                            cluster_id: key.cluster_id,
                            column_id,
                            position: pi.locator.position,
                            size,
                            buf_pos: buf_sz,
                        });
                        page_map.insert(
                            OnDiskPageKey::new(column_id, page_no as u64),
                            OnDiskPage {
                                offset: buf_sz,
                                len: size,
                            },
                        );
                        buf_sz += size;
                        n_pages += 1;
                    }
                }
                sz_payload += buf_sz as u64;
                arena_sizes.push(buf_sz);
                per_cluster.push((locs, page_map));
            }
        }

        let mut arenas: Vec<Box<[u8]>> = arena_sizes
            .iter()
            .map(|&sz| vec![0u8; sz].into_boxed_slice())
            .collect();

        // Carve each arena into per-page destination slices and batch the
        // requests by (oid, dkey).
        let mut requests: ReadSet<'_> = ReadSet::default();
        for ((locs, _), arena) in per_cluster.iter().zip(arenas.iter_mut()) {
            let mut rest: &mut [u8] = arena;
            let mut carved = 0usize;
            for loc in locs {
                debug_assert_eq!(carved, loc.buf_pos);
                let (slice, tail) = rest.split_at_mut(loc.size);
                rest = tail;
                carved += loc.size;
                let key = page_key(
                    DEFAULT_KEY_MAPPING,
                    loc.cluster_id,
                    loc.column_id,
                    loc.position,
                );
                requests
                    .entry(OidDkey::new(key.oid, key.dkey))
                    .or_default()
                    .insert(key.akey, slice);
            }
        }

        self.metrics.n_page_loaded.add(n_pages);
        self.metrics.sz_read_payload.add(sz_payload);
        self.metrics.n_read_v.inc();
        self.metrics.n_read.add(n_pages);
        {
            let _t = self.metrics.time_wall_read.start();
            self.container
                .read_v(&mut requests)
                .map_err(|e| Error::read_failed(e.code, e))?;
        }
        drop(requests);

        let mut result = Vec::with_capacity(keys.len());
        for (key, ((_, page_map), arena)) in keys
            .iter()
            .zip(per_cluster.into_iter().zip(arenas.into_iter()))
        {
            result.push(Cluster::new(
                key.cluster_id,
                arena,
                page_map,
                key.columns.clone(),
            ));
        }
        tracing::trace!(
            n_clusters = keys.len(),
            n_pages,
            sz_payload,
            "clusters loaded"
        );
        Ok(result)
    }

    /// Decompress every page of the cluster on the rayon pool, preloading
    /// the results into the page pool. Tasks operate on disjoint pages;
    /// per-column cursors are captured by value at task creation.
    fn unzip_cluster(&self, cluster: &Cluster) -> Result<()> {
        let _t = self.metrics.time_wall_unzip.start();

        struct UnzipTask {
            column_id: ColumnId,
            element_size: usize,
            page_no: u64,
            first_in_page: u64,
            n_elements: u32,
            index_offset: u64,
            expected_size: u64,
        }

        let mut tasks = Vec::new();
        {
            let guard = self.descriptor.read().unwrap();
            let desc = guard
                .as_ref()
                .ok_or_else(|| Error::Internal("attach() has not been called".to_string()))?;
            let cluster_desc = desc.cluster(cluster.id())?;
            for column_id in cluster.avail_columns() {
                let element_size = desc.column(column_id)?.element_size as usize;
                let index_offset = cluster_desc.column_range(column_id)?.first_element_index;
                let mut first_in_page = 0u64;
                for (page_no, pi) in cluster_desc
                    .page_range(column_id)?
                    .page_infos
                    .iter()
                    .enumerate()
                {
                    tasks.push(UnzipTask {
                        column_id,
                        element_size,
                        page_no: page_no as u64,
                        first_in_page,
                        n_elements: pi.n_elements,
                        index_offset,
                        expected_size: pi.locator.bytes_on_storage,
                    });
                    first_in_page += pi.n_elements as u64;
                }
            }
        }

        let n_tasks = tasks.len() as u64;
        let failure: Mutex<Option<Error>> = Mutex::new(None);
        rayon::scope(|s| {
            for task in tasks {
                let failure = &failure;
                s.spawn(move |_| {
                    let unzip_one = || -> Result<()> {
                        let key = OnDiskPageKey::new(task.column_id, task.page_no);
                        let sealed = cluster.on_disk_page(&key).ok_or_else(|| {
                            Error::corrupt(format!(
                                "page {}/{} missing from cluster {}",
                                task.column_id,
                                task.page_no,
                                cluster.id()
                            ))
                        })?;
                        if sealed.len() as u64 != task.expected_size {
                            return Err(Error::corrupt(format!(
                                "page {}/{} holds {} bytes, descriptor says {}",
                                task.column_id,
                                task.page_no,
                                sealed.len(),
                                task.expected_size
                            )));
                        }
                        let raw =
                            unseal_page(sealed, task.n_elements as usize, task.element_size)?;
                        let mut page = PageAllocator::new_page_from_buf(
                            task.column_id,
                            raw,
                            task.element_size,
                            task.n_elements as usize,
                        );
                        page.set_window(
                            task.index_offset + task.first_in_page,
                            cluster.id(),
                            task.index_offset,
                        );
                        self.metrics
                            .sz_unzip
                            .add((task.element_size * task.n_elements as usize) as u64);
                        self.page_pool.preload_page(page);
                        Ok(())
                    };
                    if let Err(e) = unzip_one() {
                        let mut failure = failure.lock().unwrap();
                        if failure.is_none() {
                            *failure = Some(e);
                        }
                    }
                });
            }
        });
        if let Some(e) = failure.into_inner().unwrap() {
            return Err(e);
        }
        self.metrics.n_page_populated.add(n_tasks);
        Ok(())
    }

    fn n_clusters(&self) -> u64 {
        self.with_descriptor(|d| Ok(d.n_clusters())).unwrap_or(0)
    }
}

/// Reader for one dataset.
pub struct PageSource<D: KvDriver> {
    inner: Arc<SourceInner<D>>,
    cluster_pool: ClusterPool,
    current_cluster: Mutex<Option<Arc<Cluster>>>,
    active_columns: Mutex<FxHashSet<ColumnId>>,
}

impl<D: KvDriver> PageSource<D> {
    /// Bind a dataset name and URI; opens the container read-only.
    pub fn new(
        name: impl Into<String>,
        uri: &str,
        options: ReadOptions,
        driver: Arc<D>,
    ) -> Result<Self> {
        let parsed = DatasetUri::parse(uri)?;
        let container = driver
            .open_container(&parsed.pool, &parsed.container, OpenMode::ReadOnly)
            .map_err(|e| Error::read_failed(e.code, e))?;
        let inner = Arc::new(SourceInner {
            name: name.into(),
            options: options.clone(),
            driver,
            container,
            descriptor: RwLock::new(None),
            anchor: Mutex::new(None),
            page_pool: PagePool::new(),
            metrics: SourceMetrics::default(),
        });
        let cluster_pool = ClusterPool::new(
            Arc::clone(&inner) as Arc<dyn ClusterFetcher>,
            options.cluster_bunch_size,
            options.parallel_unzip,
        );
        Ok(Self {
            inner,
            cluster_pool,
            current_cluster: Mutex::new(None),
            active_columns: Mutex::new(FxHashSet::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn metrics(&self) -> &SourceMetrics {
        &self.inner.metrics
    }

    /// The anchor recovered by `attach`.
    pub fn anchor(&self) -> Option<DatasetAnchor> {
        self.inner.anchor.lock().unwrap().clone()
    }

    /// The container's default object class, as set from the anchor.
    pub fn object_class(&self) -> String {
        self.inner.container.default_object_class().to_string()
    }

    /// One-shot bootstrap: anchor → header → footer → pagelists. Returns
    /// the assembled descriptor and retains a copy for page lookups.
    pub fn attach(&self) -> Result<DatasetDescriptor> {
        let inner = &self.inner;

        let mut buf = vec![0u8; DatasetAnchor::max_size()];
        let n = inner.read_meta(AKEY_ANCHOR, &mut buf)?;
        let (anchor, _) = DatasetAnchor::deserialize(&buf[..n])?;
        if anchor.version != ANCHOR_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported anchor version {}",
                anchor.version
            )));
        }
        if !inner.driver.object_class_known(&anchor.object_class) {
            return Err(Error::UnknownObjectClass(anchor.object_class));
        }
        inner
            .container
            .set_default_object_class(&ObjectClass::new(anchor.object_class.as_str()))
            .map_err(|e| Error::read_failed(e.code, e))?;

        let mut builder = DescriptorBuilder::default();
        let header = inner.read_meta_blob(AKEY_HEADER, anchor.n_bytes_header, anchor.len_header)?;
        builder.ingest_header(&header)?;
        let footer = inner.read_meta_blob(AKEY_FOOTER, anchor.n_bytes_footer, anchor.len_footer)?;
        builder.ingest_footer(&footer)?;

        let groups: Vec<(u64, u64, u64)> = builder
            .cluster_groups()
            .iter()
            .map(|g| {
                (
                    g.page_list_locator.position,
                    g.page_list_locator.bytes_on_storage,
                    g.page_list_length,
                )
            })
            .collect();
        for (position, bytes_on_storage, length) in groups {
            let mut zipped = vec![0u8; bytes_on_storage as usize];
            inner.metrics.n_read.inc();
            let n = inner
                .container
                .read_single(
                    OID_PAGE_LIST,
                    DKEY_DEFAULT,
                    position,
                    Some(&metadata_class()),
                    &mut zipped,
                )
                .map_err(|e| Error::read_failed(e.code, e))?;
            if n != zipped.len() {
                return Err(Error::corrupt(format!(
                    "pagelist {position} holds {n} bytes, expected {}",
                    zipped.len()
                )));
            }
            let blob = unzip(&zipped, length as usize)?;
            builder.ingest_page_list(&blob)?;
        }

        let descriptor = builder.build()?;
        *inner.descriptor.write().unwrap() = Some(descriptor.clone());
        *inner.anchor.lock().unwrap() = Some(anchor);
        tracing::debug!(
            dataset = %inner.name,
            n_clusters = descriptor.n_clusters(),
            n_entries = descriptor.n_entries,
            "attached"
        );
        Ok(descriptor)
    }

    /// Activate a column for reading; the handle carries the element
    /// size used to size decompressed pages.
    pub fn add_column(&self, column_id: ColumnId) -> Result<ColumnHandle> {
        let element_size = self
            .inner
            .with_descriptor(|d| Ok(d.column(column_id)?.element_size))?;
        self.active_columns.lock().unwrap().insert(column_id);
        Ok(ColumnHandle {
            id: column_id,
            element_size: element_size as usize,
        })
    }

    pub fn drop_column(&self, column_id: ColumnId) {
        self.active_columns.lock().unwrap().remove(&column_id);
    }

    /// Produce the decompressed page covering `global_index`.
    pub fn populate_page(&self, handle: ColumnHandle, global_index: u64) -> Result<Arc<Page>> {
        if let Some(page) = self.inner.page_pool.get_page_global(handle.id, global_index) {
            return Ok(page);
        }

        let (cluster_id, column_offset, detail, index_in_cluster) =
            self.inner.with_descriptor(|desc| {
                let cluster_id = desc
                    .find_cluster_id(handle.id, global_index)
                    .ok_or(Error::NotFound)?;
                let cluster_desc = desc.cluster(cluster_id)?;
                let column_offset = cluster_desc.column_range(handle.id)?.first_element_index;
                debug_assert!(column_offset <= global_index);
                let index_in_cluster = global_index - column_offset;
                let detail = cluster_desc
                    .page_range(handle.id)?
                    .find(index_in_cluster)
                    .ok_or(Error::NotFound)?;
                Ok((cluster_id, column_offset, detail, index_in_cluster))
            })?;
        self.populate_page_from_cluster(handle, cluster_id, column_offset, detail, index_in_cluster)
    }

    /// Produce the decompressed page covering a cluster-local index.
    pub fn populate_page_at(&self, handle: ColumnHandle, index: ClusterIndex) -> Result<Arc<Page>> {
        if let Some(page) = self.inner.page_pool.get_page_local(handle.id, index) {
            return Ok(page);
        }

        let (column_offset, detail) = self.inner.with_descriptor(|desc| {
            let cluster_desc = desc.cluster(index.cluster_id)?;
            let column_offset = cluster_desc.column_range(handle.id)?.first_element_index;
            let detail = cluster_desc
                .page_range(handle.id)?
                .find(index.index)
                .ok_or(Error::NotFound)?;
            Ok((column_offset, detail))
        })?;
        self.populate_page_from_cluster(handle, index.cluster_id, column_offset, detail, index.index)
    }

    fn populate_page_from_cluster(
        &self,
        handle: ColumnHandle,
        cluster_id: ClusterId,
        column_offset: u64,
        detail: PageDetail,
        index_in_cluster: u64,
    ) -> Result<Arc<Page>> {
        let inner = &self.inner;
        let bytes_on_storage = detail.locator.bytes_on_storage as usize;

        let raw = if !inner.options.cluster_cache {
            // Direct read of the sealed page into a fresh buffer.
            let mut sealed = vec![0u8; bytes_on_storage];
            let key = page_key(
                DEFAULT_KEY_MAPPING,
                cluster_id,
                handle.id,
                detail.locator.position,
            );
            inner.metrics.n_read.inc();
            let n = inner
                .container
                .read_single(key.oid, key.dkey, key.akey, None, &mut sealed)
                .map_err(|e| Error::read_failed(e.code, e))?;
            if n != bytes_on_storage {
                return Err(Error::corrupt(format!(
                    "page at seq {} holds {n} bytes, descriptor says {bytes_on_storage}",
                    detail.locator.position
                )));
            }
            inner.metrics.n_page_loaded.inc();
            inner.metrics.sz_read_payload.add(n as u64);
            let _t = inner.metrics.time_wall_unzip.start();
            unseal_page(&sealed, detail.n_elements as usize, handle.element_size)?
        } else {
            let cluster = self.ensure_current_cluster(cluster_id, handle.id)?;
            // The cluster fetch may have preloaded this page already.
            if let Some(page) = inner
                .page_pool
                .get_page_local(handle.id, ClusterIndex::new(cluster_id, index_in_cluster))
            {
                return Ok(page);
            }
            let key = OnDiskPageKey::new(handle.id, detail.page_no);
            let sealed = cluster
                .on_disk_page(&key)
                .ok_or_else(|| Error::corrupt(format!("page {key:?} missing from cluster")))?;
            if sealed.len() != bytes_on_storage {
                return Err(Error::corrupt(format!(
                    "page {key:?} holds {} bytes, descriptor says {bytes_on_storage}",
                    sealed.len()
                )));
            }
            let _t = inner.metrics.time_wall_unzip.start();
            unseal_page(sealed, detail.n_elements as usize, handle.element_size)?
        };
        inner
            .metrics
            .sz_unzip
            .add((handle.element_size * detail.n_elements as usize) as u64);

        let mut page = PageAllocator::new_page_from_buf(
            handle.id,
            raw,
            handle.element_size,
            detail.n_elements as usize,
        );
        page.set_window(column_offset + detail.first_in_page, cluster_id, column_offset);
        inner.metrics.n_page_populated.inc();
        Ok(inner.page_pool.register_page(page))
    }

    /// Pin the wanted cluster, fetching it through the cluster pool when
    /// the current one does not cover `column_id`.
    fn ensure_current_cluster(
        &self,
        cluster_id: ClusterId,
        column_id: ColumnId,
    ) -> Result<Arc<Cluster>> {
        let mut current = self.current_cluster.lock().unwrap();
        let stale = match current.as_ref() {
            Some(c) => c.id() != cluster_id || !c.contains_column(column_id),
            None => true,
        };
        if stale {
            let columns = {
                let mut set = self.active_columns.lock().unwrap().clone();
                set.insert(column_id);
                set
            };
            *current = Some(self.cluster_pool.get_cluster(cluster_id, &columns)?);
        }
        Ok(Arc::clone(current.as_ref().unwrap()))
    }

    /// Size and element count of a sealed page; when `out` is given, also
    /// read the sealed bytes into it.
    pub fn load_sealed_page(
        &self,
        column_id: ColumnId,
        index: ClusterIndex,
        out: Option<&mut Vec<u8>>,
    ) -> Result<SealedPageInfo> {
        let detail = self.inner.with_descriptor(|desc| {
            desc.cluster(index.cluster_id)?
                .page_range(column_id)?
                .find(index.index)
                .ok_or(Error::NotFound)
        })?;
        let info = SealedPageInfo {
            size: detail.locator.bytes_on_storage,
            n_elements: detail.n_elements,
        };
        if let Some(buf) = out {
            buf.resize(info.size as usize, 0);
            let key = page_key(
                DEFAULT_KEY_MAPPING,
                index.cluster_id,
                column_id,
                detail.locator.position,
            );
            self.inner.metrics.n_read.inc();
            let n = self
                .inner
                .container
                .read_single(key.oid, key.dkey, key.akey, None, buf)
                .map_err(|e| Error::read_failed(e.code, e))?;
            if n != info.size as usize {
                return Err(Error::corrupt(format!(
                    "sealed page holds {n} bytes, descriptor says {}",
                    info.size
                )));
            }
        }
        Ok(info)
    }

    /// Vectored prefetch of whole clusters; see [`ClusterFetcher`].
    pub fn load_clusters(&self, keys: &[ClusterKey]) -> Result<Vec<Cluster>> {
        self.inner.load_clusters(keys)
    }

    /// Parallel decompression of a loaded cluster into the page pool.
    pub fn unzip_cluster(&self, cluster: &Cluster) -> Result<()> {
        self.inner.unzip_cluster(cluster)
    }

    /// Give back a page obtained from `populate_page*`.
    pub fn release_page(&self, page: &Arc<Page>) {
        self.inner.page_pool.return_page(page);
    }
}
