//! Cluster prefetching.
//!
//! One background worker services bunch requests: for a miss on cluster
//! `c` it fetches `[c, c + bunch)` in a single vectored read and
//! publishes the results into a shared cache, so the caller thread
//! overlaps consumption of the current cluster with I/O for the next
//! bunch. Optionally the worker also decompresses fetched clusters,
//! preloading their pages into the page pool.

use crate::cluster::{Cluster, ClusterKey};
use crate::types::{ClusterId, ColumnId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use tupkv_result::{Error, Result};

/// What the pool needs from its owner: vectored cluster loads and,
/// optionally, parallel decompression of a loaded cluster.
pub trait ClusterFetcher: Send + Sync + 'static {
    fn load_clusters(&self, keys: &[ClusterKey]) -> Result<Vec<Cluster>>;
    fn unzip_cluster(&self, cluster: &Cluster) -> Result<()>;
    fn n_clusters(&self) -> u64;
}

#[derive(Default)]
struct Shared {
    cache: FxHashMap<ClusterId, Arc<Cluster>>,
    in_flight: FxHashSet<ClusterId>,
    failed: Option<Error>,
}

pub struct ClusterPool {
    fetcher: Arc<dyn ClusterFetcher>,
    bunch_size: u32,
    shared: Arc<(Mutex<Shared>, Condvar)>,
    tx: Mutex<Option<mpsc::Sender<Vec<ClusterKey>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterPool {
    pub fn new(fetcher: Arc<dyn ClusterFetcher>, bunch_size: u32, parallel_unzip: bool) -> Self {
        let bunch_size = bunch_size.max(1);
        let shared: Arc<(Mutex<Shared>, Condvar)> = Arc::default();
        let (tx, rx) = mpsc::channel::<Vec<ClusterKey>>();

        let worker_fetcher = Arc::clone(&fetcher);
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("tupkv-cluster-pool".to_string())
            .spawn(move || {
                Self::worker_loop(rx, worker_fetcher, worker_shared, parallel_unzip)
            })
            .expect("spawn cluster-pool worker");

        Self {
            fetcher,
            bunch_size,
            shared,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn worker_loop(
        rx: mpsc::Receiver<Vec<ClusterKey>>,
        fetcher: Arc<dyn ClusterFetcher>,
        shared: Arc<(Mutex<Shared>, Condvar)>,
        parallel_unzip: bool,
    ) {
        while let Ok(keys) = rx.recv() {
            let ids: Vec<ClusterId> = keys.iter().map(|k| k.cluster_id).collect();
            let result = fetcher.load_clusters(&keys).and_then(|clusters| {
                if parallel_unzip {
                    for cluster in &clusters {
                        fetcher.unzip_cluster(cluster)?;
                    }
                }
                Ok(clusters)
            });

            let (lock, cv) = &*shared;
            let mut st = lock.lock().unwrap();
            for id in &ids {
                st.in_flight.remove(id);
            }
            match result {
                Ok(clusters) => {
                    let min_id = ids.iter().copied().min().unwrap_or(0);
                    for cluster in clusters {
                        st.cache.insert(cluster.id(), Arc::new(cluster));
                    }
                    // Keep the previous cluster around; drop anything
                    // further behind the bunch just loaded.
                    st.cache.retain(|&id, _| id + 1 >= min_id);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "cluster prefetch failed");
                    st.failed = Some(e);
                }
            }
            cv.notify_all();
        }
    }

    /// Queue fetches for `[from, from + bunch)` clusters that are neither
    /// cached nor already in flight.
    fn request_ahead(&self, st: &mut Shared, from: ClusterId, columns: &FxHashSet<ColumnId>) {
        let end = self.fetcher.n_clusters().min(from + self.bunch_size as u64);
        let mut keys = Vec::new();
        for id in from..end {
            if !st.cache.contains_key(&id) && !st.in_flight.contains(&id) {
                st.in_flight.insert(id);
                keys.push(ClusterKey::new(id, columns.iter().copied()));
            }
        }
        if !keys.is_empty() {
            if let Some(tx) = self.tx.lock().unwrap().as_ref() {
                let _ = tx.send(keys);
            }
        }
    }

    /// Fetch (or wait for) one cluster carrying at least `columns`, and
    /// kick off read-ahead for the clusters behind it.
    pub fn get_cluster(
        &self,
        cluster_id: ClusterId,
        columns: &FxHashSet<ColumnId>,
    ) -> Result<Arc<Cluster>> {
        let (lock, cv) = &*self.shared;
        let mut st = lock.lock().unwrap();

        if let Some(cluster) = st.cache.get(&cluster_id).cloned() {
            if columns.iter().all(|c| cluster.contains_column(*c)) {
                self.request_ahead(&mut st, cluster_id + 1, columns);
                return Ok(cluster);
            }
            // Cached with fewer columns than wanted; refetch.
            st.cache.remove(&cluster_id);
        }

        self.request_ahead(&mut st, cluster_id, columns);
        loop {
            if let Some(cluster) = st.cache.get(&cluster_id).cloned() {
                return Ok(cluster);
            }
            if let Some(err) = st.failed.take() {
                return Err(err);
            }
            if !st.in_flight.contains(&cluster_id) {
                // Not cached, not in flight: the id is beyond the dataset
                // or was evicted before we woke up.
                if cluster_id >= self.fetcher.n_clusters() {
                    return Err(Error::NotFound);
                }
                self.request_ahead(&mut st, cluster_id, columns);
                continue;
            }
            st = cv.wait(st).unwrap();
        }
    }
}

impl Drop for ClusterPool {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.tx.lock().unwrap().take();
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }
}
