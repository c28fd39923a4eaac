//! Writer and reader configuration.

use crate::keys::METADATA_CLASS_NAME;

/// Options bound to a [`crate::sink::PageSink`].
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// zstd level for metadata and page payloads; 0 stores raw bytes.
    pub compression_level: i32,
    /// Object class requested for the dataset's page objects.
    pub object_class: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression_level: 3,
            object_class: METADATA_CLASS_NAME.to_string(),
        }
    }
}

/// Options bound to a [`crate::source::PageSource`].
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// When off, every page populate issues a direct single-key read;
    /// when on, whole clusters are fetched through the cluster pool.
    pub cluster_cache: bool,
    /// How many clusters ahead of the current one the pool fetches per
    /// vectored read.
    pub cluster_bunch_size: u32,
    /// Decompress freshly fetched clusters on the pool worker, preloading
    /// their pages into the page pool.
    pub parallel_unzip: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            cluster_cache: true,
            cluster_bunch_size: 1,
            parallel_unzip: false,
        }
    }
}
