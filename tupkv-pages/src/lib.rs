//! Columnar page storage over a distributed KV object store.
//!
//! A dataset is a cluster-partitioned, column-oriented table persisted as
//! sealed (compressed + framed) pages in a two-level KV object store. The
//! write side ([`sink::PageSink`]) seals pages, assigns sequence numbers,
//! batches vectored writes by object and distribution key, and finalizes
//! the dataset by writing pagelists, the footer, and last of all the
//! anchor record that marks the dataset committed. The read side
//! ([`source::PageSource`]) bootstraps from the anchor, rebuilds the
//! in-memory [`descriptor::DatasetDescriptor`], and serves pages either by
//! direct single-key reads or through a prefetching cluster cache with
//! parallel decompression.

pub mod anchor;
pub mod cluster;
pub mod cluster_pool;
mod codecs;
pub mod descriptor;
pub mod keys;
pub mod metrics;
pub mod options;
pub mod page;
pub mod pool;
pub mod sink;
pub mod source;
pub mod types;
pub mod uri;
pub mod zip;

pub use anchor::DatasetAnchor;
pub use cluster::{Cluster, ClusterKey, OnDiskPageKey};
pub use descriptor::{DatasetDescriptor, DescriptorBuilder};
pub use keys::KeyMapping;
pub use options::{ReadOptions, WriteOptions};
pub use page::{Page, PageAllocator};
pub use sink::PageSink;
pub use source::PageSource;
pub use types::{
    ClusterId, ClusterIndex, ColumnHandle, ColumnId, Locator, SealedPage, SealedPageGroup,
};
pub use uri::DatasetUri;
