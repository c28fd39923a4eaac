//! tupkv: columnar page storage over a distributed KV object store.
//!
//! This crate is the entrypoint for the tupkv toolkit. It re-exports the
//! page-storage engine and the KV driver contract from the underlying
//! `tupkv-*` crates so applications see a single surface.
//!
//! A dataset is a cluster-partitioned columnar table stored as sealed
//! pages in a two-level KV object store (object id → distribution key →
//! attribute key → value). [`PageSink`] writes pages and finalizes the
//! dataset with pagelists, a footer, and the anchor record that marks it
//! committed; [`PageSource`] bootstraps from the anchor and serves pages
//! through a prefetching cluster cache with parallel decompression.
//!
//! The driver contract lives in [`storage`]; [`storage::MemKvDriver`] is
//! the in-process reference driver used throughout the test suites.

pub use tupkv_pages as pages;
pub use tupkv_result::{Error, Result};
pub use tupkv_storage as storage;

pub use tupkv_pages::{
    DatasetAnchor, DatasetDescriptor, DatasetUri, DescriptorBuilder, Page, PageAllocator,
    PageSink, PageSource, ReadOptions, WriteOptions,
};
