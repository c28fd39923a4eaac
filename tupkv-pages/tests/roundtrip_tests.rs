use std::sync::Arc;
use tupkv_pages::{PageSource, ReadOptions, WriteOptions};
use tupkv_result::Error;
use tupkv_storage::MemKvDriver;

mod common;
use common::{u32_page, write_dataset};

fn uncompressed() -> WriteOptions {
    WriteOptions {
        compression_level: 0,
        ..WriteOptions::default()
    }
}

/// One u32 column, one page {1, 2, 3, 4}, compression off. The populated
/// page must hold the exact little-endian bytes.
#[test]
fn single_page_roundtrip() {
    let driver = Arc::new(MemKvDriver::new());
    write_dataset(
        &driver,
        "kv://p/c",
        "single",
        uncompressed(),
        &[(0, 4)],
        &[vec![(0, vec![u32_page(&[1, 2, 3, 4])])]],
    )
    .unwrap();

    let source = PageSource::new(
        "single",
        "kv://p/c",
        ReadOptions::default(),
        Arc::clone(&driver),
    )
    .unwrap();
    let descriptor = source.attach().unwrap();
    assert_eq!(descriptor.n_entries, 4);
    assert_eq!(descriptor.n_clusters(), 1);

    let handle = source.add_column(0).unwrap();
    let page = source.populate_page(handle, 0).unwrap();
    assert_eq!(page.n_elements(), 4);
    assert_eq!(
        page.as_bytes(),
        &[1u8, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0]
    );
}

/// Same dataset read with the cluster cache disabled: pages come from
/// direct single-key reads.
#[test]
fn single_page_roundtrip_without_cluster_cache() {
    let driver = Arc::new(MemKvDriver::new());
    write_dataset(
        &driver,
        "kv://p/c",
        "single",
        uncompressed(),
        &[(0, 4)],
        &[vec![(0, vec![u32_page(&[9, 8, 7])])]],
    )
    .unwrap();

    let options = ReadOptions {
        cluster_cache: false,
        ..ReadOptions::default()
    };
    let source = PageSource::new("single", "kv://p/c", options, Arc::clone(&driver)).unwrap();
    source.attach().unwrap();
    let handle = source.add_column(0).unwrap();
    let page = source.populate_page(handle, 1).unwrap();
    assert_eq!(page.as_bytes(), &u32_page(&[9, 8, 7])[..]);
    assert_eq!(source.metrics().n_page_loaded.get(), 1);
}

/// A large repetitive header written with compression enabled shrinks on
/// storage, and the recovered anchor carries both sizes.
#[test]
fn compressed_header_roundtrip() {
    let driver = Arc::new(MemKvDriver::new());
    // A long repetitive dataset name blows the header past 4 KiB.
    let name = "event-".repeat(800);
    let options = WriteOptions {
        compression_level: 3,
        ..WriteOptions::default()
    };
    write_dataset(
        &driver,
        "kv://p/zip",
        &name,
        options,
        &[(0, 4)],
        &[vec![(0, vec![u32_page(&[5; 64])])]],
    )
    .unwrap();

    let source = PageSource::new(
        &name,
        "kv://p/zip",
        ReadOptions::default(),
        Arc::clone(&driver),
    )
    .unwrap();
    let descriptor = source.attach().unwrap();
    assert_eq!(descriptor.name, name);

    let anchor = source.anchor().expect("anchor recovered by attach");
    assert!(anchor.len_header > 4096);
    assert!(anchor.n_bytes_header < anchor.len_header);

    let handle = source.add_column(0).unwrap();
    let page = source.populate_page(handle, 63).unwrap();
    assert_eq!(page.as_bytes(), &u32_page(&[5; 64])[..]);
}

/// Committed datasets attach to identical descriptors from independent
/// sources.
#[test]
fn attach_is_deterministic() {
    let driver = Arc::new(MemKvDriver::new());
    write_dataset(
        &driver,
        "kv://p/c",
        "det",
        WriteOptions::default(),
        &[(0, 4), (1, 8)],
        &[
            vec![
                (0, vec![u32_page(&[1, 2]), u32_page(&[3, 4])]),
                (1, vec![common::u64_page(&[10, 20, 30, 40])]),
            ],
            vec![
                (0, vec![u32_page(&[5, 6])]),
                (1, vec![common::u64_page(&[50, 60])]),
            ],
        ],
    )
    .unwrap();

    let open = || {
        PageSource::new("det", "kv://p/c", ReadOptions::default(), Arc::clone(&driver)).unwrap()
    };
    let d1 = open().attach().unwrap();
    let d2 = open().attach().unwrap();
    assert_eq!(d1, d2);
    assert_eq!(d1.n_entries, 6);
    assert_eq!(d1.n_clusters(), 2);
    assert_eq!(d1.cluster(1).unwrap().first_entry_index, 4);
}

/// Without the final anchor write the dataset is unreadable: pages and
/// even the footer may exist, but attach must refuse.
#[test]
fn partial_dataset_is_unreadable() {
    use tupkv_pages::{ColumnHandle, DescriptorBuilder, PageSink};

    let driver = Arc::new(MemKvDriver::new());
    let sink = PageSink::new(
        "partial",
        "kv://p/c",
        WriteOptions::default(),
        Arc::clone(&driver),
    )
    .unwrap();
    let mut builder = DescriptorBuilder::new("partial");
    builder.add_column(0, 4);
    sink.create(&builder.serialize_header()).unwrap();

    let handle = ColumnHandle {
        id: 0,
        element_size: 4,
    };
    let mut page = sink.reserve_page(handle, 2).unwrap();
    page.as_bytes_mut().copy_from_slice(&u32_page(&[1, 2]));
    let locator = sink.commit_page(handle, &page).unwrap();
    builder.record_page(0, 2, locator);
    builder.commit_cluster(2);
    sink.commit_cluster(2);
    let page_list = builder.serialize_page_list();
    let locator = sink.commit_cluster_group(&page_list).unwrap();
    builder.commit_cluster_group(locator, page_list.len() as u64);
    // commit_dataset intentionally skipped: no footer, no anchor.

    let source = PageSource::new(
        "partial",
        "kv://p/c",
        ReadOptions::default(),
        Arc::clone(&driver),
    )
    .unwrap();
    assert!(matches!(source.attach(), Err(Error::ReadFailed { .. })));
}

/// A truncated anchor record fails attach with `AnchorTooShort`.
#[test]
fn truncated_anchor_is_rejected() {
    use tupkv_pages::keys::{AKEY_ANCHOR, DKEY_DEFAULT, OID_METADATA};
    use tupkv_storage::{KvContainer, KvDriver, OpenMode};

    let driver = Arc::new(MemKvDriver::new());
    write_dataset(
        &driver,
        "kv://p/c",
        "trunc",
        WriteOptions::default(),
        &[(0, 4)],
        &[vec![(0, vec![u32_page(&[1])])]],
    )
    .unwrap();

    // Clobber the anchor with a 16-byte record.
    let cont = driver
        .open_container("p", "c", OpenMode::CreateIfAbsent)
        .unwrap();
    cont.write_single(OID_METADATA, DKEY_DEFAULT, AKEY_ANCHOR, None, &[0u8; 16])
        .unwrap();

    let source = PageSource::new(
        "trunc",
        "kv://p/c",
        ReadOptions::default(),
        Arc::clone(&driver),
    )
    .unwrap();
    assert!(matches!(source.attach(), Err(Error::AnchorTooShort)));
}

/// Two populates of the same page return identical bytes; the second is
/// served by the page pool without touching the driver.
#[test]
fn repeated_populate_hits_page_pool() {
    let driver = Arc::new(MemKvDriver::new());
    write_dataset(
        &driver,
        "kv://p/c",
        "pool",
        uncompressed(),
        &[(0, 4)],
        &[vec![(0, vec![u32_page(&[11, 22, 33])])]],
    )
    .unwrap();

    let options = ReadOptions {
        cluster_cache: false,
        ..ReadOptions::default()
    };
    let source = PageSource::new("pool", "kv://p/c", options, Arc::clone(&driver)).unwrap();
    source.attach().unwrap();
    let handle = source.add_column(0).unwrap();

    let first = source.populate_page(handle, 0).unwrap();
    let reads_after_first = source.metrics().n_read.get();
    let second = source.populate_page(handle, 2).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!(source.metrics().n_read.get(), reads_after_first);

    source.release_page(&second);
    source.release_page(&first);
}
