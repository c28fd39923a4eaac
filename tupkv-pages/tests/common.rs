//! Shared helpers for the integration tests: build small datasets through
//! the public sink surface.

use std::sync::Arc;
use tupkv_pages::{
    ColumnHandle, DescriptorBuilder, PageSink, WriteOptions,
};
use tupkv_result::Result;
use tupkv_storage::MemKvDriver;

/// One column: id plus element size in bytes.
pub type ColumnSpec = (u64, usize);

/// Pages of one column within one cluster, as raw element bytes.
pub type ClusterColumn = (u64, Vec<Vec<u8>>);

/// Write a complete dataset: every cluster's pages, one cluster group
/// covering all clusters, footer, anchor.
pub fn write_dataset(
    driver: &Arc<MemKvDriver>,
    uri: &str,
    name: &str,
    options: WriteOptions,
    columns: &[ColumnSpec],
    clusters: &[Vec<ClusterColumn>],
) -> Result<()> {
    let sink = PageSink::new(name, uri, options, Arc::clone(driver))?;
    let mut builder = DescriptorBuilder::new(name);
    for &(column_id, element_size) in columns {
        builder.add_column(column_id, element_size as u32);
    }
    sink.create(&builder.serialize_header())?;

    for cluster in clusters {
        let mut n_entries = 0u64;
        for (column_id, pages) in cluster {
            let element_size = columns
                .iter()
                .find(|(id, _)| id == column_id)
                .expect("column spec")
                .1;
            let handle = ColumnHandle {
                id: *column_id,
                element_size,
            };
            let mut n_elements_in_cluster = 0u64;
            for raw in pages {
                assert_eq!(raw.len() % element_size, 0);
                let n = raw.len() / element_size;
                let mut page = sink.reserve_page(handle, n)?;
                page.as_bytes_mut().copy_from_slice(raw);
                let locator = sink.commit_page(handle, &page)?;
                builder.record_page(*column_id, n as u32, locator);
                n_elements_in_cluster += n as u64;
            }
            n_entries = n_entries.max(n_elements_in_cluster);
        }
        builder.commit_cluster(n_entries);
        sink.commit_cluster(n_entries);
    }

    let page_list = builder.serialize_page_list();
    let locator = sink.commit_cluster_group(&page_list)?;
    builder.commit_cluster_group(locator, page_list.len() as u64);
    sink.commit_dataset(&builder.serialize_footer())?;
    Ok(())
}

/// Little-endian element buffer for a u32 column page.
pub fn u32_page(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Little-endian element buffer for a u64 column page.
pub fn u64_page(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
