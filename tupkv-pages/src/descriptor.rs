//! In-memory dataset metadata: columns, clusters, pages, cluster groups,
//! plus the builder that serializes and re-ingests the header, footer,
//! and pagelist records.
//!
//! All records are little-endian with a 4-byte magic and a u32 version.
//! The header describes the columns; the footer carries the entry count,
//! the cluster-group table (with pagelist locators), and per-cluster
//! summaries; each pagelist carries the per-column page ranges of its
//! group's clusters.

use crate::codecs::{
    read_u32_le, try_read_u32_le, try_read_u64_le, write_u32_le, write_u64_le,
};
use crate::types::{ClusterId, ColumnId, EntryIndex, Locator};
use rustc_hash::FxHashMap;
use tupkv_result::{Error, Result};

const HEADER_MAGIC: [u8; 4] = *b"TKVH";
const FOOTER_MAGIC: [u8; 4] = *b"TKVF";
const PAGE_LIST_MAGIC: [u8; 4] = *b"TKVL";
const FORMAT_VERSION: u32 = 1;

/// One column of the dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub column_id: ColumnId,
    pub element_size: u32,
}

/// One page of one column within a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageInfo {
    pub n_elements: u32,
    pub locator: Locator,
}

/// The pages a column contributed to one cluster, in page order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRange {
    pub page_infos: Vec<PageInfo>,
}

/// A `PageRange::find` result: the page covering a cluster-local index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageDetail {
    pub page_no: u64,
    pub first_in_page: u64,
    pub n_elements: u32,
    pub locator: Locator,
}

impl PageRange {
    /// Locate the page holding `index_in_cluster`, walking the ranges'
    /// running element counts.
    pub fn find(&self, index_in_cluster: u64) -> Option<PageDetail> {
        let mut first = 0u64;
        for (page_no, pi) in self.page_infos.iter().enumerate() {
            let n = pi.n_elements as u64;
            if index_in_cluster < first + n {
                return Some(PageDetail {
                    page_no: page_no as u64,
                    first_in_page: first,
                    n_elements: pi.n_elements,
                    locator: pi.locator,
                });
            }
            first += n;
        }
        None
    }

    pub fn n_elements(&self) -> u64 {
        self.page_infos.iter().map(|p| p.n_elements as u64).sum()
    }
}

/// The elements a column stores in one cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnRange {
    /// Global index of the first element of this column in this cluster.
    pub first_element_index: u64,
    pub n_elements: u64,
}

/// A horizontal partition of rows; all columns contribute pages to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterDescriptor {
    pub cluster_id: ClusterId,
    pub first_entry_index: EntryIndex,
    pub n_entries: u64,
    column_ranges: FxHashMap<ColumnId, ColumnRange>,
    page_ranges: FxHashMap<ColumnId, PageRange>,
}

impl ClusterDescriptor {
    pub fn column_range(&self, column_id: ColumnId) -> Result<&ColumnRange> {
        self.column_ranges.get(&column_id).ok_or(Error::NotFound)
    }

    pub fn page_range(&self, column_id: ColumnId) -> Result<&PageRange> {
        self.page_ranges.get(&column_id).ok_or(Error::NotFound)
    }

    pub fn columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.page_ranges.keys().copied()
    }

    pub fn has_column(&self, column_id: ColumnId) -> bool {
        self.page_ranges.contains_key(&column_id)
    }
}

/// A set of clusters sharing one pagelist record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterGroupDescriptor {
    pub group_id: u64,
    pub page_list_locator: Locator,
    /// Uncompressed pagelist size.
    pub page_list_length: u64,
    pub cluster_ids: Vec<ClusterId>,
}

/// The fully assembled metadata tree of one dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetDescriptor {
    pub name: String,
    pub n_entries: u64,
    columns: Vec<ColumnDescriptor>,
    clusters: Vec<ClusterDescriptor>,
    cluster_groups: Vec<ClusterGroupDescriptor>,
}

impl DatasetDescriptor {
    pub fn column(&self, column_id: ColumnId) -> Result<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.column_id == column_id)
            .ok_or(Error::NotFound)
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn n_clusters(&self) -> u64 {
        self.clusters.len() as u64
    }

    pub fn cluster(&self, cluster_id: ClusterId) -> Result<&ClusterDescriptor> {
        self.clusters
            .iter()
            .find(|c| c.cluster_id == cluster_id)
            .ok_or(Error::NotFound)
    }

    pub fn clusters(&self) -> &[ClusterDescriptor] {
        &self.clusters
    }

    pub fn cluster_groups(&self) -> &[ClusterGroupDescriptor] {
        &self.cluster_groups
    }

    /// The cluster holding `global_index` of `column_id`.
    pub fn find_cluster_id(&self, column_id: ColumnId, global_index: u64) -> Option<ClusterId> {
        for cluster in &self.clusters {
            if let Some(cr) = cluster.column_ranges.get(&column_id) {
                if global_index >= cr.first_element_index
                    && global_index < cr.first_element_index + cr.n_elements
                {
                    return Some(cluster.cluster_id);
                }
            }
        }
        None
    }
}

/// Builder used on both sides: the writer accumulates commits and
/// serializes the three record kinds; the reader ingests them back and
/// assembles a [`DatasetDescriptor`].
#[derive(Debug, Default)]
pub struct DescriptorBuilder {
    name: String,
    columns: Vec<ColumnDescriptor>,
    clusters: Vec<ClusterDescriptor>,
    cluster_groups: Vec<ClusterGroupDescriptor>,
    n_entries: u64,
    /// Writer side: pages recorded since the last cluster commit.
    open_pages: FxHashMap<ColumnId, Vec<PageInfo>>,
    /// Writer side: per-column element totals across committed clusters.
    column_totals: FxHashMap<ColumnId, u64>,
    /// Writer side: first cluster of the group being accumulated.
    grouped_until: usize,
}

impl DescriptorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_column(&mut self, column_id: ColumnId, element_size: u32) {
        self.columns.push(ColumnDescriptor {
            column_id,
            element_size,
        });
    }

    /// Record a committed page of the open cluster.
    pub fn record_page(&mut self, column_id: ColumnId, n_elements: u32, locator: Locator) {
        self.open_pages.entry(column_id).or_default().push(PageInfo {
            n_elements,
            locator,
        });
    }

    /// Close the open cluster: all pages recorded since the previous
    /// commit become one [`ClusterDescriptor`].
    pub fn commit_cluster(&mut self, n_entries: u64) {
        let cluster_id = self.clusters.len() as ClusterId;
        let mut column_ranges = FxHashMap::default();
        let mut page_ranges = FxHashMap::default();
        for (column_id, page_infos) in self.open_pages.drain() {
            let range = PageRange { page_infos };
            let n_elements = range.n_elements();
            let first = self.column_totals.entry(column_id).or_insert(0);
            column_ranges.insert(
                column_id,
                ColumnRange {
                    first_element_index: *first,
                    n_elements,
                },
            );
            *first += n_elements;
            page_ranges.insert(column_id, range);
        }
        self.clusters.push(ClusterDescriptor {
            cluster_id,
            first_entry_index: self.n_entries,
            n_entries,
            column_ranges,
            page_ranges,
        });
        self.n_entries += n_entries;
    }

    pub fn n_clusters(&self) -> u64 {
        self.clusters.len() as u64
    }

    /// Cluster groups known so far. On the reader side these carry the
    /// pagelist locators ingested from the footer.
    pub fn cluster_groups(&self) -> &[ClusterGroupDescriptor] {
        &self.cluster_groups
    }

    /// Record a cluster group once its pagelist has been written: the
    /// clusters committed since the previous group form the new one.
    pub fn commit_cluster_group(&mut self, locator: Locator, page_list_length: u64) {
        let group_id = self.cluster_groups.len() as u64;
        let cluster_ids = self.clusters[self.grouped_until..]
            .iter()
            .map(|c| c.cluster_id)
            .collect();
        self.grouped_until = self.clusters.len();
        self.cluster_groups.push(ClusterGroupDescriptor {
            group_id,
            page_list_locator: locator,
            page_list_length,
            cluster_ids,
        });
    }

    // ---- record serialization (writer side) ----

    pub fn serialize_header(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&HEADER_MAGIC);
        write_u32_le(&mut buf, FORMAT_VERSION);
        write_u32_le(&mut buf, self.name.len() as u32);
        buf.extend_from_slice(self.name.as_bytes());
        write_u64_le(&mut buf, self.columns.len() as u64);
        for column in &self.columns {
            write_u64_le(&mut buf, column.column_id);
            write_u32_le(&mut buf, column.element_size);
        }
        buf
    }

    /// Serialize the pagelist of the group being accumulated (clusters
    /// committed since the previous `commit_cluster_group`).
    pub fn serialize_page_list(&self) -> Vec<u8> {
        let clusters = &self.clusters[self.grouped_until..];
        let mut buf = Vec::new();
        buf.extend_from_slice(&PAGE_LIST_MAGIC);
        write_u32_le(&mut buf, FORMAT_VERSION);
        write_u64_le(&mut buf, clusters.len() as u64);
        for cluster in clusters {
            write_u64_le(&mut buf, cluster.cluster_id);
            // Deterministic record layout regardless of map iteration
            // order.
            let mut column_ids: Vec<ColumnId> = cluster.page_ranges.keys().copied().collect();
            column_ids.sort_unstable();
            write_u64_le(&mut buf, column_ids.len() as u64);
            for column_id in column_ids {
                let cr = &cluster.column_ranges[&column_id];
                let pr = &cluster.page_ranges[&column_id];
                write_u64_le(&mut buf, column_id);
                write_u64_le(&mut buf, cr.first_element_index);
                write_u64_le(&mut buf, pr.page_infos.len() as u64);
                for pi in &pr.page_infos {
                    write_u32_le(&mut buf, pi.n_elements);
                    write_u64_le(&mut buf, pi.locator.position);
                    write_u64_le(&mut buf, pi.locator.bytes_on_storage);
                }
            }
        }
        buf
    }

    pub fn serialize_footer(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&FOOTER_MAGIC);
        write_u32_le(&mut buf, FORMAT_VERSION);
        write_u64_le(&mut buf, self.n_entries);
        write_u64_le(&mut buf, self.cluster_groups.len() as u64);
        for group in &self.cluster_groups {
            write_u64_le(&mut buf, group.group_id);
            write_u64_le(&mut buf, group.page_list_locator.position);
            write_u64_le(&mut buf, group.page_list_locator.bytes_on_storage);
            write_u64_le(&mut buf, group.page_list_length);
            write_u64_le(&mut buf, group.cluster_ids.len() as u64);
            for &cluster_id in &group.cluster_ids {
                let cluster = self
                    .clusters
                    .iter()
                    .find(|c| c.cluster_id == cluster_id)
                    .expect("grouped cluster exists");
                write_u64_le(&mut buf, cluster.cluster_id);
                write_u64_le(&mut buf, cluster.first_entry_index);
                write_u64_le(&mut buf, cluster.n_entries);
            }
        }
        buf
    }

    // ---- record ingestion (reader side) ----

    fn check_magic(buf: &[u8], magic: &[u8; 4], what: &str) -> Result<usize> {
        if buf.len() < 8 || &buf[0..4] != magic {
            return Err(Error::corrupt(format!("bad {what} magic")));
        }
        let mut o = 4usize;
        let version = read_u32_le(buf, &mut o);
        if version != FORMAT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported {what} version {version}"
            )));
        }
        Ok(o)
    }

    pub fn ingest_header(&mut self, buf: &[u8]) -> Result<()> {
        let mut o = Self::check_magic(buf, &HEADER_MAGIC, "header")?;
        let name_len = try_read_u32_le(buf, &mut o)? as usize;
        if buf.len() < o + name_len {
            return Err(Error::corrupt("truncated dataset name"));
        }
        self.name = std::str::from_utf8(&buf[o..o + name_len])
            .map_err(|e| Error::corrupt(format!("dataset name: {e}")))?
            .to_string();
        o += name_len;
        let n_columns = try_read_u64_le(buf, &mut o)?;
        for _ in 0..n_columns {
            let column_id = try_read_u64_le(buf, &mut o)?;
            let element_size = try_read_u32_le(buf, &mut o)?;
            self.columns.push(ColumnDescriptor {
                column_id,
                element_size,
            });
        }
        Ok(())
    }

    pub fn ingest_footer(&mut self, buf: &[u8]) -> Result<()> {
        let mut o = Self::check_magic(buf, &FOOTER_MAGIC, "footer")?;
        self.n_entries = try_read_u64_le(buf, &mut o)?;
        let n_groups = try_read_u64_le(buf, &mut o)?;
        for _ in 0..n_groups {
            let group_id = try_read_u64_le(buf, &mut o)?;
            let position = try_read_u64_le(buf, &mut o)?;
            let bytes_on_storage = try_read_u64_le(buf, &mut o)?;
            let page_list_length = try_read_u64_le(buf, &mut o)?;
            let n_clusters = try_read_u64_le(buf, &mut o)?;
            let mut cluster_ids = Vec::with_capacity(n_clusters as usize);
            for _ in 0..n_clusters {
                let cluster_id = try_read_u64_le(buf, &mut o)?;
                let first_entry_index = try_read_u64_le(buf, &mut o)?;
                let n_entries = try_read_u64_le(buf, &mut o)?;
                cluster_ids.push(cluster_id);
                // Summary only; page ranges arrive with the pagelist.
                self.clusters.push(ClusterDescriptor {
                    cluster_id,
                    first_entry_index,
                    n_entries,
                    column_ranges: FxHashMap::default(),
                    page_ranges: FxHashMap::default(),
                });
            }
            self.cluster_groups.push(ClusterGroupDescriptor {
                group_id,
                page_list_locator: Locator {
                    position,
                    bytes_on_storage,
                },
                page_list_length,
                cluster_ids,
            });
        }
        Ok(())
    }

    pub fn ingest_page_list(&mut self, buf: &[u8]) -> Result<()> {
        let mut o = Self::check_magic(buf, &PAGE_LIST_MAGIC, "pagelist")?;
        let n_clusters = try_read_u64_le(buf, &mut o)?;
        for _ in 0..n_clusters {
            let cluster_id = try_read_u64_le(buf, &mut o)?;
            let cluster = self
                .clusters
                .iter_mut()
                .find(|c| c.cluster_id == cluster_id)
                .ok_or_else(|| {
                    Error::corrupt(format!("pagelist names unknown cluster {cluster_id}"))
                })?;
            let n_columns = try_read_u64_le(buf, &mut o)?;
            for _ in 0..n_columns {
                let column_id = try_read_u64_le(buf, &mut o)?;
                let first_element_index = try_read_u64_le(buf, &mut o)?;
                let n_pages = try_read_u64_le(buf, &mut o)?;
                let mut page_infos = Vec::with_capacity(n_pages as usize);
                for _ in 0..n_pages {
                    let n_elements = try_read_u32_le(buf, &mut o)?;
                    let position = try_read_u64_le(buf, &mut o)?;
                    let bytes_on_storage = try_read_u64_le(buf, &mut o)?;
                    page_infos.push(PageInfo {
                        n_elements,
                        locator: Locator {
                            position,
                            bytes_on_storage,
                        },
                    });
                }
                let range = PageRange { page_infos };
                cluster.column_ranges.insert(
                    column_id,
                    ColumnRange {
                        first_element_index,
                        n_elements: range.n_elements(),
                    },
                );
                cluster.page_ranges.insert(column_id, range);
            }
        }
        Ok(())
    }

    /// Assemble the final descriptor. Every cluster named by a group must
    /// have received its page ranges.
    pub fn build(self) -> Result<DatasetDescriptor> {
        for group in &self.cluster_groups {
            for &cluster_id in &group.cluster_ids {
                let cluster = self
                    .clusters
                    .iter()
                    .find(|c| c.cluster_id == cluster_id)
                    .ok_or_else(|| Error::corrupt(format!("cluster {cluster_id} missing")))?;
                if cluster.n_entries > 0 && cluster.page_ranges.is_empty() {
                    return Err(Error::corrupt(format!(
                        "cluster {cluster_id} has no page ranges"
                    )));
                }
            }
        }
        Ok(DatasetDescriptor {
            name: self.name,
            n_entries: self.n_entries,
            columns: self.columns,
            clusters: self.clusters,
            cluster_groups: self.cluster_groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built_writer() -> DescriptorBuilder {
        let mut b = DescriptorBuilder::new("events");
        b.add_column(0, 4);
        b.add_column(1, 8);
        // Cluster 0: column 0 has two pages, column 1 one page.
        b.record_page(0, 10, Locator { position: 0, bytes_on_storage: 40 });
        b.record_page(0, 6, Locator { position: 1, bytes_on_storage: 24 });
        b.record_page(1, 16, Locator { position: 2, bytes_on_storage: 128 });
        b.commit_cluster(16);
        // Cluster 1: one page each.
        b.record_page(0, 8, Locator { position: 3, bytes_on_storage: 32 });
        b.record_page(1, 8, Locator { position: 4, bytes_on_storage: 64 });
        b.commit_cluster(8);
        b.commit_cluster_group(
            Locator { position: 0, bytes_on_storage: 99 },
            200,
        );
        b
    }

    #[test]
    fn page_range_find_walks_running_counts() {
        let b = built_writer();
        let footer = b.serialize_footer();
        let page_list = b.serialize_page_list(); // empty second group
        assert!(!footer.is_empty());
        assert!(!page_list.is_empty());

        let cluster = &b.clusters[0];
        let pr = cluster.page_range(0).unwrap();
        let d = pr.find(3).unwrap();
        assert_eq!((d.page_no, d.first_in_page, d.n_elements), (0, 0, 10));
        let d = pr.find(12).unwrap();
        assert_eq!((d.page_no, d.first_in_page, d.n_elements), (1, 10, 6));
        assert!(pr.find(16).is_none());
    }

    #[test]
    fn records_round_trip_through_ingestion() {
        let mut writer = DescriptorBuilder::new("events");
        writer.add_column(0, 4);
        writer.add_column(1, 8);
        writer.record_page(0, 10, Locator { position: 0, bytes_on_storage: 40 });
        writer.record_page(0, 6, Locator { position: 1, bytes_on_storage: 24 });
        writer.record_page(1, 16, Locator { position: 2, bytes_on_storage: 128 });
        writer.commit_cluster(16);
        let header = writer.serialize_header();
        let page_list = writer.serialize_page_list();
        writer.commit_cluster_group(
            Locator { position: 0, bytes_on_storage: page_list.len() as u64 },
            page_list.len() as u64,
        );
        let footer = writer.serialize_footer();

        let mut reader = DescriptorBuilder::default();
        reader.ingest_header(&header).unwrap();
        reader.ingest_footer(&footer).unwrap();
        reader.ingest_page_list(&page_list).unwrap();
        let desc = reader.build().unwrap();

        assert_eq!(desc.name, "events");
        assert_eq!(desc.n_entries, 16);
        assert_eq!(desc.columns().len(), 2);
        assert_eq!(desc.n_clusters(), 1);
        let cluster = desc.cluster(0).unwrap();
        assert_eq!(cluster.column_range(0).unwrap().n_elements, 16);
        assert_eq!(cluster.page_range(1).unwrap().page_infos.len(), 1);
        assert_eq!(desc.find_cluster_id(0, 15), Some(0));
        assert_eq!(desc.find_cluster_id(0, 16), None);
    }

    #[test]
    fn second_cluster_offsets_column_ranges() {
        let b = built_writer();
        let c1 = &b.clusters[1];
        assert_eq!(c1.first_entry_index, 16);
        assert_eq!(c1.column_range(0).unwrap().first_element_index, 16);
        assert_eq!(c1.column_range(1).unwrap().first_element_index, 16);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let mut reader = DescriptorBuilder::default();
        assert!(matches!(
            reader.ingest_header(b"XXXX\x01\x00\x00\x00"),
            Err(Error::Corrupt(_))
        ));
    }
}
