//! B+ tree index
//!
//! A page-based order-preserving index over composite fixed-length keys.
//! Node pages live in the buffer pool; parent/child and leaf prev/next links
//! are page numbers, never pointers. Concurrent access uses latch coupling
//! (crabbing) when a transaction is supplied and the `lock-crabbing` feature
//! is enabled; otherwise a per-tree mutex serializes whole operations.

pub mod node;
pub mod scan;
pub mod tree;

pub use scan::IxScan;
pub use tree::BPlusTree;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::catalog::types::{compare_bytes, ColType};
use crate::error::{Error, Result};
use crate::storage::{INVALID_PAGE_NO, PAGE_SIZE, RID_SIZE};

/// Node page header: `{is_leaf: u8, pad[3], num_keys, parent, prev_leaf,
/// next_leaf}` (all i32)
pub const IX_PAGE_HDR_SIZE: usize = 20;

/// Position of an index entry: leaf page number plus slot within the leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iid {
    pub page_no: i32,
    pub slot_no: i32,
}

impl Iid {
    pub fn new(page_no: i32, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

/// Immutable shape of one index: key columns and the derived node geometry
#[derive(Debug)]
pub struct IndexSchema {
    pub col_types: Vec<ColType>,
    pub col_lens: Vec<usize>,
    pub col_tot_len: usize,
    /// Fan-out: a node holds at most `order` values in steady state; the
    /// page layout reserves one extra slot so a node can overflow
    /// momentarily before splitting.
    pub order: usize,
    pub keys_size: usize,
}

impl IndexSchema {
    pub fn new(col_types: Vec<ColType>, col_lens: Vec<usize>) -> Arc<Self> {
        assert_eq!(col_types.len(), col_lens.len());
        let col_tot_len: usize = col_lens.iter().sum();
        let order = (PAGE_SIZE - IX_PAGE_HDR_SIZE - RID_SIZE) / (col_tot_len + RID_SIZE) - 1;
        assert!(order >= 3, "key of {col_tot_len} bytes too large for a page");
        let keys_size = (order + 1) * col_tot_len;
        Arc::new(Self {
            col_types,
            col_lens,
            col_tot_len,
            order,
            keys_size,
        })
    }

    /// Node capacity counted in values: keys for a leaf, children for an
    /// internal node. A node reaching `max_vals` must split.
    pub fn max_vals(&self) -> usize {
        self.order + 1
    }

    pub fn min_vals(&self) -> usize {
        self.max_vals() / 2
    }

    /// Column-wise typed comparison of two keys.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let mut offset = 0;
        for (ty, len) in self.col_types.iter().zip(&self.col_lens) {
            let ord = compare_bytes(*ty, *len, &a[offset..], &b[offset..]);
            if ord != Ordering::Equal {
                return ord;
            }
            offset += len;
        }
        Ordering::Equal
    }
}

/// File header page (page 0) layout
pub(crate) struct IxFileHdr {
    pub num_pages: i32,
    pub root_page: i32,
    pub first_leaf: i32,
    pub last_leaf: i32,
    pub col_types: Vec<ColType>,
    pub col_lens: Vec<usize>,
}

impl IxFileHdr {
    pub fn serialize(&self, buf: &mut [u8]) {
        let mut w = |off: usize, v: i32| buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
        w(0, self.num_pages);
        w(4, self.root_page);
        w(8, self.first_leaf);
        w(12, self.last_leaf);
        w(16, self.col_types.len() as i32);
        let mut off = 20;
        for (ty, len) in self.col_types.iter().zip(&self.col_lens) {
            buf[off..off + 4].copy_from_slice(&ty.code().to_le_bytes());
            buf[off + 4..off + 8].copy_from_slice(&(*len as i32).to_le_bytes());
            off += 8;
        }
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let r = |off: usize| i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let col_count = r(16);
        if col_count <= 0 {
            return Err(Error::Internal("corrupted index file header".to_string()));
        }
        let mut col_types = Vec::with_capacity(col_count as usize);
        let mut col_lens = Vec::with_capacity(col_count as usize);
        let mut off = 20;
        for _ in 0..col_count {
            col_types.push(ColType::from_code(r(off))?);
            col_lens.push(r(off + 4) as usize);
            off += 8;
        }
        Ok(Self {
            num_pages: r(0),
            root_page: r(4),
            first_leaf: r(8),
            last_leaf: r(12),
            col_types,
            col_lens,
        })
    }
}

/// Kind of tree operation, for latch mode and node safety checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Find,
    Insert,
    Delete,
}

pub(crate) fn is_invalid(page_no: i32) -> bool {
    page_no == INVALID_PAGE_NO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_geometry_fits_page() {
        let schema = IndexSchema::new(vec![ColType::Int], vec![4]);
        // keys area + rid area + header must fit in one page
        let used =
            IX_PAGE_HDR_SIZE + schema.keys_size + (schema.order + 2) * RID_SIZE;
        assert!(used <= PAGE_SIZE, "node layout overflows page: {used}");
        assert!(schema.order > 100);
    }

    #[test]
    fn test_composite_compare() {
        let schema = IndexSchema::new(vec![ColType::Int, ColType::String], vec![4, 4]);
        let key = |i: i32, s: &[u8; 4]| {
            let mut k = i.to_le_bytes().to_vec();
            k.extend_from_slice(s);
            k
        };
        assert_eq!(
            schema.compare(&key(1, b"bb\0\0"), &key(2, b"aa\0\0")),
            Ordering::Less
        );
        assert_eq!(
            schema.compare(&key(2, b"aa\0\0"), &key(2, b"ab\0\0")),
            Ordering::Less
        );
        assert_eq!(
            schema.compare(&key(-1, b"zz\0\0"), &key(1, b"aa\0\0")),
            Ordering::Less
        );
        assert_eq!(
            schema.compare(&key(3, b"cc\0\0"), &key(3, b"cc\0\0")),
            Ordering::Equal
        );
    }

    #[test]
    fn test_file_hdr_roundtrip() {
        let hdr = IxFileHdr {
            num_pages: 5,
            root_page: 3,
            first_leaf: 1,
            last_leaf: 4,
            col_types: vec![ColType::Int, ColType::Datetime],
            col_lens: vec![4, 19],
        };
        let mut buf = vec![0u8; 128];
        hdr.serialize(&mut buf);
        let parsed = IxFileHdr::deserialize(&buf).unwrap();
        assert_eq!(parsed.num_pages, 5);
        assert_eq!(parsed.root_page, 3);
        assert_eq!(parsed.first_leaf, 1);
        assert_eq!(parsed.last_leaf, 4);
        assert_eq!(parsed.col_types, vec![ColType::Int, ColType::Datetime]);
        assert_eq!(parsed.col_lens, vec![4, 19]);
    }
}
