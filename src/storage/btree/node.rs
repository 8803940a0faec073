//! B+tree node handles
//!
//! A `NodeHandle` is a transient typed view over one pinned index page:
//! header fields, the key array, and the rid array. Internal nodes store
//! `num_keys` separators and `num_keys + 1` child page rids, where separator
//! `i` is exactly the smallest key in child `i + 1`'s subtree. Dropping the
//! handle unpins the frame.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::storage::buffer_pool::PageHandle;
use crate::storage::{Rid, RID_SIZE};

use super::{IndexSchema, Operation, IX_PAGE_HDR_SIZE};

const OFF_IS_LEAF: usize = 0;
const OFF_NUM_KEYS: usize = 4;
const OFF_PARENT: usize = 8;
const OFF_PREV_LEAF: usize = 12;
const OFF_NEXT_LEAF: usize = 16;

pub struct NodeHandle {
    pub(crate) handle: PageHandle,
    pub(crate) schema: Arc<IndexSchema>,
}

impl NodeHandle {
    pub fn new(handle: PageHandle, schema: Arc<IndexSchema>) -> Self {
        Self { handle, schema }
    }

    pub fn page_no(&self) -> i32 {
        self.handle.id().page_no
    }

    pub fn handle(&self) -> &PageHandle {
        &self.handle
    }

    fn read_i32(&self, off: usize) -> i32 {
        self.handle
            .page()
            .with_read(|data| i32::from_le_bytes(data[off..off + 4].try_into().unwrap()))
    }

    fn write_i32(&self, off: usize, v: i32) {
        self.handle
            .page()
            .with_write(|data| data[off..off + 4].copy_from_slice(&v.to_le_bytes()));
        self.handle.mark_dirty();
    }

    pub fn is_leaf(&self) -> bool {
        self.handle.page().with_read(|data| data[OFF_IS_LEAF] != 0)
    }

    pub fn set_is_leaf(&self, is_leaf: bool) {
        self.handle
            .page()
            .with_write(|data| data[OFF_IS_LEAF] = is_leaf as u8);
        self.handle.mark_dirty();
    }

    pub fn num_keys(&self) -> usize {
        self.read_i32(OFF_NUM_KEYS) as usize
    }

    pub fn set_num_keys(&self, n: usize) {
        self.write_i32(OFF_NUM_KEYS, n as i32);
    }

    pub fn parent(&self) -> i32 {
        self.read_i32(OFF_PARENT)
    }

    pub fn set_parent(&self, page_no: i32) {
        self.write_i32(OFF_PARENT, page_no);
    }

    pub fn prev_leaf(&self) -> i32 {
        self.read_i32(OFF_PREV_LEAF)
    }

    pub fn set_prev_leaf(&self, page_no: i32) {
        self.write_i32(OFF_PREV_LEAF, page_no);
    }

    pub fn next_leaf(&self) -> i32 {
        self.read_i32(OFF_NEXT_LEAF)
    }

    pub fn set_next_leaf(&self, page_no: i32) {
        self.write_i32(OFF_NEXT_LEAF, page_no);
    }

    /// Number of values held: keys for a leaf, children for an internal
    /// node.
    pub fn num_vals(&self) -> usize {
        if self.is_leaf() {
            self.num_keys()
        } else {
            self.num_keys() + 1
        }
    }

    /// A node is safe for an operation when it cannot split or underflow as
    /// a consequence of it; latch coupling releases ancestors at safe nodes.
    pub fn is_safe(&self, op: Operation, is_root: bool) -> bool {
        match op {
            Operation::Find => true,
            Operation::Insert => self.num_vals() + 1 < self.schema.max_vals(),
            Operation::Delete => {
                if is_root {
                    // The root never underflows structurally: a leaf root may
                    // empty out, an internal root shrinks only at one child.
                    self.is_leaf() || self.num_vals() > 2
                } else {
                    self.num_vals() > self.schema.min_vals()
                }
            }
        }
    }

    fn key_off(&self, i: usize) -> usize {
        IX_PAGE_HDR_SIZE + i * self.schema.col_tot_len
    }

    fn rid_off(&self, i: usize) -> usize {
        IX_PAGE_HDR_SIZE + self.schema.keys_size + i * RID_SIZE
    }

    pub fn key(&self, i: usize) -> Vec<u8> {
        debug_assert!(i < self.num_keys());
        let off = self.key_off(i);
        let len = self.schema.col_tot_len;
        self.handle
            .page()
            .with_read(|data| data[off..off + len].to_vec())
    }

    pub fn set_key(&self, i: usize, key: &[u8]) {
        let off = self.key_off(i);
        let len = self.schema.col_tot_len;
        self.handle
            .page()
            .with_write(|data| data[off..off + len].copy_from_slice(&key[..len]));
        self.handle.mark_dirty();
    }

    pub fn rid(&self, i: usize) -> Rid {
        let off = self.rid_off(i);
        self.handle.page().with_read(|data| {
            Rid::new(
                i32::from_le_bytes(data[off..off + 4].try_into().unwrap()),
                i32::from_le_bytes(data[off + 4..off + 8].try_into().unwrap()),
            )
        })
    }

    pub fn set_rid(&self, i: usize, rid: Rid) {
        let off = self.rid_off(i);
        self.handle.page().with_write(|data| {
            data[off..off + 4].copy_from_slice(&rid.page_no.to_le_bytes());
            data[off + 4..off + 8].copy_from_slice(&rid.slot_no.to_le_bytes());
        });
        self.handle.mark_dirty();
    }

    /// Page number of child `i` (internal nodes only).
    pub fn child(&self, i: usize) -> i32 {
        self.rid(i).page_no
    }

    /// First index whose key is >= `key`.
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        let n = self.num_keys();
        let mut lo = 0;
        let mut hi = n;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.schema.compare(&self.key(mid), key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// First index whose key is > `key`.
    pub fn upper_bound(&self, key: &[u8]) -> usize {
        let n = self.num_keys();
        let mut lo = 0;
        let mut hi = n;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.schema.compare(&self.key(mid), key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Exact-match lookup in a leaf.
    pub fn leaf_lookup(&self, key: &[u8]) -> Option<Rid> {
        let pos = self.lower_bound(key);
        if pos < self.num_keys() && self.schema.compare(&self.key(pos), key) == Ordering::Equal {
            Some(self.rid(pos))
        } else {
            None
        }
    }

    /// Child covering `key` in an internal node. Separator `i` is the exact
    /// minimum of child `i + 1`, so equal keys descend right.
    pub fn internal_lookup(&self, key: &[u8]) -> i32 {
        self.child(self.upper_bound(key))
    }

    /// Index of `page_no` among this internal node's children.
    pub fn child_index_of(&self, page_no: i32) -> usize {
        let n = self.num_vals();
        for i in 0..n {
            if self.child(i) == page_no {
                return i;
            }
        }
        panic!("page {page_no} is not a child of node {}", self.page_no());
    }

    /// Insert `key` at key position `key_pos` and `rid` at rid position
    /// `rid_pos`, shifting the tails right.
    pub fn insert_pair_at(&self, key_pos: usize, rid_pos: usize, key: &[u8], rid: Rid) {
        let n = self.num_keys();
        let n_rids = if self.is_leaf() { n } else { n + 1 };
        let tot = self.schema.col_tot_len;
        let key_start = self.key_off(key_pos);
        let key_end = self.key_off(n);
        let rid_start = self.rid_off(rid_pos);
        let rid_end = self.rid_off(n_rids);

        self.handle.page().with_write(|data| {
            data.copy_within(key_start..key_end, key_start + tot);
            data[key_start..key_start + tot].copy_from_slice(&key[..tot]);
            data.copy_within(rid_start..rid_end, rid_start + RID_SIZE);
            data[rid_start..rid_start + 4].copy_from_slice(&rid.page_no.to_le_bytes());
            data[rid_start + 4..rid_start + 8].copy_from_slice(&rid.slot_no.to_le_bytes());
        });
        self.handle.mark_dirty();
        self.set_num_keys(n + 1);
    }

    /// Remove the key at `key_pos` and the rid at `rid_pos`, shifting the
    /// tails left.
    pub fn erase_pair_at(&self, key_pos: usize, rid_pos: usize) {
        let n = self.num_keys();
        let n_rids = if self.is_leaf() { n } else { n + 1 };
        let tot = self.schema.col_tot_len;
        let key_start = self.key_off(key_pos);
        let key_end = self.key_off(n);
        let rid_start = self.rid_off(rid_pos);
        let rid_end = self.rid_off(n_rids);

        self.handle.page().with_write(|data| {
            data.copy_within(key_start + tot..key_end, key_start);
            data.copy_within(rid_start + RID_SIZE..rid_end, rid_start);
        });
        self.handle.mark_dirty();
        self.set_num_keys(n - 1);
    }

    /// Move keys `[from..n)` and the matching rids into `dst` (which must be
    /// empty), truncating this node. Used by splits.
    pub fn move_upper_half_to(&self, dst: &NodeHandle, key_from: usize, rid_from: usize) {
        let n = self.num_keys();
        let n_rids = if self.is_leaf() { n } else { n + 1 };
        let moved_keys = n - key_from;
        let moved_rids = n_rids - rid_from;
        for i in 0..moved_keys {
            dst.set_key(i, &self.key(key_from + i));
        }
        for i in 0..moved_rids {
            dst.set_rid(i, self.rid(rid_from + i));
        }
        dst.set_num_keys(moved_keys);
        self.set_num_keys(key_from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::ColType;
    use crate::storage::buffer_pool::BufferPoolManager;
    use crate::storage::disk::DiskManager;
    use crate::storage::wal::LogManager;
    use crate::storage::INVALID_PAGE_NO;
    use tempfile::TempDir;

    fn setup() -> (TempDir, NodeHandle) {
        let dir = TempDir::new().unwrap();
        let disk = std::sync::Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = std::sync::Arc::new(LogManager::new(std::sync::Arc::clone(&disk)));
        let bpm = std::sync::Arc::new(BufferPoolManager::new(8, std::sync::Arc::clone(&disk), log));
        disk.create_file("x.idx").unwrap();
        let fd = disk.open_file("x.idx").unwrap();
        let handle = bpm.new_page(fd).unwrap();
        let schema = IndexSchema::new(vec![ColType::Int], vec![4]);
        let node = NodeHandle::new(handle, schema);
        node.set_is_leaf(true);
        node.set_parent(INVALID_PAGE_NO);
        node.set_prev_leaf(INVALID_PAGE_NO);
        node.set_next_leaf(INVALID_PAGE_NO);
        (dir, node)
    }

    fn ikey(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    #[test]
    fn test_sorted_insert_and_bounds() {
        let (_dir, node) = setup();
        for (i, v) in [10, 20, 30].iter().enumerate() {
            node.insert_pair_at(i, i, &ikey(*v), Rid::new(1, *v));
        }
        // keep sorted order when inserting in the middle
        let pos = node.lower_bound(&ikey(15));
        assert_eq!(pos, 1);
        node.insert_pair_at(pos, pos, &ikey(15), Rid::new(1, 15));

        assert_eq!(node.num_keys(), 4);
        let keys: Vec<i32> = (0..4)
            .map(|i| i32::from_le_bytes(node.key(i)[..4].try_into().unwrap()))
            .collect();
        assert_eq!(keys, vec![10, 15, 20, 30]);

        assert_eq!(node.lower_bound(&ikey(20)), 2);
        assert_eq!(node.upper_bound(&ikey(20)), 3);
        assert_eq!(node.leaf_lookup(&ikey(15)), Some(Rid::new(1, 15)));
        assert_eq!(node.leaf_lookup(&ikey(16)), None);
    }

    #[test]
    fn test_erase_shifts_tail() {
        let (_dir, node) = setup();
        for (i, v) in [1, 2, 3].iter().enumerate() {
            node.insert_pair_at(i, i, &ikey(*v), Rid::new(1, *v));
        }
        node.erase_pair_at(1, 1);
        assert_eq!(node.num_keys(), 2);
        assert_eq!(node.leaf_lookup(&ikey(2)), None);
        assert_eq!(node.leaf_lookup(&ikey(3)), Some(Rid::new(1, 3)));
    }
}
