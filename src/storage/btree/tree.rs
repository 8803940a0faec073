//! B+tree structure operations
//!
//! Search, insert with split, delete with redistribute/coalesce, and the
//! bound lookups that feed range scans. When a transaction is supplied and
//! the `lock-crabbing` feature is on, descents latch-couple: each node is
//! latched before its parent's latch is given up, and all retained latches
//! release as soon as a node is proven safe. Without a transaction a
//! per-tree mutex serializes the whole operation instead.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::catalog::types::ColType;
use crate::error::{Error, Result};
use crate::storage::buffer_pool::BufferPoolManager;
use crate::storage::page::PageId;
use crate::storage::{Rid, INVALID_PAGE_NO};
use crate::transaction::transaction::Transaction;
#[cfg(feature = "lock-crabbing")]
use crate::transaction::transaction::{IndexLatch, LatchMode};

use super::node::NodeHandle;
use super::{Iid, IndexSchema, IxFileHdr, Operation};

struct TreeState {
    root: i32,
    first_leaf: i32,
    last_leaf: i32,
    num_pages: i32,
}

/// A B+tree index over one index file
pub struct BPlusTree {
    fd: i32,
    schema: Arc<IndexSchema>,
    state: Mutex<TreeState>,
    /// Whole-operation serialization when latch coupling is not in effect
    tree_latch: Mutex<()>,
    bpm: Arc<BufferPoolManager>,
}

impl BPlusTree {
    /// Initialize a fresh index file: header page plus an empty leaf root.
    pub fn create(
        fd: i32,
        col_types: Vec<ColType>,
        col_lens: Vec<usize>,
        bpm: Arc<BufferPoolManager>,
    ) -> Result<Arc<Self>> {
        let schema = IndexSchema::new(col_types, col_lens);
        let hdr_page = bpm.new_page(fd)?;
        assert_eq!(hdr_page.id().page_no, 0);
        hdr_page.mark_dirty();
        drop(hdr_page);

        let tree = Arc::new(Self {
            fd,
            schema,
            state: Mutex::new(TreeState {
                root: INVALID_PAGE_NO,
                first_leaf: INVALID_PAGE_NO,
                last_leaf: INVALID_PAGE_NO,
                num_pages: 1,
            }),
            tree_latch: Mutex::new(()),
            bpm,
        });

        let root = tree.create_node(true)?;
        {
            let mut state = tree.state.lock().unwrap();
            state.root = root.page_no();
            state.first_leaf = root.page_no();
            state.last_leaf = root.page_no();
        }
        drop(root);
        tree.flush_hdr()?;
        // The header and the empty root must survive a crash so the file
        // opens cleanly before recovery rebuilds it.
        tree.bpm.flush_page(PageId::new(fd, 0))?;
        tree.bpm.flush_page(PageId::new(fd, 1))?;
        Ok(tree)
    }

    /// Open an existing index file from its header page.
    pub fn open(fd: i32, bpm: Arc<BufferPoolManager>) -> Result<Arc<Self>> {
        let hdr = {
            let page = bpm.fetch_page(PageId::new(fd, 0))?;
            page.page().with_read(IxFileHdr::deserialize)?
        };
        let num_pages = hdr.num_pages.max(bpm.disk_manager().num_pages(fd)?);
        bpm.disk_manager().reserve_pages(fd, num_pages)?;
        let schema = IndexSchema::new(hdr.col_types.clone(), hdr.col_lens.clone());
        Ok(Arc::new(Self {
            fd,
            schema,
            state: Mutex::new(TreeState {
                root: hdr.root_page,
                first_leaf: hdr.first_leaf,
                last_leaf: hdr.last_leaf,
                num_pages,
            }),
            tree_latch: Mutex::new(()),
            bpm,
        }))
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    /// Persist the file header (root, leaf chain ends, column layout).
    pub fn flush_hdr(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        let hdr = IxFileHdr {
            num_pages: state.num_pages,
            root_page: state.root,
            first_leaf: state.first_leaf,
            last_leaf: state.last_leaf,
            col_types: self.schema.col_types.clone(),
            col_lens: self.schema.col_lens.clone(),
        };
        drop(state);
        let page = self.bpm.fetch_page(PageId::new(self.fd, 0))?;
        page.page().with_write(|data| hdr.serialize(data));
        page.mark_dirty();
        Ok(())
    }

    // ===== point operations =====

    /// Exact-match lookup.
    pub fn get(&self, key: &[u8], txn: Option<&Arc<Transaction>>) -> Result<Option<Rid>> {
        let _guard = self.op_guard(txn);
        let result = (|| {
            let leaf = self.find_leaf(key, Operation::Find, txn)?;
            Ok(leaf.leaf_lookup(key))
        })();
        self.release_latches(txn);
        result
    }

    /// Existence probe used by unique-index prechecks.
    pub fn contains(&self, key: &[u8], txn: Option<&Arc<Transaction>>) -> Result<bool> {
        Ok(self.get(key, txn)?.is_some())
    }

    /// Insert a key. Duplicates fail with `IndexInsertDuplicated`.
    pub fn insert(&self, key: &[u8], rid: Rid, txn: Option<&Arc<Transaction>>) -> Result<()> {
        let _guard = self.op_guard(txn);
        let result = self.insert_inner(key, rid, txn);
        self.release_latches(txn);
        result
    }

    fn insert_inner(&self, key: &[u8], rid: Rid, txn: Option<&Arc<Transaction>>) -> Result<()> {
        let leaf = self.find_leaf(key, Operation::Insert, txn)?;
        if leaf.leaf_lookup(key).is_some() {
            return Err(Error::IndexInsertDuplicated);
        }
        let pos = leaf.lower_bound(key);
        leaf.insert_pair_at(pos, pos, key, rid);
        if pos == 0 {
            self.maintain_parent(&leaf)?;
        }
        if leaf.num_keys() == self.schema.max_vals() {
            let (new_node, sep) = self.split(&leaf)?;
            self.insert_into_parent(leaf, &sep, new_node)?;
        }
        Ok(())
    }

    /// Delete a key (whose entry must reference `rid`). Returns whether the
    /// key was present.
    pub fn delete(&self, key: &[u8], rid: Rid, txn: Option<&Arc<Transaction>>) -> Result<bool> {
        let _guard = self.op_guard(txn);
        let mut freed = Vec::new();
        let result = self.delete_inner(key, rid, txn, &mut freed);
        self.release_latches(txn);
        // Emptied nodes are unreachable by now; return them to the disk
        // manager once every pin is gone.
        for page_no in freed {
            self.bpm.delete_page(PageId::new(self.fd, page_no))?;
            self.state.lock().unwrap().num_pages -= 1;
        }
        result
    }

    fn delete_inner(
        &self,
        key: &[u8],
        rid: Rid,
        txn: Option<&Arc<Transaction>>,
        freed: &mut Vec<i32>,
    ) -> Result<bool> {
        let leaf = self.find_leaf(key, Operation::Delete, txn)?;
        let pos = leaf.lower_bound(key);
        if pos >= leaf.num_keys()
            || self.schema.compare(&leaf.key(pos), key) != std::cmp::Ordering::Equal
        {
            return Ok(false);
        }
        debug_assert_eq!(leaf.rid(pos), rid, "index entry rid mismatch");
        leaf.erase_pair_at(pos, pos);
        if pos == 0 && leaf.num_keys() > 0 {
            self.maintain_parent(&leaf)?;
        }
        if leaf.parent() != INVALID_PAGE_NO && leaf.num_vals() < self.schema.min_vals() {
            self.coalesce_or_redistribute(leaf, freed)?;
        }
        Ok(true)
    }

    // ===== descent =====

    fn find_leaf(
        &self,
        key: &[u8],
        op: Operation,
        txn: Option<&Arc<Transaction>>,
    ) -> Result<NodeHandle> {
        loop {
            let root = self.state.lock().unwrap().root;
            let mut node = self.fetch_node(root)?;
            self.crab(op, &node, txn)?;
            if node.parent() != INVALID_PAGE_NO {
                // The root split between reading it and latching it.
                self.release_latches(txn);
                continue;
            }
            while !node.is_leaf() {
                let child_no = node.internal_lookup(key);
                let child = self.fetch_node(child_no)?;
                self.crab(op, &child, txn)?;
                node = child;
            }
            return Ok(node);
        }
    }

    /// Latch-couple onto `node`: latch it, release every retained ancestor
    /// latch if the node is safe, then retain the new latch.
    #[cfg(feature = "lock-crabbing")]
    fn crab(&self, op: Operation, node: &NodeHandle, txn: Option<&Arc<Transaction>>) -> Result<()> {
        let Some(txn) = txn else { return Ok(()) };
        let mode = match op {
            Operation::Find => LatchMode::Read,
            _ => LatchMode::Write,
        };
        match mode {
            LatchMode::Read => node.handle().page().latch.lock_read(),
            LatchMode::Write => node.handle().page().latch.lock_write(),
        }
        let is_root = node.parent() == INVALID_PAGE_NO;
        if node.is_safe(op, is_root) {
            for latch in txn.take_index_latches() {
                latch.release();
            }
        }
        let latch_handle = self.bpm.fetch_page(PageId::new(self.fd, node.page_no()))?;
        txn.append_index_latch(IndexLatch {
            handle: latch_handle,
            mode,
        });
        Ok(())
    }

    #[cfg(not(feature = "lock-crabbing"))]
    fn crab(
        &self,
        _op: Operation,
        _node: &NodeHandle,
        _txn: Option<&Arc<Transaction>>,
    ) -> Result<()> {
        Ok(())
    }

    fn release_latches(&self, txn: Option<&Arc<Transaction>>) {
        #[cfg(feature = "lock-crabbing")]
        if let Some(txn) = txn {
            for latch in txn.take_index_latches() {
                latch.release();
            }
        }
        #[cfg(not(feature = "lock-crabbing"))]
        let _ = txn;
    }

    fn op_guard(&self, txn: Option<&Arc<Transaction>>) -> Option<MutexGuard<'_, ()>> {
        let crabbing = cfg!(feature = "lock-crabbing") && txn.is_some();
        if crabbing {
            None
        } else {
            Some(self.tree_latch.lock().unwrap())
        }
    }

    // ===== structural maintenance =====

    /// Split an overfull node, returning the new right sibling and the
    /// separator key to push into the parent.
    fn split(&self, node: &NodeHandle) -> Result<(NodeHandle, Vec<u8>)> {
        let n = node.num_keys();
        if node.is_leaf() {
            let mid = n / 2;
            let new_node = self.create_node(true)?;
            node.move_upper_half_to(&new_node, mid, mid);
            new_node.set_parent(node.parent());

            new_node.set_prev_leaf(node.page_no());
            new_node.set_next_leaf(node.next_leaf());
            if node.next_leaf() != INVALID_PAGE_NO {
                self.fetch_node(node.next_leaf())?
                    .set_prev_leaf(new_node.page_no());
            } else {
                self.state.lock().unwrap().last_leaf = new_node.page_no();
            }
            node.set_next_leaf(new_node.page_no());

            // Leaf separators are copied up: the right node keeps its first
            // key.
            let sep = new_node.key(0);
            debug!(
                "split leaf {} -> {} ({} keys)",
                node.page_no(),
                new_node.page_no(),
                n
            );
            Ok((new_node, sep))
        } else {
            let mid = n / 2;
            let sep = node.key(mid);
            let new_node = self.create_node(false)?;
            // Right node takes keys (mid..n] exclusive of the separator and
            // the matching children; the separator itself moves up.
            node.move_upper_half_to(&new_node, mid + 1, mid + 1);
            node.set_num_keys(mid);
            new_node.set_parent(node.parent());
            for i in 0..new_node.num_vals() {
                self.fetch_node(new_node.child(i))?
                    .set_parent(new_node.page_no());
            }
            debug!(
                "split internal {} -> {} ({} keys)",
                node.page_no(),
                new_node.page_no(),
                n
            );
            Ok((new_node, sep))
        }
    }

    /// Wire a freshly split right node into the parent, growing a new root
    /// when the old root split.
    fn insert_into_parent(
        &self,
        left: NodeHandle,
        sep: &[u8],
        right: NodeHandle,
    ) -> Result<()> {
        if left.parent() == INVALID_PAGE_NO {
            let new_root = self.create_node(false)?;
            new_root.set_key(0, sep);
            new_root.set_rid(0, Rid::new(left.page_no(), -1));
            new_root.set_rid(1, Rid::new(right.page_no(), -1));
            new_root.set_num_keys(1);
            left.set_parent(new_root.page_no());
            right.set_parent(new_root.page_no());
            self.state.lock().unwrap().root = new_root.page_no();
            debug!("grew new root {}", new_root.page_no());
            return Ok(());
        }

        let parent = self.fetch_node(left.parent())?;
        let idx = parent.child_index_of(left.page_no());
        parent.insert_pair_at(idx, idx + 1, sep, Rid::new(right.page_no(), -1));
        right.set_parent(parent.page_no());
        drop(left);
        drop(right);
        if parent.num_vals() == self.schema.max_vals() {
            let (new_parent, sep2) = self.split(&parent)?;
            self.insert_into_parent(parent, &sep2, new_parent)?;
        }
        Ok(())
    }

    /// Propagate a changed subtree minimum into the ancestor separator that
    /// names it.
    fn maintain_parent(&self, node: &NodeHandle) -> Result<()> {
        let first_key = node.key(0);
        let mut child_no = node.page_no();
        let mut parent_no = node.parent();
        while parent_no != INVALID_PAGE_NO {
            let parent = self.fetch_node(parent_no)?;
            let idx = parent.child_index_of(child_no);
            if idx == 0 {
                // Leftmost child: its minimum is also the parent subtree's
                // minimum, keep walking up.
                child_no = parent_no;
                parent_no = parent.parent();
                continue;
            }
            parent.set_key(idx - 1, &first_key);
            break;
        }
        Ok(())
    }

    fn coalesce_or_redistribute(&self, node: NodeHandle, freed: &mut Vec<i32>) -> Result<()> {
        if node.parent() == INVALID_PAGE_NO {
            return self.adjust_root(node, freed);
        }
        let parent = self.fetch_node(node.parent())?;
        let idx = parent.child_index_of(node.page_no());
        // Prefer the left sibling.
        let node_is_right = idx > 0;
        let sib_no = if node_is_right {
            parent.child(idx - 1)
        } else {
            parent.child(idx + 1)
        };
        let sibling = self.fetch_node(sib_no)?;

        if node.num_vals() + sibling.num_vals() >= 2 * self.schema.min_vals() {
            self.redistribute(&sibling, &node, &parent, idx, node_is_right)
        } else {
            self.coalesce(sibling, node, parent, idx, node_is_right, freed)
        }
    }

    /// Move one value from the sibling into the underflowing node and fix
    /// the separator between them.
    fn redistribute(
        &self,
        sibling: &NodeHandle,
        node: &NodeHandle,
        parent: &NodeHandle,
        idx: usize,
        node_is_right: bool,
    ) -> Result<()> {
        if node_is_right {
            // Sibling on the left: move its last value to node's front.
            let m = sibling.num_keys();
            if node.is_leaf() {
                let key = sibling.key(m - 1);
                let rid = sibling.rid(m - 1);
                sibling.erase_pair_at(m - 1, m - 1);
                node.insert_pair_at(0, 0, &key, rid);
                parent.set_key(idx - 1, &key);
            } else {
                let moved_child = sibling.child(m);
                let old_sep = parent.key(idx - 1);
                node.insert_pair_at(0, 0, &old_sep, Rid::new(moved_child, -1));
                parent.set_key(idx - 1, &sibling.key(m - 1));
                sibling.erase_pair_at(m - 1, m);
                self.fetch_node(moved_child)?.set_parent(node.page_no());
            }
        } else {
            // Sibling on the right: move its first value to node's end.
            let n = node.num_keys();
            if node.is_leaf() {
                let key = sibling.key(0);
                let rid = sibling.rid(0);
                sibling.erase_pair_at(0, 0);
                node.insert_pair_at(n, n, &key, rid);
                parent.set_key(idx, &sibling.key(0));
            } else {
                let moved_child = sibling.child(0);
                let old_sep = parent.key(idx);
                node.insert_pair_at(n, n + 1, &old_sep, Rid::new(moved_child, -1));
                parent.set_key(idx, &sibling.key(0));
                sibling.erase_pair_at(0, 0);
                self.fetch_node(moved_child)?.set_parent(node.page_no());
            }
        }
        Ok(())
    }

    /// Merge two siblings into the left one, removing the separator from the
    /// parent and recursing if the parent underflows.
    fn coalesce(
        &self,
        sibling: NodeHandle,
        node: NodeHandle,
        parent: NodeHandle,
        idx: usize,
        node_is_right: bool,
        freed: &mut Vec<i32>,
    ) -> Result<()> {
        let (left, right, sep_idx) = if node_is_right {
            (sibling, node, idx - 1)
        } else {
            (node, sibling, idx)
        };

        if left.is_leaf() {
            let base = left.num_keys();
            for i in 0..right.num_keys() {
                left.insert_pair_at(base + i, base + i, &right.key(i), right.rid(i));
            }
            left.set_next_leaf(right.next_leaf());
            if right.next_leaf() != INVALID_PAGE_NO {
                self.fetch_node(right.next_leaf())?
                    .set_prev_leaf(left.page_no());
            } else {
                self.state.lock().unwrap().last_leaf = left.page_no();
            }
        } else {
            let sep = parent.key(sep_idx);
            let base = left.num_keys();
            left.insert_pair_at(base, base + 1, &sep, Rid::new(right.child(0), -1));
            for i in 0..right.num_keys() {
                left.insert_pair_at(base + 1 + i, base + 2 + i, &right.key(i), right.rid(i + 1));
            }
            for i in 0..right.num_vals() {
                self.fetch_node(right.child(i))?.set_parent(left.page_no());
            }
        }
        debug!("coalesced node {} into {}", right.page_no(), left.page_no());
        freed.push(right.page_no());
        drop(right);
        drop(left);

        parent.erase_pair_at(sep_idx, sep_idx + 1);
        if parent.parent() == INVALID_PAGE_NO {
            if parent.num_keys() == 0 {
                self.adjust_root(parent, freed)?;
            }
        } else if parent.num_vals() < self.schema.min_vals() {
            self.coalesce_or_redistribute(parent, freed)?;
        }
        Ok(())
    }

    /// Shrink the root: an internal root left with a single child hands the
    /// root role to that child. An empty leaf root stays as the empty tree.
    fn adjust_root(&self, old_root: NodeHandle, freed: &mut Vec<i32>) -> Result<()> {
        if !old_root.is_leaf() && old_root.num_keys() == 0 {
            let child_no = old_root.child(0);
            self.fetch_node(child_no)?.set_parent(INVALID_PAGE_NO);
            self.state.lock().unwrap().root = child_no;
            freed.push(old_root.page_no());
            debug!("root shrank to {}", child_no);
        }
        Ok(())
    }

    // ===== bounds and scan support =====

    /// Iid of the first entry with key >= `key`.
    pub fn lower_bound(&self, key: &[u8]) -> Result<Iid> {
        self.bound(key, false)
    }

    /// Iid of the first entry with key > `key`.
    pub fn upper_bound(&self, key: &[u8]) -> Result<Iid> {
        self.bound(key, true)
    }

    fn bound(&self, key: &[u8], upper: bool) -> Result<Iid> {
        let (root, last_leaf) = {
            let state = self.state.lock().unwrap();
            (state.root, state.last_leaf)
        };
        let mut node = self.fetch_node(root)?;
        while !node.is_leaf() {
            node = self.fetch_node(node.internal_lookup(key))?;
        }
        let pos = if upper {
            node.upper_bound(key)
        } else {
            node.lower_bound(key)
        };
        if pos == node.num_keys() && node.page_no() != last_leaf {
            Ok(Iid::new(node.next_leaf(), 0))
        } else {
            Ok(Iid::new(node.page_no(), pos as i32))
        }
    }

    /// Iid of the smallest entry.
    pub fn leaf_begin(&self) -> Iid {
        Iid::new(self.state.lock().unwrap().first_leaf, 0)
    }

    /// Iid one past the largest entry.
    pub fn leaf_end(&self) -> Result<Iid> {
        let last = self.state.lock().unwrap().last_leaf;
        let node = self.fetch_node(last)?;
        Ok(Iid::new(last, node.num_keys() as i32))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.leaf_begin() == self.leaf_end()?)
    }

    /// Heap rid stored at `iid`.
    pub fn get_rid(&self, iid: Iid) -> Result<Rid> {
        let node = self.fetch_node(iid.page_no)?;
        Ok(node.rid(iid.slot_no as usize))
    }

    /// Key bytes stored at `iid`.
    pub fn get_key(&self, iid: Iid) -> Result<Vec<u8>> {
        let node = self.fetch_node(iid.page_no)?;
        Ok(node.key(iid.slot_no as usize))
    }

    /// `(num_keys, next_leaf)` of a leaf, for scan advancement.
    pub(crate) fn leaf_info(&self, page_no: i32) -> Result<(usize, i32)> {
        let node = self.fetch_node(page_no)?;
        Ok((node.num_keys(), node.next_leaf()))
    }

    /// Smallest value of the leading integer column; 1 on an empty tree so
    /// that `first..=last` iterates nothing.
    pub fn first_ind_key(&self) -> Result<i32> {
        if self.is_empty()? {
            return Ok(1);
        }
        let key = self.get_key(self.leaf_begin())?;
        Ok(i32::from_le_bytes(key[..4].try_into().unwrap()))
    }

    /// Largest value of the leading integer column; 0 on an empty tree.
    pub fn last_ind_key(&self) -> Result<i32> {
        if self.is_empty()? {
            return Ok(0);
        }
        let end = self.leaf_end()?;
        let key = self.get_key(Iid::new(end.page_no, end.slot_no - 1))?;
        Ok(i32::from_le_bytes(key[..4].try_into().unwrap()))
    }

    /// Leading integer column value at `iid`, if in range.
    pub fn find_ind_key_at(&self, iid: Iid) -> Result<Option<i32>> {
        let node = self.fetch_node(iid.page_no)?;
        if (iid.slot_no as usize) < node.num_keys() {
            let key = node.key(iid.slot_no as usize);
            Ok(Some(i32::from_le_bytes(key[..4].try_into().unwrap())))
        } else {
            Ok(None)
        }
    }

    // ===== node plumbing =====

    fn fetch_node(&self, page_no: i32) -> Result<NodeHandle> {
        let handle = self.bpm.fetch_page(PageId::new(self.fd, page_no))?;
        Ok(NodeHandle::new(handle, Arc::clone(&self.schema)))
    }

    fn create_node(&self, is_leaf: bool) -> Result<NodeHandle> {
        let handle = self.bpm.new_page(self.fd)?;
        let node = NodeHandle::new(handle, Arc::clone(&self.schema));
        node.set_is_leaf(is_leaf);
        node.set_num_keys(0);
        node.set_parent(INVALID_PAGE_NO);
        node.set_prev_leaf(INVALID_PAGE_NO);
        node.set_next_leaf(INVALID_PAGE_NO);
        self.state.lock().unwrap().num_pages += 1;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use crate::storage::wal::LogManager;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<BPlusTree>) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(256, Arc::clone(&disk), log));
        disk.create_file("t_a.idx").unwrap();
        let fd = disk.open_file("t_a.idx").unwrap();
        let tree = BPlusTree::create(fd, vec![ColType::Int], vec![4], bpm).unwrap();
        (dir, tree)
    }

    fn ikey(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    fn collect_keys(tree: &BPlusTree) -> Vec<i32> {
        let mut out = Vec::new();
        let mut iid = tree.leaf_begin();
        let end = tree.leaf_end().unwrap();
        while iid != end {
            let (num_keys, next) = tree.leaf_info(iid.page_no).unwrap();
            if iid.slot_no as usize >= num_keys {
                iid = Iid::new(next, 0);
                continue;
            }
            let key = tree.get_key(iid).unwrap();
            out.push(i32::from_le_bytes(key[..4].try_into().unwrap()));
            iid.slot_no += 1;
        }
        out
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, tree) = setup();
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.get(&ikey(1), None).unwrap(), None);
        assert_eq!(tree.first_ind_key().unwrap(), 1);
        assert_eq!(tree.last_ind_key().unwrap(), 0);
    }

    #[test]
    fn test_insert_get_delete() {
        let (_dir, tree) = setup();
        tree.insert(&ikey(5), Rid::new(1, 5), None).unwrap();
        tree.insert(&ikey(3), Rid::new(1, 3), None).unwrap();
        tree.insert(&ikey(7), Rid::new(1, 7), None).unwrap();

        assert_eq!(tree.get(&ikey(3), None).unwrap(), Some(Rid::new(1, 3)));
        assert_eq!(tree.get(&ikey(4), None).unwrap(), None);

        assert!(tree.delete(&ikey(3), Rid::new(1, 3), None).unwrap());
        assert_eq!(tree.get(&ikey(3), None).unwrap(), None);
        assert!(!tree.delete(&ikey(3), Rid::new(1, 3), None).unwrap());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (_dir, tree) = setup();
        tree.insert(&ikey(1), Rid::new(1, 0), None).unwrap();
        let err = tree.insert(&ikey(1), Rid::new(1, 1), None);
        assert!(matches!(err, Err(Error::IndexInsertDuplicated)));
        // first entry survives
        assert_eq!(tree.get(&ikey(1), None).unwrap(), Some(Rid::new(1, 0)));
    }

    #[test]
    fn test_many_inserts_stay_sorted() {
        let (_dir, tree) = setup();
        let mut values: Vec<i32> = (0..2000).collect();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        values.shuffle(&mut rng);

        for &v in &values {
            tree.insert(&ikey(v), Rid::new(1, v), None).unwrap();
        }
        for &v in &values {
            assert_eq!(tree.get(&ikey(v), None).unwrap(), Some(Rid::new(1, v)));
        }
        let keys = collect_keys(&tree);
        assert_eq!(keys, (0..2000).collect::<Vec<_>>());
        assert_eq!(tree.first_ind_key().unwrap(), 0);
        assert_eq!(tree.last_ind_key().unwrap(), 1999);
    }

    #[test]
    fn test_delete_shrinks_back_to_empty() {
        let (_dir, tree) = setup();
        let mut values: Vec<i32> = (0..1500).collect();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        values.shuffle(&mut rng);

        for &v in &values {
            tree.insert(&ikey(v), Rid::new(1, v), None).unwrap();
        }
        values.shuffle(&mut rng);
        for &v in &values {
            assert!(tree.delete(&ikey(v), Rid::new(1, v), None).unwrap(), "{v}");
        }
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.get(&ikey(0), None).unwrap(), None);

        // Tree remains usable after shrinking to an empty root.
        tree.insert(&ikey(11), Rid::new(1, 11), None).unwrap();
        assert_eq!(tree.get(&ikey(11), None).unwrap(), Some(Rid::new(1, 11)));
    }

    #[test]
    fn test_interleaved_churn() {
        let (_dir, tree) = setup();
        let mut rng = rand::rngs::StdRng::seed_from_u64(99);
        let mut live: Vec<i32> = Vec::new();
        for round in 0..10 {
            let base = round * 300;
            for v in base..base + 300 {
                tree.insert(&ikey(v), Rid::new(1, v), None).unwrap();
                live.push(v);
            }
            live.shuffle(&mut rng);
            for _ in 0..150 {
                let v = live.pop().unwrap();
                assert!(tree.delete(&ikey(v), Rid::new(1, v), None).unwrap());
            }
        }
        live.sort_unstable();
        assert_eq!(collect_keys(&tree), live);
    }

    #[test]
    fn test_bounds() {
        let (_dir, tree) = setup();
        for v in [10, 20, 30, 40] {
            tree.insert(&ikey(v), Rid::new(1, v), None).unwrap();
        }
        let lb = tree.lower_bound(&ikey(20)).unwrap();
        assert_eq!(tree.get_rid(lb).unwrap(), Rid::new(1, 20));
        let ub = tree.upper_bound(&ikey(20)).unwrap();
        assert_eq!(tree.get_rid(ub).unwrap(), Rid::new(1, 30));
        // Past the maximum both bounds hit leaf_end.
        assert_eq!(tree.upper_bound(&ikey(40)).unwrap(), tree.leaf_end().unwrap());
    }

    #[test]
    fn test_reopen_after_flush() {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(256, Arc::clone(&disk), log));
        disk.create_file("t_a.idx").unwrap();
        let fd = disk.open_file("t_a.idx").unwrap();
        {
            let tree = BPlusTree::create(fd, vec![ColType::Int], vec![4], Arc::clone(&bpm)).unwrap();
            for v in 0..500 {
                tree.insert(&ikey(v), Rid::new(1, v), None).unwrap();
            }
            tree.flush_hdr().unwrap();
            bpm.flush_all(fd).unwrap();
        }
        let tree = BPlusTree::open(fd, bpm).unwrap();
        for v in 0..500 {
            assert_eq!(tree.get(&ikey(v), None).unwrap(), Some(Rid::new(1, v)));
        }
    }
}
