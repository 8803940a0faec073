//! Index range scans
//!
//! An `IxScan` walks leaf entries between a lower and an upper `Iid`,
//! following the leaf chain at page boundaries. Bounds are computed by the
//! caller from predicates via `lower_bound`/`upper_bound`.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::Rid;

use super::tree::BPlusTree;
use super::Iid;

pub struct IxScan {
    tree: Arc<BPlusTree>,
    iid: Iid,
    end: Iid,
}

impl IxScan {
    pub fn new(tree: Arc<BPlusTree>, lower: Iid, upper: Iid) -> Self {
        Self {
            tree,
            iid: lower,
            end: upper,
        }
    }

    pub fn is_end(&self) -> bool {
        self.iid == self.end
    }

    pub fn iid(&self) -> Iid {
        self.iid
    }

    /// Heap rid of the current entry.
    pub fn rid(&self) -> Result<Rid> {
        self.tree.get_rid(self.iid)
    }

    /// Key bytes of the current entry.
    pub fn key(&self) -> Result<Vec<u8>> {
        self.tree.get_key(self.iid)
    }

    /// Advance one entry, crossing to the next leaf at the boundary.
    pub fn next(&mut self) -> Result<()> {
        debug_assert!(!self.is_end());
        self.iid.slot_no += 1;
        let (num_keys, next_leaf) = self.tree.leaf_info(self.iid.page_no)?;
        if self.iid.slot_no as usize >= num_keys && self.iid.page_no != self.end.page_no {
            self.iid = Iid::new(next_leaf, 0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::ColType;
    use crate::storage::buffer_pool::BufferPoolManager;
    use crate::storage::disk::DiskManager;
    use crate::storage::wal::LogManager;
    use tempfile::TempDir;

    fn setup_tree(n: i32) -> (TempDir, Arc<BPlusTree>) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(128, Arc::clone(&disk), log));
        disk.create_file("s.idx").unwrap();
        let fd = disk.open_file("s.idx").unwrap();
        let tree = BPlusTree::create(fd, vec![ColType::Int], vec![4], bpm).unwrap();
        for v in 0..n {
            tree.insert(&v.to_le_bytes(), Rid::new(1, v), None).unwrap();
        }
        (dir, tree)
    }

    fn drain(scan: &mut IxScan) -> Vec<i32> {
        let mut out = Vec::new();
        while !scan.is_end() {
            out.push(scan.rid().unwrap().slot_no);
            scan.next().unwrap();
        }
        out
    }

    #[test]
    fn test_full_scan_crosses_leaves() {
        let (_dir, tree) = setup_tree(1000);
        let mut scan = IxScan::new(
            Arc::clone(&tree),
            tree.leaf_begin(),
            tree.leaf_end().unwrap(),
        );
        assert_eq!(drain(&mut scan), (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_bounded_scan() {
        let (_dir, tree) = setup_tree(100);
        let lower = tree.lower_bound(&40i32.to_le_bytes()).unwrap();
        let upper = tree.upper_bound(&59i32.to_le_bytes()).unwrap();
        let mut scan = IxScan::new(Arc::clone(&tree), lower, upper);
        assert_eq!(drain(&mut scan), (40..60).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_range() {
        let (_dir, tree) = setup_tree(10);
        let lower = tree.lower_bound(&5i32.to_le_bytes()).unwrap();
        let upper = tree.lower_bound(&5i32.to_le_bytes()).unwrap();
        let scan = IxScan::new(tree, lower, upper);
        assert!(scan.is_end());
    }
}
