//! Record heap files
//!
//! Fixed-size records in bitmap-tracked slotted pages. Page 0 of each table
//! file holds the file header `{record_size, records_per_page, num_pages}`;
//! data pages carry `{num_records, next_free_page_hint}`, the occupancy
//! bitmap, then the slot array. A per-table mutex serializes structural
//! bookkeeping (page allocation and the free-slot hint set); record contents
//! are protected by the lock manager.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::context::Context;
use crate::error::Result;
use crate::storage::buffer_pool::{BufferPoolManager, PageHandle};
use crate::storage::page::PageId;
use crate::storage::wal::{LogRecordBody, Lsn};
use crate::storage::{Rid, INVALID_PAGE_NO, PAGE_SIZE};
use crate::transaction::transaction::{WriteKind, WriteRecord};

/// Data page header: `num_records: i32`, `next_free_page_hint: i32`
const HEAP_PAGE_HDR_SIZE: usize = 8;

/// File header layout on page 0
const HDR_RECORD_SIZE: usize = 0;
const HDR_RECORDS_PER_PAGE: usize = 4;
const HDR_NUM_PAGES: usize = 8;

/// Largest record count whose header + bitmap + slots fit in one page.
fn records_per_page(record_size: usize) -> usize {
    let mut n = (PAGE_SIZE - HEAP_PAGE_HDR_SIZE) * 8 / (1 + record_size * 8);
    while HEAP_PAGE_HDR_SIZE + n.div_ceil(8) + n * record_size > PAGE_SIZE {
        n -= 1;
    }
    assert!(n > 0, "record size {record_size} too large for a page");
    n
}

fn bit_get(bitmap: &[u8], i: usize) -> bool {
    bitmap[i / 8] & (1 << (i % 8)) != 0
}

fn bit_set(bitmap: &mut [u8], i: usize) {
    bitmap[i / 8] |= 1 << (i % 8);
}

fn bit_clear(bitmap: &mut [u8], i: usize) {
    bitmap[i / 8] &= !(1 << (i % 8));
}

struct HeapState {
    /// Total pages in the file, header page included
    num_pages: i32,
    /// Hint set of data pages with at least one free slot
    free_pages: BTreeSet<i32>,
}

/// One table's heap file
pub struct HeapFile {
    name: String,
    fd: i32,
    record_size: usize,
    records_per_page: usize,
    bitmap_size: usize,
    state: Mutex<HeapState>,
    bpm: Arc<BufferPoolManager>,
}

impl HeapFile {
    /// Initialize a brand-new heap file (writes the header page).
    pub fn create(
        name: &str,
        fd: i32,
        record_size: usize,
        bpm: Arc<BufferPoolManager>,
    ) -> Result<Arc<Self>> {
        let rpp = records_per_page(record_size);
        let heap = Arc::new(Self {
            name: name.to_string(),
            fd,
            record_size,
            records_per_page: rpp,
            bitmap_size: rpp.div_ceil(8),
            state: Mutex::new(HeapState {
                num_pages: 1,
                free_pages: BTreeSet::new(),
            }),
            bpm,
        });

        let hdr = heap.bpm.new_page(fd)?;
        assert_eq!(hdr.id().page_no, 0, "header must be the first page");
        hdr.page().with_write(|data| {
            data[HDR_RECORD_SIZE..HDR_RECORD_SIZE + 4]
                .copy_from_slice(&(record_size as i32).to_le_bytes());
            data[HDR_RECORDS_PER_PAGE..HDR_RECORDS_PER_PAGE + 4]
                .copy_from_slice(&(rpp as i32).to_le_bytes());
            data[HDR_NUM_PAGES..HDR_NUM_PAGES + 4].copy_from_slice(&1i32.to_le_bytes());
        });
        hdr.mark_dirty();
        drop(hdr);
        // The header must survive a crash: later opens derive the record
        // layout from it.
        heap.bpm.flush_page(PageId::new(fd, 0))?;
        Ok(heap)
    }

    /// Open an existing heap file, rebuilding the free-slot hint set from
    /// the page bitmaps. The page count reconciles the stored header with
    /// the actual file length (they diverge after a crash) and the disk
    /// allocator is moved past both.
    pub fn open(name: &str, fd: i32, bpm: Arc<BufferPoolManager>) -> Result<Arc<Self>> {
        let (record_size, rpp, num_pages) = {
            let hdr = bpm.fetch_page(PageId::new(fd, 0))?;
            hdr.page().with_read(|data| {
                (
                    i32::from_le_bytes(data[HDR_RECORD_SIZE..HDR_RECORD_SIZE + 4].try_into().unwrap())
                        as usize,
                    i32::from_le_bytes(
                        data[HDR_RECORDS_PER_PAGE..HDR_RECORDS_PER_PAGE + 4]
                            .try_into()
                            .unwrap(),
                    ) as usize,
                    i32::from_le_bytes(data[HDR_NUM_PAGES..HDR_NUM_PAGES + 4].try_into().unwrap()),
                )
            })
        };
        let num_pages = num_pages.max(bpm.disk_manager().num_pages(fd)?);
        bpm.disk_manager().reserve_pages(fd, num_pages)?;

        let heap = Arc::new(Self {
            name: name.to_string(),
            fd,
            record_size,
            records_per_page: rpp,
            bitmap_size: rpp.div_ceil(8),
            state: Mutex::new(HeapState {
                num_pages,
                free_pages: BTreeSet::new(),
            }),
            bpm,
        });

        let mut free = BTreeSet::new();
        for page_no in 1..num_pages {
            if (heap.page_num_records(page_no)?) < rpp {
                free.insert(page_no);
            }
        }
        heap.state.lock().unwrap().free_pages = free;
        Ok(heap)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn records_per_page(&self) -> usize {
        self.records_per_page
    }

    pub fn num_pages(&self) -> i32 {
        self.state.lock().unwrap().num_pages
    }

    /// Insert a record, returning its stable Rid.
    pub fn insert(&self, buf: &[u8], ctx: &Context) -> Result<Rid> {
        assert_eq!(buf.len(), self.record_size);
        if let Some(txn) = ctx.txn() {
            ctx.lock_mgr.lock_ix_on_table(txn, self.fd)?;
        }

        let mut state = self.state.lock().unwrap();
        let (page_no, handle) = match state.free_pages.iter().next().copied() {
            Some(page_no) => (page_no, self.fetch(page_no)?),
            None => {
                let handle = self.bpm.new_page(self.fd)?;
                let page_no = handle.id().page_no;
                assert_eq!(page_no, state.num_pages);
                handle.page().with_write(|data| {
                    data[4..8].copy_from_slice(&INVALID_PAGE_NO.to_le_bytes());
                });
                state.num_pages += 1;
                state.free_pages.insert(page_no);
                self.persist_num_pages(state.num_pages)?;
                (page_no, handle)
            }
        };

        let (slot, num) = handle.page().with_write(|data| {
            let (hdr, rest) = data.split_at_mut(HEAP_PAGE_HDR_SIZE);
            let bitmap = &mut rest[..self.bitmap_size];
            let slot = (0..self.records_per_page)
                .find(|&i| !bit_get(bitmap, i))
                .expect("page in hint set has no free slot");
            bit_set(bitmap, slot);

            let num = i32::from_le_bytes(hdr[0..4].try_into().unwrap()) + 1;
            hdr[0..4].copy_from_slice(&num.to_le_bytes());

            let off = self.bitmap_size + slot * self.record_size;
            rest[off..off + self.record_size].copy_from_slice(buf);
            (slot, num)
        });

        if num as usize == self.records_per_page {
            state.free_pages.remove(&page_no);
            let hint = state
                .free_pages
                .iter()
                .next()
                .copied()
                .unwrap_or(INVALID_PAGE_NO);
            handle.page().with_write(|data| {
                data[4..8].copy_from_slice(&hint.to_le_bytes());
            });
        }
        drop(state);
        handle.mark_dirty();
        let rid = Rid::new(page_no, slot as i32);

        if let Some(txn) = ctx.txn() {
            let lsn = ctx.log_mgr.add_log_record(
                txn.id(),
                txn.prev_lsn(),
                LogRecordBody::Insert {
                    table: self.name.clone(),
                    rid,
                    image: buf.to_vec(),
                },
            )?;
            txn.set_prev_lsn(lsn);
            #[cfg(feature = "page-lsn")]
            handle.page().set_lsn(lsn);
            txn.append_write_record(WriteRecord {
                kind: WriteKind::Insert,
                table: self.name.clone(),
                rid,
                record: buf.to_vec(),
            });
        }
        Ok(rid)
    }

    /// Place a record at an exact Rid. Used by recovery and abort; panics if
    /// the slot is already occupied.
    pub fn insert_at(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        assert_eq!(buf.len(), self.record_size);
        self.ensure_pages(rid.page_no)?;

        let handle = self.fetch(rid.page_no)?;
        let num = handle.page().with_write(|data| {
            let (hdr, rest) = data.split_at_mut(HEAP_PAGE_HDR_SIZE);
            let bitmap = &mut rest[..self.bitmap_size];
            assert!(
                !bit_get(bitmap, rid.slot_no as usize),
                "insert_at into occupied slot {rid:?}"
            );
            bit_set(bitmap, rid.slot_no as usize);

            let num = i32::from_le_bytes(hdr[0..4].try_into().unwrap()) + 1;
            hdr[0..4].copy_from_slice(&num.to_le_bytes());

            let off = self.bitmap_size + rid.slot_no as usize * self.record_size;
            rest[off..off + self.record_size].copy_from_slice(buf);
            num
        });
        if num as usize == self.records_per_page {
            let mut state = self.state.lock().unwrap();
            state.free_pages.remove(&rid.page_no);
        }
        handle.mark_dirty();
        Ok(())
    }

    /// Read a record under a shared record lock.
    pub fn get(&self, rid: Rid, ctx: &Context) -> Result<Vec<u8>> {
        if let Some(txn) = ctx.txn() {
            ctx.lock_mgr.lock_shared_on_record(txn, self.fd, rid)?;
        }
        self.get_internal(rid)
    }

    /// Read a record without lock acquisition (internal read-only paths).
    pub fn get_internal(&self, rid: Rid) -> Result<Vec<u8>> {
        let handle = self.fetch(rid.page_no)?;
        let record = handle.page().with_read(|data| {
            let rest = &data[HEAP_PAGE_HDR_SIZE..];
            let bitmap = &rest[..self.bitmap_size];
            assert!(
                bit_get(bitmap, rid.slot_no as usize),
                "read of empty slot {rid:?}"
            );
            let off = self.bitmap_size + rid.slot_no as usize * self.record_size;
            rest[off..off + self.record_size].to_vec()
        });
        Ok(record)
    }

    /// Whether `rid` names an occupied slot.
    pub fn is_record_stored(&self, rid: Rid) -> Result<bool> {
        if rid.page_no <= 0 || rid.page_no >= self.num_pages() {
            return Ok(false);
        }
        if rid.slot_no < 0 || rid.slot_no as usize >= self.records_per_page {
            return Ok(false);
        }
        let handle = self.fetch(rid.page_no)?;
        Ok(handle.page().with_read(|data| {
            bit_get(
                &data[HEAP_PAGE_HDR_SIZE..HEAP_PAGE_HDR_SIZE + self.bitmap_size],
                rid.slot_no as usize,
            )
        }))
    }

    /// Overwrite a record under an exclusive lock, logging before/after
    /// images.
    pub fn update(&self, rid: Rid, buf: &[u8], ctx: &Context) -> Result<()> {
        assert_eq!(buf.len(), self.record_size);
        if let Some(txn) = ctx.txn() {
            ctx.lock_mgr.lock_exclusive_on_record(txn, self.fd, rid)?;
        }
        let before = self.get_internal(rid)?;

        let handle = self.fetch(rid.page_no)?;
        if let Some(txn) = ctx.txn() {
            let lsn = ctx.log_mgr.add_log_record(
                txn.id(),
                txn.prev_lsn(),
                LogRecordBody::Update {
                    table: self.name.clone(),
                    rid,
                    before: before.clone(),
                    after: buf.to_vec(),
                },
            )?;
            txn.set_prev_lsn(lsn);
            #[cfg(feature = "page-lsn")]
            handle.page().set_lsn(lsn);
            txn.append_write_record(WriteRecord {
                kind: WriteKind::Update,
                table: self.name.clone(),
                rid,
                record: before,
            });
        }
        self.overwrite(&handle, rid, buf);
        Ok(())
    }

    /// Remove a record under an exclusive lock, logging its pre-image.
    pub fn delete(&self, rid: Rid, ctx: &Context) -> Result<()> {
        if let Some(txn) = ctx.txn() {
            ctx.lock_mgr.lock_exclusive_on_record(txn, self.fd, rid)?;
        }
        let before = self.get_internal(rid)?;

        if let Some(txn) = ctx.txn() {
            let lsn = ctx.log_mgr.add_log_record(
                txn.id(),
                txn.prev_lsn(),
                LogRecordBody::Delete {
                    table: self.name.clone(),
                    rid,
                    image: before.clone(),
                },
            )?;
            txn.set_prev_lsn(lsn);
            #[cfg(feature = "page-lsn")]
            self.set_page_lsn(rid.page_no, lsn)?;
            txn.append_write_record(WriteRecord {
                kind: WriteKind::Delete,
                table: self.name.clone(),
                rid,
                record: before,
            });
        }
        self.delete_raw(rid)
    }

    /// Clear a slot without locks or logging (recovery/abort path).
    pub fn delete_raw(&self, rid: Rid) -> Result<()> {
        let handle = self.fetch(rid.page_no)?;
        handle.page().with_write(|data| {
            let (hdr, rest) = data.split_at_mut(HEAP_PAGE_HDR_SIZE);
            let bitmap = &mut rest[..self.bitmap_size];
            assert!(
                bit_get(bitmap, rid.slot_no as usize),
                "delete of empty slot {rid:?}"
            );
            bit_clear(bitmap, rid.slot_no as usize);
            let num = i32::from_le_bytes(hdr[0..4].try_into().unwrap()) - 1;
            hdr[0..4].copy_from_slice(&num.to_le_bytes());
        });
        handle.mark_dirty();
        self.state.lock().unwrap().free_pages.insert(rid.page_no);
        Ok(())
    }

    /// Overwrite a slot without locks or logging (recovery/abort path).
    pub fn update_raw(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        let handle = self.fetch(rid.page_no)?;
        self.overwrite(&handle, rid, buf);
        Ok(())
    }

    /// Stamp a data page's LSN (recovery redo bookkeeping).
    pub fn set_page_lsn(&self, page_no: i32, lsn: Lsn) -> Result<()> {
        let handle = self.fetch(page_no)?;
        handle.page().set_lsn(lsn);
        Ok(())
    }

    pub fn page_lsn(&self, page_no: i32) -> Result<Lsn> {
        let handle = self.fetch(page_no)?;
        Ok(handle.page().lsn())
    }

    /// Extend the file so that `page_no` exists (recovery redo against pages
    /// never flushed before the crash).
    pub fn ensure_pages(&self, page_no: i32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        while state.num_pages <= page_no {
            let handle = self.bpm.new_page(self.fd)?;
            assert_eq!(handle.id().page_no, state.num_pages);
            handle.page().with_write(|data| {
                data[4..8].copy_from_slice(&INVALID_PAGE_NO.to_le_bytes());
            });
            handle.mark_dirty();
            let num_pages = state.num_pages;
            state.free_pages.insert(num_pages);
            state.num_pages += 1;
        }
        self.persist_num_pages(state.num_pages)
    }

    /// Open a restartable scan over every occupied slot. Takes a shared
    /// table lock when run under a transaction.
    pub fn scan(self: &Arc<Self>, ctx: &Context) -> Result<HeapScan> {
        if let Some(txn) = ctx.txn() {
            ctx.lock_mgr.lock_shared_on_table(txn, self.fd)?;
        }
        let mut scan = HeapScan {
            heap: Arc::clone(self),
            rid: Rid::INVALID,
            num_pages: self.num_pages(),
        };
        scan.begin()?;
        Ok(scan)
    }

    /// Total number of live records (page header sum).
    pub fn num_records(&self) -> Result<usize> {
        let num_pages = self.num_pages();
        let mut total = 0usize;
        for page_no in 1..num_pages {
            total += self.page_num_records(page_no)?;
        }
        Ok(total)
    }

    fn page_num_records(&self, page_no: i32) -> Result<usize> {
        let handle = self.fetch(page_no)?;
        Ok(handle
            .page()
            .with_read(|data| i32::from_le_bytes(data[0..4].try_into().unwrap()))
            as usize)
    }

    fn fetch(&self, page_no: i32) -> Result<PageHandle> {
        self.bpm.fetch_page(PageId::new(self.fd, page_no))
    }

    fn overwrite(&self, handle: &PageHandle, rid: Rid, buf: &[u8]) {
        handle.page().with_write(|data| {
            let rest = &mut data[HEAP_PAGE_HDR_SIZE..];
            debug_assert!(bit_get(&rest[..self.bitmap_size], rid.slot_no as usize));
            let off = self.bitmap_size + rid.slot_no as usize * self.record_size;
            rest[off..off + self.record_size].copy_from_slice(buf);
        });
        handle.mark_dirty();
    }

    fn persist_num_pages(&self, num_pages: i32) -> Result<()> {
        let hdr = self.fetch(0)?;
        hdr.page().with_write(|data| {
            data[HDR_NUM_PAGES..HDR_NUM_PAGES + 4].copy_from_slice(&num_pages.to_le_bytes());
        });
        hdr.mark_dirty();
        Ok(())
    }
}

/// Restartable heap scan: pages in order, then set bits within each page.
pub struct HeapScan {
    heap: Arc<HeapFile>,
    rid: Rid,
    num_pages: i32,
}

impl HeapScan {
    /// Position at the first occupied slot.
    pub fn begin(&mut self) -> Result<()> {
        self.rid = Rid::new(1, -1);
        self.advance()
    }

    pub fn is_end(&self) -> bool {
        self.rid.page_no == INVALID_PAGE_NO
    }

    pub fn rid(&self) -> Rid {
        self.rid
    }

    /// Advance to the next occupied slot.
    pub fn next(&mut self) -> Result<()> {
        debug_assert!(!self.is_end());
        self.advance()
    }

    fn advance(&mut self) -> Result<()> {
        let rpp = self.heap.records_per_page as i32;
        let mut page_no = self.rid.page_no;
        let mut slot = self.rid.slot_no + 1;
        while page_no < self.num_pages {
            if slot >= rpp {
                page_no += 1;
                slot = 0;
                continue;
            }
            let found = {
                let handle = self.heap.fetch(page_no)?;
                handle.page().with_read(|data| {
                    let bitmap = &data[HEAP_PAGE_HDR_SIZE..HEAP_PAGE_HDR_SIZE + self.heap.bitmap_size];
                    (slot..rpp).find(|&i| bit_get(bitmap, i as usize))
                })
            };
            match found {
                Some(s) => {
                    self.rid = Rid::new(page_no, s);
                    return Ok(());
                }
                None => {
                    page_no += 1;
                    slot = 0;
                }
            }
        }
        self.rid = Rid::INVALID;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use crate::storage::wal::LogManager;
    use crate::transaction::lock_manager::LockManager;
    use tempfile::TempDir;

    fn setup(record_size: usize) -> (TempDir, Arc<HeapFile>, Context) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(64, Arc::clone(&disk), Arc::clone(&log)));
        disk.create_file("t.tbl").unwrap();
        let fd = disk.open_file("t.tbl").unwrap();
        let heap = HeapFile::create("t", fd, record_size, bpm).unwrap();
        let ctx = Context::new(Arc::new(LockManager::new()), log, None);
        (dir, heap, ctx)
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let (_dir, heap, ctx) = setup(8);
        let rid = heap.insert(b"abcdefgh", &ctx).unwrap();
        assert_eq!(rid, Rid::new(1, 0));
        assert_eq!(heap.get(rid, &ctx).unwrap(), b"abcdefgh");
        assert_eq!(heap.num_records().unwrap(), 1);
    }

    #[test]
    fn test_delete_frees_slot_for_reuse() {
        let (_dir, heap, ctx) = setup(8);
        let r1 = heap.insert(b"11111111", &ctx).unwrap();
        let _r2 = heap.insert(b"22222222", &ctx).unwrap();
        heap.delete(r1, &ctx).unwrap();
        assert_eq!(heap.num_records().unwrap(), 1);

        // First zero bit is slot 0 again.
        let r3 = heap.insert(b"33333333", &ctx).unwrap();
        assert_eq!(r3, r1);
        assert_eq!(heap.get(r3, &ctx).unwrap(), b"33333333");
    }

    #[test]
    fn test_update_overwrites() {
        let (_dir, heap, ctx) = setup(4);
        let rid = heap.insert(b"aaaa", &ctx).unwrap();
        heap.update(rid, b"bbbb", &ctx).unwrap();
        assert_eq!(heap.get(rid, &ctx).unwrap(), b"bbbb");
    }

    #[test]
    fn test_insert_spills_to_new_page() {
        let (_dir, heap, ctx) = setup(512);
        let rpp = heap.records_per_page();
        for i in 0..rpp + 1 {
            let rid = heap.insert(&[i as u8; 512], &ctx).unwrap();
            if i < rpp {
                assert_eq!(rid.page_no, 1);
            } else {
                assert_eq!(rid, Rid::new(2, 0));
            }
        }
        assert_eq!(heap.num_records().unwrap(), rpp + 1);
    }

    #[test]
    fn test_scan_skips_holes() {
        let (_dir, heap, ctx) = setup(8);
        let mut rids = Vec::new();
        for i in 0..5u8 {
            rids.push(heap.insert(&[i; 8], &ctx).unwrap());
        }
        heap.delete(rids[1], &ctx).unwrap();
        heap.delete(rids[3], &ctx).unwrap();

        let mut scan = heap.scan(&ctx).unwrap();
        let mut seen = Vec::new();
        while !scan.is_end() {
            seen.push(scan.rid());
            scan.next().unwrap();
        }
        assert_eq!(seen, vec![rids[0], rids[2], rids[4]]);
    }

    #[test]
    fn test_scan_empty_after_single_delete() {
        let (_dir, heap, ctx) = setup(8);
        let rid = heap.insert(b"xxxxxxxx", &ctx).unwrap();
        {
            let mut scan = heap.scan(&ctx).unwrap();
            assert!(!scan.is_end());
            scan.next().unwrap();
            assert!(scan.is_end());
        }
        heap.delete(rid, &ctx).unwrap();
        let scan = heap.scan(&ctx).unwrap();
        assert!(scan.is_end());
    }

    #[test]
    #[should_panic(expected = "insert_at into occupied slot")]
    fn test_insert_at_occupied_panics() {
        let (_dir, heap, ctx) = setup(8);
        let rid = heap.insert(b"aaaaaaaa", &ctx).unwrap();
        heap.insert_at(rid, b"bbbbbbbb").unwrap();
    }

    #[test]
    fn test_reopen_rebuilds_hint_set() {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(64, Arc::clone(&disk), Arc::clone(&log)));
        disk.create_file("t.tbl").unwrap();
        let fd = disk.open_file("t.tbl").unwrap();
        let ctx = Context::new(Arc::new(LockManager::new()), log, None);

        let rid;
        {
            let heap = HeapFile::create("t", fd, 16, Arc::clone(&bpm)).unwrap();
            rid = heap.insert(&[7u8; 16], &ctx).unwrap();
            bpm.flush_all(fd).unwrap();
        }

        let heap = HeapFile::open("t", fd, bpm).unwrap();
        assert_eq!(heap.record_size(), 16);
        assert_eq!(heap.get(rid, &ctx).unwrap(), vec![7u8; 16]);
        // The page still has room, so it is a valid insert target.
        let rid2 = heap.insert(&[8u8; 16], &ctx).unwrap();
        assert_eq!(rid2.page_no, 1);
    }
}
