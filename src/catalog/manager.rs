//! Schema manager
//!
//! Owns the database metadata (`db.meta`), the open heap files and index
//! trees, and every DDL operation. DDL runs writer-exclusive over the
//! catalog lock; DML paths only read it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::info;

use crate::catalog::schema::{
    index_file_name, table_file_name, ColMeta, DbMeta, IndexMeta, TabMeta,
};
use crate::catalog::types::{ColType, Value};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::storage::btree::BPlusTree;
use crate::storage::buffer_pool::BufferPoolManager;
use crate::storage::disk::DiskManager;
use crate::storage::heap::HeapFile;

/// Name of the metadata file inside the database directory
pub const META_FILE_NAME: &str = "db.meta";

pub struct SchemaManager {
    disk: Arc<DiskManager>,
    bpm: Arc<BufferPoolManager>,
    db: RwLock<DbMeta>,
    /// Open heap files by table name
    fhs: RwLock<HashMap<String, Arc<HeapFile>>>,
    /// Open index trees by index file name
    ihs: RwLock<HashMap<String, Arc<BPlusTree>>>,
}

impl SchemaManager {
    /// Open the database in the disk manager's directory, creating empty
    /// metadata on first use and opening every registered table and index.
    pub fn open(disk: Arc<DiskManager>, bpm: Arc<BufferPoolManager>) -> Result<Arc<Self>> {
        let meta_path = disk.dir().join(META_FILE_NAME);
        let db = if meta_path.exists() {
            DbMeta::from_text(&std::fs::read_to_string(&meta_path)?)?
        } else {
            let name = disk
                .dir()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "db".to_string());
            DbMeta {
                name,
                tabs: Default::default(),
            }
        };

        let sm = Arc::new(Self {
            disk,
            bpm,
            db: RwLock::new(db),
            fhs: RwLock::new(HashMap::new()),
            ihs: RwLock::new(HashMap::new()),
        });

        let tabs: Vec<TabMeta> = sm.db.read().unwrap().tabs.values().cloned().collect();
        for tab in tabs {
            let fd = sm.disk.open_file(&table_file_name(&tab.name))?;
            let heap = HeapFile::open(&tab.name, fd, Arc::clone(&sm.bpm))?;
            sm.fhs.write().unwrap().insert(tab.name.clone(), heap);
            for index in &tab.indexes {
                let file = index.file_name();
                let ifd = sm.disk.open_file(&file)?;
                let tree = BPlusTree::open(ifd, Arc::clone(&sm.bpm))?;
                sm.ihs.write().unwrap().insert(file, tree);
            }
        }
        Ok(sm)
    }

    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// Persist `db.meta`.
    pub fn flush_meta(&self) -> Result<()> {
        let text = self.db.read().unwrap().to_text();
        std::fs::write(self.disk.dir().join(META_FILE_NAME), text)?;
        Ok(())
    }

    /// Flush every table, index and the metadata; called at shutdown.
    pub fn close(&self) -> Result<()> {
        for heap in self.fhs.read().unwrap().values() {
            self.bpm.flush_all(heap.fd())?;
        }
        for tree in self.ihs.read().unwrap().values() {
            tree.flush_hdr()?;
            self.bpm.flush_all(tree.fd())?;
        }
        self.flush_meta()
    }

    // ===== metadata access =====

    pub fn is_table(&self, tab_name: &str) -> bool {
        self.db.read().unwrap().is_table(tab_name)
    }

    pub fn get_table(&self, tab_name: &str) -> Result<TabMeta> {
        Ok(self.db.read().unwrap().get_table(tab_name)?.clone())
    }

    pub fn tables(&self) -> Vec<String> {
        self.db.read().unwrap().tabs.keys().cloned().collect()
    }

    pub fn get_heap(&self, tab_name: &str) -> Result<Arc<HeapFile>> {
        self.fhs
            .read()
            .unwrap()
            .get(tab_name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(tab_name.to_string()))
    }

    pub fn get_index(&self, tab_name: &str, col_names: &[String]) -> Result<Arc<BPlusTree>> {
        let file = index_file_name(tab_name, col_names);
        self.ihs
            .read()
            .unwrap()
            .get(&file)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(tab_name.to_string(), col_names.join(",")))
    }

    /// Every index of a table with its open tree.
    pub fn get_table_indexes(&self, tab_name: &str) -> Result<Vec<(IndexMeta, Arc<BPlusTree>)>> {
        let tab = self.get_table(tab_name)?;
        let ihs = self.ihs.read().unwrap();
        tab.indexes
            .iter()
            .map(|ix| {
                let tree = ihs.get(&ix.file_name()).cloned().ok_or_else(|| {
                    Error::Internal(format!("index {} not open", ix.file_name()))
                })?;
                Ok((ix.clone(), tree))
            })
            .collect()
    }

    // ===== DDL =====

    /// Create a table from `(name, type, len)` column definitions. STRING
    /// lengths come from the definition; other types have fixed widths.
    pub fn create_table(
        &self,
        tab_name: &str,
        col_defs: &[(String, ColType, usize)],
    ) -> Result<()> {
        let mut db = self.db.write().unwrap();
        if db.is_table(tab_name) {
            return Err(Error::TableExists(tab_name.to_string()));
        }

        let mut cols = Vec::with_capacity(col_defs.len());
        let mut offset = 0;
        for (name, ty, len) in col_defs {
            let len = ty.fixed_len().unwrap_or(*len);
            cols.push(ColMeta {
                tab_name: tab_name.to_string(),
                name: name.clone(),
                ty: *ty,
                len,
                offset,
                index: false,
            });
            offset += len;
        }

        let file = table_file_name(tab_name);
        self.disk.create_file(&file)?;
        let fd = self.disk.open_file(&file)?;
        let heap = HeapFile::create(tab_name, fd, offset, Arc::clone(&self.bpm))?;
        self.fhs
            .write()
            .unwrap()
            .insert(tab_name.to_string(), heap);

        db.tabs.insert(
            tab_name.to_string(),
            TabMeta {
                name: tab_name.to_string(),
                cols,
                indexes: Vec::new(),
            },
        );
        drop(db);
        info!("created table {tab_name}");
        self.flush_meta()
    }

    /// Drop a table, its file and all of its indexes. Requires every page of
    /// the table to be unpinned.
    pub fn drop_table(&self, tab_name: &str) -> Result<()> {
        let mut db = self.db.write().unwrap();
        let tab = db.get_table(tab_name)?.clone();

        for index in &tab.indexes {
            self.drop_index_files(index)?;
        }

        let heap = self
            .fhs
            .write()
            .unwrap()
            .remove(tab_name)
            .ok_or_else(|| Error::TableNotFound(tab_name.to_string()))?;
        self.bpm.evict_file(heap.fd())?;
        self.disk.close_file(heap.fd())?;
        self.disk.destroy_file(&table_file_name(tab_name))?;

        db.tabs.remove(tab_name);
        drop(db);
        info!("dropped table {tab_name}");
        self.flush_meta()
    }

    /// Create an index over `col_names`, building it from the existing heap
    /// contents.
    pub fn create_index(&self, tab_name: &str, col_names: &[String], ctx: &Context) -> Result<()> {
        let mut db = self.db.write().unwrap();
        let tab = db.get_table_mut(tab_name)?;
        if tab.is_index(col_names) {
            return Err(Error::IndexExists(tab_name.to_string(), col_names.join(",")));
        }
        let mut ix_cols = Vec::with_capacity(col_names.len());
        for name in col_names {
            ix_cols.push(tab.get_col(name)?.clone());
        }
        let index = IndexMeta::new(tab_name, ix_cols);

        let tree = self.create_index_tree(&index)?;
        // Populate from the heap.
        let heap = self.get_heap(tab_name)?;
        let mut scan = heap.scan(ctx)?;
        while !scan.is_end() {
            let rid = scan.rid();
            let record = heap.get_internal(rid)?;
            tree.insert(&index.key_from_record(&record), rid, None)?;
            scan.next()?;
        }

        for col in &mut tab.cols {
            if col_names.contains(&col.name) {
                col.index = true;
            }
        }
        tab.indexes.push(index);
        drop(db);
        info!("created index on {tab_name}({})", col_names.join(","));
        self.flush_meta()
    }

    /// Drop an index and its file.
    pub fn drop_index(&self, tab_name: &str, col_names: &[String]) -> Result<()> {
        let mut db = self.db.write().unwrap();
        let tab = db.get_table_mut(tab_name)?;
        let pos = tab
            .indexes
            .iter()
            .position(|ix| ix.col_names() == col_names)
            .ok_or_else(|| Error::IndexNotFound(tab_name.to_string(), col_names.join(",")))?;
        let index = tab.indexes.remove(pos);
        self.drop_index_files(&index)?;

        for col in &mut tab.cols {
            if col_names.contains(&col.name) {
                let still_indexed = tab
                    .indexes
                    .iter()
                    .any(|ix| ix.cols.iter().any(|c| c.name == col.name));
                col.index = still_indexed;
            }
        }
        drop(db);
        info!("dropped index on {tab_name}({})", col_names.join(","));
        self.flush_meta()
    }

    /// Rebuild every index of every table by scanning the heaps; used after
    /// recovery, where index files may be structurally stale.
    pub fn rebuild_indexes(&self, ctx: &Context) -> Result<()> {
        let tabs: Vec<TabMeta> = self.db.read().unwrap().tabs.values().cloned().collect();
        for tab in tabs {
            for index in &tab.indexes {
                self.drop_index_files(index)?;
                let tree = self.create_index_tree(index)?;
                let heap = self.get_heap(&tab.name)?;
                let mut scan = heap.scan(ctx)?;
                while !scan.is_end() {
                    let rid = scan.rid();
                    let record = heap.get_internal(rid)?;
                    tree.insert(&index.key_from_record(&record), rid, None)?;
                    scan.next()?;
                }
                info!("rebuilt index {}", index.file_name());
            }
        }
        Ok(())
    }

    /// Bulk-load a headerless CSV file into a table through the normal
    /// insert path (indexes maintained, uniqueness enforced).
    pub fn load_csv(&self, tab_name: &str, path: &std::path::Path, ctx: &Context) -> Result<usize> {
        let tab = self.get_table(tab_name)?;
        let heap = self.get_heap(tab_name)?;
        let indexes = self.get_table_indexes(tab_name)?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| Error::Internal(format!("csv open failed: {e}")))?;

        let mut count = 0usize;
        for row in reader.records() {
            let row = row.map_err(|e| Error::Internal(format!("csv parse failed: {e}")))?;
            if row.len() != tab.cols.len() {
                return Err(Error::InvalidValueCount {
                    expected: tab.cols.len(),
                    given: row.len(),
                });
            }
            let mut record = vec![0u8; tab.record_size()];
            for (col, field) in tab.cols.iter().zip(row.iter()) {
                let value = parse_csv_field(col.ty, field)?;
                let bytes = value.to_bytes(col.len)?;
                record[col.offset..col.offset + col.len].copy_from_slice(&bytes);
            }

            for (meta, tree) in &indexes {
                if tree.contains(&meta.key_from_record(&record), ctx.txn.as_ref())? {
                    return Err(Error::IndexInsertDuplicated);
                }
            }
            let rid = heap.insert(&record, ctx)?;
            for (meta, tree) in &indexes {
                tree.insert(&meta.key_from_record(&record), rid, ctx.txn.as_ref())?;
            }
            count += 1;
        }
        info!("loaded {count} rows into {tab_name}");
        Ok(count)
    }

    fn create_index_tree(&self, index: &IndexMeta) -> Result<Arc<BPlusTree>> {
        let file = index.file_name();
        self.disk.create_file(&file)?;
        let fd = self.disk.open_file(&file)?;
        let tree = BPlusTree::create(
            fd,
            index.cols.iter().map(|c| c.ty).collect(),
            index.cols.iter().map(|c| c.len).collect(),
            Arc::clone(&self.bpm),
        )?;
        self.ihs.write().unwrap().insert(file, Arc::clone(&tree));
        Ok(tree)
    }

    fn drop_index_files(&self, index: &IndexMeta) -> Result<()> {
        let file = index.file_name();
        if let Some(tree) = self.ihs.write().unwrap().remove(&file) {
            self.bpm.evict_file(tree.fd())?;
            self.disk.close_file(tree.fd())?;
        }
        if self.disk.file_exists(&file) {
            self.disk.destroy_file(&file)?;
        }
        Ok(())
    }
}

/// Parse one CSV field according to the column type.
fn parse_csv_field(ty: ColType, field: &str) -> Result<Value> {
    let bad = || Error::InvalidValue(field.to_string());
    Ok(match ty {
        ColType::Int => Value::Int(field.trim().parse().map_err(|_| bad())?),
        ColType::Bigint => Value::Bigint(field.trim().parse().map_err(|_| bad())?),
        ColType::Float => Value::Float(field.trim().parse().map_err(|_| bad())?),
        ColType::String => Value::Str(field.to_string()),
        ColType::Datetime => Value::Str(field.to_string()).coerce_to(ColType::Datetime)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::wal::LogManager;
    use crate::storage::BUFFER_POOL_SIZE;
    use crate::transaction::lock_manager::LockManager;
    use std::io::Write;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<SchemaManager>, Context) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = Arc::new(LogManager::new(Arc::clone(&disk)));
        let bpm = Arc::new(BufferPoolManager::new(
            BUFFER_POOL_SIZE,
            Arc::clone(&disk),
            Arc::clone(&log),
        ));
        let sm = SchemaManager::open(disk, bpm).unwrap();
        let ctx = Context::new(Arc::new(LockManager::new()), log, None);
        (dir, sm, ctx)
    }

    fn sample_cols() -> Vec<(String, ColType, usize)> {
        vec![
            ("a".to_string(), ColType::Int, 0),
            ("b".to_string(), ColType::String, 4),
        ]
    }

    #[test]
    fn test_create_and_drop_table() {
        let (_dir, sm, _ctx) = setup();
        sm.create_table("t", &sample_cols()).unwrap();
        assert!(sm.is_table("t"));
        assert!(matches!(
            sm.create_table("t", &sample_cols()),
            Err(Error::TableExists(_))
        ));

        let tab = sm.get_table("t").unwrap();
        assert_eq!(tab.record_size(), 8);
        assert_eq!(tab.cols[1].offset, 4);

        sm.drop_table("t").unwrap();
        assert!(!sm.is_table("t"));
        assert!(matches!(sm.get_table("t"), Err(Error::TableNotFound(_))));
    }

    #[test]
    fn test_create_index_builds_from_heap() {
        let (_dir, sm, ctx) = setup();
        sm.create_table("t", &sample_cols()).unwrap();
        let heap = sm.get_heap("t").unwrap();

        let mut record = vec![0u8; 8];
        for i in 0..10i32 {
            record[..4].copy_from_slice(&i.to_le_bytes());
            heap.insert(&record, &ctx).unwrap();
        }

        sm.create_index("t", &["a".to_string()], &ctx).unwrap();
        let tree = sm.get_index("t", &["a".to_string()]).unwrap();
        for i in 0..10i32 {
            assert!(tree.contains(&i.to_le_bytes(), None).unwrap());
        }

        let tab = sm.get_table("t").unwrap();
        assert!(tab.cols[0].index);
        assert!(tab.is_index(&["a".to_string()]));
    }

    #[test]
    fn test_meta_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
            let log = Arc::new(LogManager::new(Arc::clone(&disk)));
            let bpm = Arc::new(BufferPoolManager::new(64, Arc::clone(&disk), log.clone()));
            let sm = SchemaManager::open(disk, bpm).unwrap();
            let ctx = Context::new(Arc::new(LockManager::new()), log, None);
            sm.create_table("t", &sample_cols()).unwrap();
            sm.create_index("t", &["a".to_string()], &ctx).unwrap();
            sm.close().unwrap();
        }
        {
            let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
            let log = Arc::new(LogManager::new(Arc::clone(&disk)));
            let bpm = Arc::new(BufferPoolManager::new(64, Arc::clone(&disk), log));
            let sm = SchemaManager::open(disk, bpm).unwrap();
            assert!(sm.is_table("t"));
            assert!(sm.get_index("t", &["a".to_string()]).is_ok());
        }
    }

    #[test]
    fn test_load_csv() {
        let (dir, sm, ctx) = setup();
        sm.create_table("t", &sample_cols()).unwrap();
        sm.create_index("t", &["a".to_string()], &ctx).unwrap();

        let csv_path = dir.path().join("rows.csv");
        let mut f = std::fs::File::create(&csv_path).unwrap();
        writeln!(f, "1,ab").unwrap();
        writeln!(f, "2,cd").unwrap();
        writeln!(f, "3,ef").unwrap();
        drop(f);

        let n = sm.load_csv("t", &csv_path, &ctx).unwrap();
        assert_eq!(n, 3);
        assert_eq!(sm.get_heap("t").unwrap().num_records().unwrap(), 3);

        let tree = sm.get_index("t", &["a".to_string()]).unwrap();
        assert!(tree.contains(&2i32.to_le_bytes(), None).unwrap());

        // Duplicate key in a second load fails.
        let csv2 = dir.path().join("dup.csv");
        std::fs::write(&csv2, "1,zz\n").unwrap();
        assert!(matches!(
            sm.load_csv("t", &csv2, &ctx),
            Err(Error::IndexInsertDuplicated)
        ));
    }
}
