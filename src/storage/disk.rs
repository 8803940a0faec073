//! Disk manager for FerroDB
//!
//! Synchronous block I/O over the files of one database directory, page
//! allocation per file, and the append-only log file. Files are addressed by
//! small integer descriptors handed out by `open_file`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::storage::PAGE_SIZE;

/// Name of the append-only log file inside the database directory
pub const LOG_FILE_NAME: &str = "log.txt";

struct FileEntry {
    file: File,
    name: String,
    /// Monotonic allocation counter; `allocate_page` hands out `next_page_no`
    /// unless a deallocated page is available for reuse.
    next_page_no: i32,
    free_pages: Vec<i32>,
}

#[derive(Default)]
struct DiskInner {
    next_fd: i32,
    files: HashMap<i32, FileEntry>,
    fd_by_name: HashMap<String, i32>,
}

/// Disk manager scoped to one database directory
pub struct DiskManager {
    dir: PathBuf,
    inner: Mutex<DiskInner>,
    log_file: Mutex<File>,
}

impl DiskManager {
    /// Open a disk manager over `dir`, creating the directory and the log
    /// file if they do not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let log_file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(dir.join(LOG_FILE_NAME))?;
        Ok(Self {
            dir,
            inner: Mutex::new(DiskInner::default()),
            log_file: Mutex::new(log_file),
        })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Create an empty file. Fails if it already exists.
    pub fn create_file(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        if path.exists() {
            return Err(Error::FileExists(name.to_string()));
        }
        File::create(path)?;
        Ok(())
    }

    /// Open a file and return its descriptor. Opening an already-open file
    /// returns the existing descriptor.
    pub fn open_file(&self, name: &str) -> Result<i32> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&fd) = inner.fd_by_name.get(name) {
            return Ok(fd);
        }
        let path = self.path(name);
        if !path.exists() {
            return Err(Error::FileNotFound(name.to_string()));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let next_page_no = (file.metadata()?.len() / PAGE_SIZE as u64) as i32;

        let fd = inner.next_fd;
        inner.next_fd += 1;
        inner.files.insert(
            fd,
            FileEntry {
                file,
                name: name.to_string(),
                next_page_no,
                free_pages: Vec::new(),
            },
        );
        inner.fd_by_name.insert(name.to_string(), fd);
        Ok(fd)
    }

    pub fn close_file(&self, fd: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .files
            .remove(&fd)
            .ok_or_else(|| Error::Internal(format!("close of unknown fd {fd}")))?;
        inner.fd_by_name.remove(&entry.name);
        entry.file.sync_all()?;
        Ok(())
    }

    /// Remove a file from disk. The file must not be open.
    pub fn destroy_file(&self, name: &str) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        if inner.fd_by_name.contains_key(name) {
            return Err(Error::Internal(format!(
                "destroy of open file '{name}'"
            )));
        }
        drop(inner);
        let path = self.path(name);
        if !path.exists() {
            return Err(Error::FileNotFound(name.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Allocate a page number in `fd`. Deallocated pages are reused first.
    pub fn allocate_page(&self, fd: i32) -> Result<i32> {
        let mut inner = self.inner.lock().unwrap();
        let entry = entry_mut(&mut inner, fd)?;
        if let Some(page_no) = entry.free_pages.pop() {
            return Ok(page_no);
        }
        let page_no = entry.next_page_no;
        entry.next_page_no += 1;
        Ok(page_no)
    }

    /// Return a page number to the free list for reuse.
    pub fn deallocate_page(&self, fd: i32, page_no: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = entry_mut(&mut inner, fd)?;
        entry.free_pages.push(page_no);
        Ok(())
    }

    /// Number of pages allocated so far in `fd`.
    pub fn num_pages(&self, fd: i32) -> Result<i32> {
        let mut inner = self.inner.lock().unwrap();
        Ok(entry_mut(&mut inner, fd)?.next_page_no)
    }

    /// Raise the allocation counter to at least `n`. Used on reopen when a
    /// file header records more pages than ever reached disk (pages lost in
    /// a crash are re-allocated by recovery).
    pub fn reserve_pages(&self, fd: i32, n: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = entry_mut(&mut inner, fd)?;
        if entry.next_page_no < n {
            entry.next_page_no = n;
        }
        Ok(())
    }

    /// Read one page into `buf`. Pages past the end of the file read as
    /// zeroes (they have been allocated but never written).
    pub fn read_page(&self, fd: i32, page_no: i32, buf: &mut [u8]) -> Result<()> {
        if page_no < 0 {
            return Err(Error::PageNotExist(page_no));
        }
        let mut inner = self.inner.lock().unwrap();
        let entry = entry_mut(&mut inner, fd)?;
        let offset = page_no as u64 * PAGE_SIZE as u64;
        let file_len = entry.file.metadata()?.len();
        buf.fill(0);
        if offset >= file_len {
            return Ok(());
        }
        entry.file.seek(SeekFrom::Start(offset))?;
        let avail = ((file_len - offset) as usize).min(buf.len());
        entry.file.read_exact(&mut buf[..avail])?;
        Ok(())
    }

    /// Write one page from `buf`.
    pub fn write_page(&self, fd: i32, page_no: i32, buf: &[u8]) -> Result<()> {
        if page_no < 0 {
            return Err(Error::PageNotExist(page_no));
        }
        let mut inner = self.inner.lock().unwrap();
        let entry = entry_mut(&mut inner, fd)?;
        entry
            .file
            .seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        entry.file.write_all(buf)?;
        entry.file.flush()?;
        Ok(())
    }

    pub fn file_size(&self, name: &str) -> Result<u64> {
        let path = self.path(name);
        if !path.exists() {
            return Err(Error::FileNotFound(name.to_string()));
        }
        Ok(std::fs::metadata(path)?.len())
    }

    /// Append bytes to the log file and fsync.
    pub fn append_log(&self, buf: &[u8]) -> Result<()> {
        let mut log = self.log_file.lock().unwrap();
        log.write_all(buf)?;
        log.sync_data()?;
        Ok(())
    }

    /// Read from the log file at `offset`; returns the number of bytes read.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut log = self.log_file.lock().unwrap();
        let len = log.metadata()?.len();
        if offset >= len {
            return Ok(0);
        }
        log.seek(SeekFrom::Start(offset))?;
        let avail = ((len - offset) as usize).min(buf.len());
        log.read_exact(&mut buf[..avail])?;
        Ok(avail)
    }

    pub fn log_size(&self) -> Result<u64> {
        Ok(self.log_file.lock().unwrap().metadata()?.len())
    }
}

fn entry_mut<'a>(inner: &'a mut DiskInner, fd: i32) -> Result<&'a mut FileEntry> {
    inner
        .files
        .get_mut(&fd)
        .ok_or_else(|| Error::Internal(format!("unknown fd {fd}")))
}
