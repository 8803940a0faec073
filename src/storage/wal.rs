//! Write-ahead log
//!
//! Typed log records serialized into an in-memory buffer that is appended to
//! the on-disk log file on flush. Every mutation of a heap record is logged
//! before the dirty page can reach disk (the WAL rule, enforced by the
//! buffer pool against `persist_lsn`).

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::storage::disk::DiskManager;
use crate::storage::{Rid, RID_SIZE};

/// Log sequence number
pub type Lsn = i32;

pub const INVALID_LSN: Lsn = -1;

/// Size of the in-memory log buffer
pub const LOG_BUFFER_SIZE: usize = 32 * 1024;

/// Common header: type, lsn, total_len, txn_id, prev_lsn
pub const LOG_HEADER_SIZE: usize = 20;

/// Payload of a log record
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecordBody {
    Begin,
    Commit,
    Abort,
    Insert {
        table: String,
        rid: Rid,
        image: Vec<u8>,
    },
    Delete {
        table: String,
        rid: Rid,
        image: Vec<u8>,
    },
    Update {
        table: String,
        rid: Rid,
        before: Vec<u8>,
        after: Vec<u8>,
    },
}

impl LogRecordBody {
    fn type_code(&self) -> i32 {
        match self {
            LogRecordBody::Update { .. } => 0,
            LogRecordBody::Insert { .. } => 1,
            LogRecordBody::Delete { .. } => 2,
            LogRecordBody::Begin => 3,
            LogRecordBody::Commit => 4,
            LogRecordBody::Abort => 5,
        }
    }

    /// Whether this record mutates a heap page.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            LogRecordBody::Insert { .. }
                | LogRecordBody::Delete { .. }
                | LogRecordBody::Update { .. }
        )
    }
}

/// One log record with its common header fields
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: i32,
    pub prev_lsn: Lsn,
    pub body: LogRecordBody,
}

impl LogRecord {
    pub fn serialize(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match &self.body {
            LogRecordBody::Begin | LogRecordBody::Commit | LogRecordBody::Abort => {}
            LogRecordBody::Insert { table, rid, image }
            | LogRecordBody::Delete { table, rid, image } => {
                put_bytes(&mut payload, image);
                put_rid(&mut payload, *rid);
                put_bytes(&mut payload, table.as_bytes());
            }
            LogRecordBody::Update {
                table,
                rid,
                before,
                after,
            } => {
                put_bytes(&mut payload, before);
                put_bytes(&mut payload, after);
                put_rid(&mut payload, *rid);
                put_bytes(&mut payload, table.as_bytes());
            }
        }

        let total_len = (LOG_HEADER_SIZE + payload.len()) as u32;
        let mut out = Vec::with_capacity(total_len as usize);
        out.extend_from_slice(&self.body.type_code().to_le_bytes());
        out.extend_from_slice(&self.lsn.to_le_bytes());
        out.extend_from_slice(&total_len.to_le_bytes());
        out.extend_from_slice(&self.txn_id.to_le_bytes());
        out.extend_from_slice(&self.prev_lsn.to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }

    /// Deserialize one record from the front of `buf`; returns the record
    /// and its total length. Truncated or nonsensical input is corruption.
    pub fn deserialize(buf: &[u8]) -> Result<(LogRecord, usize)> {
        let corrupt = || Error::Internal("corrupted log record".to_string());

        if buf.len() < LOG_HEADER_SIZE {
            return Err(corrupt());
        }
        let type_code = get_i32(buf, 0);
        let lsn = get_i32(buf, 4);
        let total_len = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
        let txn_id = get_i32(buf, 12);
        let prev_lsn = get_i32(buf, 16);
        if total_len < LOG_HEADER_SIZE || total_len > buf.len() {
            return Err(corrupt());
        }

        let mut pos = LOG_HEADER_SIZE;
        let payload_end = total_len;
        let body = match type_code {
            3 => LogRecordBody::Begin,
            4 => LogRecordBody::Commit,
            5 => LogRecordBody::Abort,
            1 | 2 => {
                let image = take_bytes(buf, &mut pos, payload_end).ok_or_else(corrupt)?;
                let rid = take_rid(buf, &mut pos, payload_end).ok_or_else(corrupt)?;
                let table = take_string(buf, &mut pos, payload_end).ok_or_else(corrupt)?;
                if type_code == 1 {
                    LogRecordBody::Insert { table, rid, image }
                } else {
                    LogRecordBody::Delete { table, rid, image }
                }
            }
            0 => {
                let before = take_bytes(buf, &mut pos, payload_end).ok_or_else(corrupt)?;
                let after = take_bytes(buf, &mut pos, payload_end).ok_or_else(corrupt)?;
                let rid = take_rid(buf, &mut pos, payload_end).ok_or_else(corrupt)?;
                let table = take_string(buf, &mut pos, payload_end).ok_or_else(corrupt)?;
                LogRecordBody::Update {
                    table,
                    rid,
                    before,
                    after,
                }
            }
            _ => return Err(corrupt()),
        };

        Ok((
            LogRecord {
                lsn,
                txn_id,
                prev_lsn,
                body,
            },
            total_len,
        ))
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn put_rid(out: &mut Vec<u8>, rid: Rid) {
    out.extend_from_slice(&rid.page_no.to_le_bytes());
    out.extend_from_slice(&rid.slot_no.to_le_bytes());
}

fn get_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn take_bytes(buf: &[u8], pos: &mut usize, end: usize) -> Option<Vec<u8>> {
    if *pos + 4 > end {
        return None;
    }
    let len = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
    *pos += 4;
    if *pos + len > end {
        return None;
    }
    let bytes = buf[*pos..*pos + len].to_vec();
    *pos += len;
    Some(bytes)
}

fn take_string(buf: &[u8], pos: &mut usize, end: usize) -> Option<String> {
    take_bytes(buf, pos, end).map(|b| String::from_utf8_lossy(&b).into_owned())
}

fn take_rid(buf: &[u8], pos: &mut usize, end: usize) -> Option<Rid> {
    if *pos + RID_SIZE > end {
        return None;
    }
    let rid = Rid::new(get_i32(buf, *pos), get_i32(buf, *pos + 4));
    *pos += RID_SIZE;
    Some(rid)
}

struct LogBuf {
    buf: Vec<u8>,
    /// LSN of the last record currently sitting in the buffer
    last_lsn: Lsn,
    next_lsn: Lsn,
}

/// Append-only log manager
pub struct LogManager {
    disk: Arc<DiskManager>,
    inner: Mutex<LogBuf>,
    persist_lsn: AtomicI32,
}

impl LogManager {
    pub fn new(disk: Arc<DiskManager>) -> Self {
        Self {
            disk,
            inner: Mutex::new(LogBuf {
                buf: Vec::with_capacity(LOG_BUFFER_SIZE),
                last_lsn: INVALID_LSN,
                next_lsn: 0,
            }),
            persist_lsn: AtomicI32::new(INVALID_LSN),
        }
    }

    /// LSN up to which the log is durable.
    pub fn persist_lsn(&self) -> Lsn {
        self.persist_lsn.load(Ordering::SeqCst)
    }

    /// Next LSN to be assigned.
    pub fn global_lsn(&self) -> Lsn {
        self.inner.lock().unwrap().next_lsn
    }

    /// Recovery restarts the counter after the highest LSN found on disk.
    pub fn reset_lsn(&self, next_lsn: Lsn) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_lsn = next_lsn;
        self.persist_lsn.store(next_lsn - 1, Ordering::SeqCst);
    }

    /// Assign an LSN to the record, serialize it into the buffer (flushing
    /// first if it would overflow) and return the LSN.
    pub fn add_log_record(&self, txn_id: i32, prev_lsn: Lsn, body: LogRecordBody) -> Result<Lsn> {
        let mut inner = self.inner.lock().unwrap();
        let lsn = inner.next_lsn;
        inner.next_lsn += 1;

        let record = LogRecord {
            lsn,
            txn_id,
            prev_lsn,
            body,
        };
        let bytes = record.serialize();
        if !inner.buf.is_empty() && inner.buf.len() + bytes.len() > LOG_BUFFER_SIZE {
            self.flush_locked(&mut inner)?;
        }
        inner.buf.extend_from_slice(&bytes);
        inner.last_lsn = lsn;
        if inner.buf.len() > LOG_BUFFER_SIZE {
            self.flush_locked(&mut inner)?;
        }
        Ok(lsn)
    }

    /// Append the buffer to the log file and advance `persist_lsn`.
    pub fn flush_log_to_disk(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut LogBuf) -> Result<()> {
        if inner.buf.is_empty() {
            return Ok(());
        }
        self.disk.append_log(&inner.buf)?;
        self.persist_lsn.store(inner.last_lsn, Ordering::SeqCst);
        inner.buf.clear();
        Ok(())
    }
}

impl Drop for LogManager {
    /// Shutdown flush: whatever is still buffered goes to disk.
    fn drop(&mut self) {
        self.flush_log_to_disk().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_serialization_roundtrip() {
        let record = LogRecord {
            lsn: 7,
            txn_id: 3,
            prev_lsn: 5,
            body: LogRecordBody::Update {
                table: "t".to_string(),
                rid: Rid::new(2, 9),
                before: vec![1, 2, 3],
                after: vec![4, 5, 6],
            },
        };
        let bytes = record.serialize();
        let (parsed, len) = LogRecord::deserialize(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_header_only_records() {
        for body in [
            LogRecordBody::Begin,
            LogRecordBody::Commit,
            LogRecordBody::Abort,
        ] {
            let record = LogRecord {
                lsn: 0,
                txn_id: 1,
                prev_lsn: INVALID_LSN,
                body,
            };
            let bytes = record.serialize();
            assert_eq!(bytes.len(), LOG_HEADER_SIZE);
            let (parsed, _) = LogRecord::deserialize(&bytes).unwrap();
            assert_eq!(parsed, record);
        }
    }

    #[test]
    fn test_truncated_record_is_corruption() {
        let record = LogRecord {
            lsn: 0,
            txn_id: 1,
            prev_lsn: INVALID_LSN,
            body: LogRecordBody::Insert {
                table: "t".to_string(),
                rid: Rid::new(0, 0),
                image: vec![9; 32],
            },
        };
        let bytes = record.serialize();
        assert!(LogRecord::deserialize(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn test_flush_advances_persist_lsn() {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path()).unwrap());
        let log = LogManager::new(Arc::clone(&disk));

        assert_eq!(log.persist_lsn(), INVALID_LSN);
        log.add_log_record(1, INVALID_LSN, LogRecordBody::Begin)
            .unwrap();
        let lsn = log.add_log_record(1, 0, LogRecordBody::Commit).unwrap();
        assert_eq!(log.persist_lsn(), INVALID_LSN);

        log.flush_log_to_disk().unwrap();
        assert_eq!(log.persist_lsn(), lsn);
        assert_eq!(disk.log_size().unwrap(), 2 * LOG_HEADER_SIZE as u64);
    }
}
