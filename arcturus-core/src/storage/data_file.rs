//! Append-only record file for vectors and payloads.
//!
//! Records are addressed by their byte offset in the file.
//!
//! # Format
//!
//! Each record has the format:
//! ```text
//! [kind:u8][flags:u8][len:u32][crc32:u32][body:len]
//! ```
//!
//! Vector bodies are `[id_len:u32][id:utf8][dim:u32][data:f64*dim][payload_offset:u64]`,
//! payload bodies are JSON. The checksum covers the body only, so flipping
//! the deleted flag in place does not invalidate it.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::warn;

use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::storage::{PayloadStore, VectorStore};

const HEADER_LEN: u64 = 1 + 1 + 4 + 4;
const FLAG_DELETED: u8 = 1;

/// Kind tag of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Vector = 1,
    Payload = 2,
}

impl TryFrom<u8> for RecordKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Vector),
            2 => Ok(Self::Payload),
            _ => Err(Error::storage(
                "corrupted record",
                format!("invalid record kind {}", value),
            )),
        }
    }
}

/// A raw record read back from the data file.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub offset: u64,
    pub kind: RecordKind,
    pub deleted: bool,
    pub body: Vec<u8>,
}

impl RawRecord {
    /// Offset of the record following this one.
    pub fn next_offset(&self) -> u64 {
        self.offset + HEADER_LEN + self.body.len() as u64
    }
}

/// Append-only data file.
pub struct DataFile {
    path: PathBuf,
    writer: BufWriter<File>,
    write_pos: u64,
}

impl DataFile {
    /// Opens or creates a data file.
    ///
    /// A torn or corrupted tail left by an interrupted write is truncated, so
    /// new records are appended directly after the last valid one.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::storage("open data file failed", e))?;

        let file_len = file
            .metadata()
            .map_err(|e| Error::storage("metadata failed", e))?
            .len();
        let (_, write_pos) = Self::scan(&path)?;

        if write_pos < file_len {
            warn!(
                path = %path.display(),
                valid = write_pos,
                discarded = file_len - write_pos,
                "truncating unreadable tail"
            );
            file.set_len(write_pos)
                .and_then(|_| file.sync_all())
                .map_err(|e| Error::storage("truncate failed", e))?;
        }

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            write_pos,
        })
    }

    /// Appends a record and returns its offset.
    ///
    /// The write buffer is flushed before returning so that readers opening
    /// the file see the record immediately.
    pub fn append(&mut self, kind: RecordKind, body: &[u8]) -> Result<u64> {
        let offset = self.write_pos;
        let len = u32::try_from(body.len())
            .map_err(|_| Error::storage("append failed", "record body too large"))?;
        let checksum = crc32fast::hash(body);

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        header.push(kind as u8);
        header.push(0);
        header.extend_from_slice(&len.to_le_bytes());
        header.extend_from_slice(&checksum.to_le_bytes());

        self.writer
            .write_all(&header)
            .and_then(|_| self.writer.write_all(body))
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::storage("append failed", e))?;

        self.write_pos += HEADER_LEN + body.len() as u64;
        Ok(offset)
    }

    /// Flags the record at `offset` as deleted.
    pub fn mark_deleted(&self, offset: u64) -> Result<()> {
        if offset + HEADER_LEN > self.write_pos {
            return Err(Error::storage(
                "mark deleted failed",
                format!("offset {} beyond end of file", offset),
            ));
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| Error::storage("open for delete failed", e))?;

        let mut writer = BufWriter::new(file);
        writer
            .seek(SeekFrom::Start(offset + 1))
            .and_then(|_| writer.write_all(&[FLAG_DELETED]))
            .and_then(|_| writer.flush())
            .map_err(|e| Error::storage("write delete flag failed", e))?;

        Ok(())
    }

    /// Reads and verifies the record at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<RawRecord> {
        if offset + HEADER_LEN > self.write_pos {
            return Err(Error::storage(
                "read failed",
                format!("offset {} beyond end of file", offset),
            ));
        }

        let file = File::open(&self.path).map_err(|e| Error::storage("open for read failed", e))?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::storage("seek failed", e))?;
        Self::read_record(&mut reader, offset, self.write_pos)
    }

    /// Reads the record at `offset`; `end` bounds the body length so a
    /// garbage header cannot claim more bytes than the file holds.
    fn read_record<R: Read>(reader: &mut R, offset: u64, end: u64) -> Result<RawRecord> {
        let mut header = [0u8; HEADER_LEN as usize];
        reader
            .read_exact(&mut header)
            .map_err(|e| Error::storage("read header failed", e))?;

        let kind = RecordKind::try_from(header[0])?;
        let deleted = header[1] & FLAG_DELETED != 0;
        let len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
        let expected = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        if offset + HEADER_LEN + len as u64 > end {
            return Err(Error::storage(
                "torn record",
                format!("record at offset {} runs past end of file", offset),
            ));
        }

        let mut body = vec![0u8; len];
        reader
            .read_exact(&mut body)
            .map_err(|e| Error::storage("read body failed", e))?;

        let actual = crc32fast::hash(&body);
        if actual != expected {
            return Err(Error::storage(
                "corrupted record",
                format!(
                    "checksum mismatch at offset {}: expected {:#x}, got {:#x}",
                    offset, expected, actual
                ),
            ));
        }

        Ok(RawRecord {
            offset,
            kind,
            deleted,
            body,
        })
    }

    /// Reads every record in file order.
    pub fn records(&self) -> Result<Vec<RawRecord>> {
        let (records, _) = Self::scan(&self.path)?;
        Ok(records)
    }

    /// Reads records up to the first torn or corrupted one. Returns them with
    /// the offset just past the last valid record.
    fn scan(path: &Path) -> Result<(Vec<RawRecord>, u64)> {
        let file = File::open(path).map_err(|e| Error::storage("open for scan failed", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| Error::storage("metadata failed", e))?
            .len();

        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset = 0u64;

        while offset < file_len {
            match Self::read_record(&mut reader, offset, file_len) {
                Ok(record) => {
                    offset = record.next_offset();
                    records.push(record);
                }
                Err(e) => {
                    warn!(path = %path.display(), offset, error = %e, "stopping scan at unreadable record");
                    break;
                }
            }
        }

        Ok((records, offset))
    }

    /// Flushes pending writes to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::storage("flush failed", e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| Error::storage("sync failed", e))?;
        Ok(())
    }

    /// Returns the current write position.
    pub fn write_position(&self) -> u64 {
        self.write_pos
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A live vector record recovered from a [`FileStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub offset: u64,
    pub id: String,
    pub data: Vec<f64>,
    pub payload_offset: u64,
}

fn encode_vector(id: &str, data: &[f64], payload_offset: u64) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + id.len() + 4 + data.len() * 8 + 8);
    body.extend_from_slice(&(id.len() as u32).to_le_bytes());
    body.extend_from_slice(id.as_bytes());
    body.extend_from_slice(&(data.len() as u32).to_le_bytes());
    for &x in data {
        body.extend_from_slice(&x.to_le_bytes());
    }
    body.extend_from_slice(&payload_offset.to_le_bytes());
    body
}

fn decode_vector(offset: u64, body: &[u8]) -> Result<StoredVector> {
    let truncated = || Error::storage("corrupted vector record", format!("truncated at {}", offset));

    let mut pos = 0usize;
    let mut take = |n: usize| -> Result<&[u8]> {
        let bytes = body.get(pos..pos + n).ok_or_else(truncated)?;
        pos += n;
        Ok(bytes)
    };

    let id_len = u32::from_le_bytes(take(4)?.try_into().map_err(|_| truncated())?) as usize;
    let id = String::from_utf8(take(id_len)?.to_vec())
        .map_err(|e| Error::storage("corrupted vector id", e))?;
    let dim = u32::from_le_bytes(take(4)?.try_into().map_err(|_| truncated())?) as usize;
    let mut data = Vec::with_capacity(dim);
    for _ in 0..dim {
        data.push(f64::from_le_bytes(take(8)?.try_into().map_err(|_| truncated())?));
    }
    let payload_offset = u64::from_le_bytes(take(8)?.try_into().map_err(|_| truncated())?);

    Ok(StoredVector {
        offset,
        id,
        data,
        payload_offset,
    })
}

/// File-backed [`VectorStore`] and [`PayloadStore`] over one [`DataFile`].
///
/// Reads share a read lock and open their own file handle; appends and delete
/// flags take the write lock.
pub struct FileStore {
    file: RwLock<DataFile>,
}

impl FileStore {
    /// Opens or creates the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: RwLock::new(DataFile::open(path)?),
        })
    }

    /// Returns every non-deleted vector record in offset order.
    ///
    /// Records whose body cannot be decoded are logged and skipped.
    pub fn active_vectors(&self) -> Result<Vec<StoredVector>> {
        let file = self.file.read();
        let records = file.records()?;
        Ok(records
            .into_iter()
            .filter(|r| r.kind == RecordKind::Vector && !r.deleted)
            .filter_map(|r| match decode_vector(r.offset, &r.body) {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(path = %file.path().display(), offset = r.offset, error = %e, "skipping undecodable vector record");
                    None
                }
            })
            .collect())
    }

    pub fn path(&self) -> PathBuf {
        self.file.read().path().to_path_buf()
    }
}

impl VectorStore for FileStore {
    fn persist(&self, id: &str, data: &[f64], payload_offset: u64) -> Result<u64> {
        let body = encode_vector(id, data, payload_offset);
        self.file.write().append(RecordKind::Vector, &body)
    }

    fn mark_deleted(&self, offset: u64) -> Result<()> {
        let file = self.file.write();
        let record = file.read_at(offset)?;
        if record.kind != RecordKind::Vector {
            return Err(Error::storage(
                "mark deleted failed",
                format!("record at offset {} is not a vector", offset),
            ));
        }
        file.mark_deleted(offset)
    }

    fn flush(&self) -> Result<()> {
        self.file.write().flush()
    }
}

impl PayloadStore for FileStore {
    fn write_payload(&self, payload: &Payload) -> Result<u64> {
        let body =
            serde_json::to_vec(payload).map_err(|e| Error::storage("payload serialization failed", e))?;
        self.file.write().append(RecordKind::Payload, &body)
    }

    fn read_payload(&self, offset: u64) -> Result<Payload> {
        let record = self.file.read().read_at(offset)?;
        if record.kind != RecordKind::Payload {
            return Err(Error::storage(
                "read payload failed",
                format!("record at offset {} is not a payload", offset),
            ));
        }
        serde_json::from_slice(&record.body)
            .map_err(|e| Error::storage("payload deserialization failed", e))
    }
}
