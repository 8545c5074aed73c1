//! In-memory vector and payload store.

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::storage::{PayloadStore, VectorStore};

#[derive(Debug, Clone)]
struct VectorRecord {
    id: String,
    data: Vec<f64>,
    payload_offset: u64,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Records {
    vectors: Vec<VectorRecord>,
    payloads: Vec<Payload>,
}

/// Process-local store. Offsets are positions in append order.
///
/// # Example
///
/// ```
/// use arcturus_core::storage::{MemoryStore, PayloadStore, VectorStore};
/// use arcturus_core::Payload;
///
/// let store = MemoryStore::new();
/// let payload_offset = store.write_payload(&Payload::new().with_field("k", "v")).unwrap();
/// let offset = store.persist("a", &[1.0, 2.0], payload_offset).unwrap();
///
/// assert_eq!(store.read_payload(payload_offset).unwrap().get_str("k"), Some("v"));
/// assert!(!store.is_deleted(offset));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vector records, deleted ones included.
    pub fn vector_records(&self) -> usize {
        self.records.read().vectors.len()
    }

    /// Returns true if the vector record at `offset` is flagged deleted.
    /// Unknown offsets report false.
    pub fn is_deleted(&self, offset: u64) -> bool {
        self.records
            .read()
            .vectors
            .get(offset as usize)
            .map(|r| r.deleted)
            .unwrap_or(false)
    }

    /// Returns the id, data and payload offset stored at `offset`.
    pub fn vector_at(&self, offset: u64) -> Option<(String, Vec<f64>, u64)> {
        self.records
            .read()
            .vectors
            .get(offset as usize)
            .map(|r| (r.id.clone(), r.data.clone(), r.payload_offset))
    }
}

impl VectorStore for MemoryStore {
    fn persist(&self, id: &str, data: &[f64], payload_offset: u64) -> Result<u64> {
        let mut records = self.records.write();
        let offset = records.vectors.len() as u64;
        records.vectors.push(VectorRecord {
            id: id.to_string(),
            data: data.to_vec(),
            payload_offset,
            deleted: false,
        });
        Ok(offset)
    }

    fn mark_deleted(&self, offset: u64) -> Result<()> {
        let mut records = self.records.write();
        match records.vectors.get_mut(offset as usize) {
            Some(record) => {
                record.deleted = true;
                Ok(())
            }
            None => Err(Error::storage(
                "mark deleted failed",
                format!("no vector record at offset {}", offset),
            )),
        }
    }
}

impl PayloadStore for MemoryStore {
    fn write_payload(&self, payload: &Payload) -> Result<u64> {
        let mut records = self.records.write();
        let offset = records.payloads.len() as u64;
        records.payloads.push(payload.clone());
        Ok(offset)
    }

    fn read_payload(&self, offset: u64) -> Result<Payload> {
        self.records
            .read()
            .payloads
            .get(offset as usize)
            .cloned()
            .ok_or_else(|| {
                Error::storage(
                    "read payload failed",
                    format!("no payload at offset {}", offset),
                )
            })
    }
}
