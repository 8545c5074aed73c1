//! Storage collaborators for vectors and payloads.
//!
//! The search engine only needs two capabilities from storage:
//! - [`VectorStore`]: durable append of raw vector records, plus flagging a
//!   record as deleted.
//! - [`PayloadStore`]: write a payload and read it back by offset.
//!
//! Two implementations are provided:
//! - [`MemoryStore`] keeps everything in process memory.
//! - [`FileStore`] appends checksummed records to a [`DataFile`].

pub mod data_file;
pub mod memory;

pub use data_file::{DataFile, FileStore, StoredVector};
pub use memory::MemoryStore;

use crate::error::Result;
use crate::payload::Payload;

/// Durable storage of raw vector data.
pub trait VectorStore: Send + Sync {
    /// Appends a vector record and returns its storage offset.
    fn persist(&self, id: &str, data: &[f64], payload_offset: u64) -> Result<u64>;

    /// Flags the record at `offset` as deleted. The bytes stay in place.
    fn mark_deleted(&self, offset: u64) -> Result<()>;

    /// Flushes buffered writes.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Storage of payload metadata addressed by offset.
pub trait PayloadStore: Send + Sync {
    /// Appends a payload record and returns its offset.
    fn write_payload(&self, payload: &Payload) -> Result<u64>;

    /// Reads the payload stored at `offset`.
    fn read_payload(&self, offset: u64) -> Result<Payload>;
}
