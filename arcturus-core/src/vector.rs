//! Vector types for Arcturus.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Unique identifier for a vector within a collection.
pub type VectorId = String;

/// A stored vector with its identity and storage locations.
///
/// Vectors are immutable once inserted. The only state change is the terminal
/// deleted marker set when the vector is removed from its collection; tree
/// nodes and secondary index entries share the same `Arc<Vector>`, so they all
/// observe the marker.
#[derive(Debug)]
pub struct Vector {
    id: VectorId,
    data: Vec<f64>,
    storage_offset: u64,
    payload_offset: u64,
    deleted: AtomicBool,
}

impl Vector {
    /// Creates a vector that has been persisted at `storage_offset` with its
    /// payload at `payload_offset`.
    ///
    /// # Example
    ///
    /// ```
    /// use arcturus_core::Vector;
    ///
    /// let v = Vector::new("doc-1", vec![1.0, 2.0, 3.0], 0, 0);
    /// assert_eq!(v.dimension(), 3);
    /// assert!(!v.is_deleted());
    /// ```
    pub fn new(
        id: impl Into<VectorId>,
        data: Vec<f64>,
        storage_offset: u64,
        payload_offset: u64,
    ) -> Self {
        Self {
            id: id.into(),
            data,
            storage_offset,
            payload_offset,
            deleted: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the dimension (length) of the vector.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Returns a slice view of the vector data.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Offset of the raw vector record in the vector store.
    #[inline]
    pub fn storage_offset(&self) -> u64 {
        self.storage_offset
    }

    /// Offset of the payload record in the payload store.
    #[inline]
    pub fn payload_offset(&self) -> u64 {
        self.payload_offset
    }

    /// Returns true once the vector has been deleted from its collection.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Sets the terminal deleted marker.
    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// Computes the L2 norm of the vector.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum::<f64>().sqrt()
    }
}

/// Rejects data holding a NaN or infinite component.
///
/// Such components have no place on either side of a splitting hyperplane
/// and produce distances that cannot be ranked.
pub fn ensure_finite(data: &[f64]) -> Result<()> {
    match data.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(Error::InvalidVector(format!(
            "component {} is {}",
            i, data[i]
        ))),
        None => Ok(()),
    }
}

impl AsRef<[f64]> for Vector {
    fn as_ref(&self) -> &[f64] {
        &self.data
    }
}

impl std::ops::Index<usize> for Vector {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}
