//! Payload-keyed secondary indexes.
//!
//! A [`SecondaryIndex`] partitions the vectors carrying a given payload field
//! by that field's value, with one [`KdTree`] per distinct value. An
//! index-scoped search then traverses only the sub-tree of the selected value.
//!
//! Each index carries its own lock, independent of the collection lock. The
//! write lock is held for a whole add or remove, never per node.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::error::{Error, Result};
use crate::index::kd_tree::KdTree;
use crate::payload::{IndexKey, Payload};
use crate::vector::{Vector, VectorId};

/// The trees of a secondary index, one per distinct field value.
#[derive(Debug)]
pub struct IndexEntries {
    dimension: usize,
    trees: HashMap<IndexKey, KdTree>,
    members: HashMap<VectorId, IndexKey>,
}

impl IndexEntries {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            trees: HashMap::new(),
            members: HashMap::new(),
        }
    }

    /// Returns the sub-tree of vectors whose field equals `value`.
    pub fn entry(&self, value: &IndexKey) -> Option<&KdTree> {
        self.trees.get(value)
    }

    /// Number of indexed vectors across all values.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Distinct indexed values, sorted.
    pub fn values(&self) -> Vec<IndexKey> {
        let mut values: Vec<IndexKey> = self.trees.keys().cloned().collect();
        values.sort();
        values
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }
}

/// A named index over one payload field.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use arcturus_core::{IndexKey, Payload, SecondaryIndex, Vector};
///
/// let index = SecondaryIndex::new("by_type", "type", 2);
/// let v = Arc::new(Vector::new("a", vec![1.0, 2.0], 0, 0));
/// index.add(&v, &Payload::new().with_field("type", "x")).unwrap();
///
/// let entries = index.read();
/// assert_eq!(entries.entry(&IndexKey::from("x")).unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct SecondaryIndex {
    name: String,
    key: String,
    entries: RwLock<IndexEntries>,
}

impl SecondaryIndex {
    /// Creates an empty index named `name` over payload field `key`.
    pub fn new(name: impl Into<String>, key: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            entries: RwLock::new(IndexEntries::new(dimension)),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The payload field this index partitions on.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns true if `payload` carries this index's field.
    #[inline]
    pub fn covers(&self, payload: &Payload) -> bool {
        payload.contains_key(&self.key)
    }

    /// Acquires the index for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, IndexEntries> {
        self.entries.read()
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Adds `vector` under the value of this index's field in `payload`.
    ///
    /// Returns `Ok(false)` without changes if the payload lacks the field, the
    /// vector is already indexed, or the vector has been deleted meanwhile.
    pub fn add(&self, vector: &Arc<Vector>, payload: &Payload) -> Result<bool> {
        let Some(value) = payload.index_key(&self.key) else {
            return Ok(false);
        };

        let mut entries = self.entries.write();
        if vector.is_deleted() || entries.members.contains_key(vector.id()) {
            return Ok(false);
        }

        let dimension = entries.dimension;
        if vector.dimension() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                got: vector.dimension(),
            });
        }
        entries
            .trees
            .entry(value.clone())
            .or_insert_with(|| KdTree::new(dimension))
            .insert(Arc::clone(vector))?;
        entries.members.insert(vector.id().to_string(), value);
        Ok(true)
    }

    /// Removes the vector `id`, rebuilding the sub-tree that held it.
    ///
    /// Returns `Ok(false)` if the vector was not indexed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.write();
        let Some(value) = entries.members.remove(id) else {
            return Ok(false);
        };

        let dimension = entries.dimension;
        let rebuilt = match entries.trees.get(&value) {
            // Re-inserting survivors in pre-order keeps the rest of the shape.
            Some(tree) => KdTree::build(
                dimension,
                tree.iter().filter(|v| v.id() != id).map(Arc::clone),
            )?,
            None => return Ok(true),
        };

        if rebuilt.is_empty() {
            entries.trees.remove(&value);
        } else {
            entries.trees.insert(value, rebuilt);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::kd_tree::tests::{assert_split_invariant, vector};

    fn typed(kind: &str) -> Payload {
        Payload::new().with_field("type", kind)
    }

    #[test]
    fn test_add_partitions_by_value() {
        let index = SecondaryIndex::new("by_type", "type", 2);
        assert_eq!(index.name(), "by_type");
        assert_eq!(index.key(), "type");

        assert!(index.add(&vector("a", &[0.0, 0.0]), &typed("x")).unwrap());
        assert!(index.add(&vector("b", &[1.0, 0.0]), &typed("y")).unwrap());
        assert!(index.add(&vector("c", &[2.0, 2.0]), &typed("x")).unwrap());

        let entries = index.read();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries.values(), vec![IndexKey::from("x"), IndexKey::from("y")]);
        assert_eq!(entries.entry(&IndexKey::from("x")).unwrap().len(), 2);
        assert_eq!(entries.entry(&IndexKey::from("y")).unwrap().len(), 1);
        assert!(entries.entry(&IndexKey::from("z")).is_none());
    }

    #[test]
    fn test_add_skips_missing_field_duplicates_and_deleted() {
        let index = SecondaryIndex::new("by_type", "type", 2);
        let a = vector("a", &[0.0, 0.0]);

        assert!(!index.add(&a, &Payload::new().with_field("other", 1)).unwrap());
        assert!(index.add(&a, &typed("x")).unwrap());
        assert!(!index.add(&a, &typed("x")).unwrap());

        let b = vector("b", &[1.0, 1.0]);
        b.mark_deleted();
        assert!(!index.add(&b, &typed("x")).unwrap());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_rebuilds_entry() {
        let index = SecondaryIndex::new("by_type", "type", 2);
        for (i, p) in [[5.0, 5.0], [2.0, 8.0], [7.0, 1.0], [1.0, 1.0], [9.0, 9.0]]
            .iter()
            .enumerate()
        {
            index.add(&vector(&format!("v{}", i), p), &typed("x")).unwrap();
        }

        assert!(index.remove("v0").unwrap());
        assert!(!index.remove("v0").unwrap());

        let entries = index.read();
        let tree = entries.entry(&IndexKey::from("x")).unwrap();
        assert_eq!(tree.len(), 4);
        assert!(tree.iter().all(|v| v.id() != "v0"));
        assert_split_invariant(tree);
    }

    #[test]
    fn test_remove_last_member_drops_entry() {
        let index = SecondaryIndex::new("by_type", "type", 2);
        index.add(&vector("a", &[0.0, 0.0]), &typed("x")).unwrap();
        assert!(index.remove("a").unwrap());
        assert!(index.is_empty());
        assert!(index.read().entry(&IndexKey::from("x")).is_none());
    }
}
