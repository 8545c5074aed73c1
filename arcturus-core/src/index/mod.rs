//! Spatial indexes.
//!
//! - [`kd_tree`]: the KD-tree every collection searches
//! - [`secondary`]: payload-keyed partitions, one KD-tree per field value

pub mod kd_tree;
pub mod secondary;
