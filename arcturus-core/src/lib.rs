//! # Arcturus Core
//!
//! Core library for Arcturus, an embedded vector database built around a
//! KD-tree and a concurrent, pruned nearest-neighbor search.
//!
//! ## Crate Features
//!
//! - `async` - Enables [`AsyncCollection`] for tokio-compatible async operations
//!
//! ## Core Types
//!
//! ### Search
//!
//! - [`KdTree`] - Axis-aligned binary partition of a collection's vectors
//! - [`SearchCoordinator`] - Runs one query: prune, dispatch, drain, rank
//! - [`ResultAggregator`] - Bounded best-K queue fed by a worker pool
//! - [`SecondaryIndex`] - One KD-tree per value of a payload field
//!
//! ### Storage
//!
//! - [`Database`] - Named collections, in memory or on disk
//! - [`Collection`] - Tree, geometry and indexes under one lock
//! - [`AsyncCollection`] - Async wrapper for tokio compatibility (requires `async` feature)
//! - [`storage::MemoryStore`] and [`storage::FileStore`] - Vector and payload stores
//!
//! ### Filtering
//!
//! - [`Filter`] - Payload predicates evaluated before distance computation
//!
//! ### Types
//!
//! - [`Vector`] - Shared vector data with storage offsets
//! - [`VectorId`] - Unique identifier for vectors (a string)
//! - [`Payload`] - JSON-like metadata attached to vectors
//! - [`DistanceMetric`] - Euclidean or cosine

pub mod collection;
pub mod config;
pub mod database;
pub mod distance;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod index;
pub mod payload;
pub mod search;
pub mod storage;
pub mod vector;

// Re-exports for convenient access
pub use collection::Collection;
#[cfg(feature = "async")]
pub use collection::AsyncCollection;
pub use config::{CollectionConfig, SearchConfig, DEFAULT_RADIUS_FRACTION};
pub use database::Database;
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use filter::{Filter, Operator, Predicate};
pub use geometry::Geometry;
pub use index::kd_tree::{KdNode, KdTree};
pub use index::secondary::SecondaryIndex;
pub use payload::{IndexKey, Payload};
pub use search::{ResultAggregator, SearchCoordinator, SearchParams, SearchResult};
pub use vector::{Vector, VectorId};

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use arcturus_core::prelude::*;
///
/// let db = Database::in_memory(SearchConfig::default());
/// let points = db.create_collection("points", 3, "euclid").unwrap();
/// points.insert("a", vec![1.0, 2.0, 3.0], Payload::new().with_field("key", "value")).unwrap();
/// ```
pub mod prelude {
    pub use crate::{
        Collection, CollectionConfig, Database, DistanceMetric, Error, Filter, IndexKey, Payload,
        Result, SearchConfig, SearchParams, SearchResult, Vector, VectorId,
    };
}
