//! # Arcturus
//!
//! **An embedded vector database built on a KD-tree with concurrent, pruned
//! nearest-neighbor search.**
//!
//! Arcturus stores fixed-dimension vectors with JSON-like payloads and
//! answers nearest-neighbor queries, optionally restricted by payload filters
//! or by payload-keyed secondary indexes.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **KD-tree** | Axis-aligned partition, split on `depth % D`, ties go left |
//! | **Pruned search** | Far branches skipped beyond a fraction of the collection diagonal |
//! | **Parallel ranking** | Traversal tasks feed a worker pool and a bounded best-K queue |
//! | **Filtered search** | Payload predicates checked before any distance is computed |
//! | **Secondary indexes** | One sub-tree per value of an indexed payload field |
//! | **Persistence** | Checksummed append-only record files, replayed on open |
//! | **Async API** | Tokio-compatible async operations (feature flag) |
//!
//! ## Quick Start
//!
//! ```rust
//! use arcturus::prelude::*;
//!
//! let db = Database::in_memory(SearchConfig::default());
//! let points = db.create_collection("points", 2, "euclid").unwrap();
//!
//! points.insert("A", vec![0.0, 0.0], Payload::new()).unwrap();
//! points.insert("B", vec![1.0, 0.0], Payload::new()).unwrap();
//! points.insert("C", vec![10.0, 10.0], Payload::new()).unwrap();
//!
//! // Search the whole space for the two nearest points.
//! let results = points.search(&[0.0, 0.0], &SearchParams::new(2).unrestricted()).unwrap();
//! assert_eq!(results[0].id, "A");
//! assert_eq!(results[1].id, "B");
//!
//! // Deleting rebuilds the tree from the remaining vectors.
//! points.delete("B").unwrap();
//! let results = points.search(&[0.0, 0.0], &SearchParams::new(2).unrestricted()).unwrap();
//! assert_eq!(results[1].id, "C");
//! ```
//!
//! ### Pruning
//!
//! By default a query only crosses a splitting hyperplane when it lies within
//! a tenth of the collection diagonal ([`DEFAULT_RADIUS_FRACTION`]). This is a
//! recall/latency trade-off, not an exactness guarantee. Tune it per database
//! with [`SearchConfig::with_radius_fraction`], per query with
//! [`SearchParams::with_radius_fraction`], or turn it off with
//! [`SearchParams::unrestricted`].
//!
//! ### Filtered Search
//!
//! ```rust
//! use arcturus::prelude::*;
//!
//! let db = Database::in_memory(SearchConfig::default());
//! let docs = db.create_collection("docs", 2, "euclid").unwrap();
//! docs.insert("x1", vec![0.0, 0.0], Payload::new().with_field("type", "x")).unwrap();
//! docs.insert("y1", vec![0.1, 0.0], Payload::new().with_field("type", "y")).unwrap();
//!
//! let params = SearchParams::new(10).with_filter(Filter::field("type").eq("x"));
//! let results = docs.search(&[0.0, 0.0], &params).unwrap();
//! assert_eq!(results.len(), 1);
//! ```
//!
//! ### Secondary Indexes
//!
//! Index maintenance for new vectors runs in the background;
//! [`Collection::sync_indexes`] waits for it.
//!
//! ```rust
//! use arcturus::prelude::*;
//!
//! let db = Database::in_memory(SearchConfig::default());
//! let docs = db.create_collection("docs", 2, "cosine").unwrap();
//! docs.create_index("by_lang", "lang").unwrap();
//! docs.insert("a", vec![1.0, 0.0], Payload::new().with_field("lang", "en")).unwrap();
//! docs.insert("b", vec![0.0, 1.0], Payload::new().with_field("lang", "fr")).unwrap();
//! docs.sync_indexes().unwrap();
//!
//! let results = docs
//!     .index_search("by_lang", "fr", &[1.0, 0.0], &SearchParams::new(5).unrestricted())
//!     .unwrap();
//! assert_eq!(results[0].id, "b");
//! ```
//!
//! ### Persistent Database
//!
//! ```no_run
//! use arcturus::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let db = Database::open("./my_vectors", SearchConfig::from_env())?;
//!     let docs = match db.collection("docs") {
//!         Ok(docs) => docs,
//!         Err(_) => db.create_collection("docs", 384, "cosine")?,
//!     };
//!
//!     docs.insert("doc-1", vec![0.1; 384], Payload::new().with_field("title", "example"))?;
//!     db.flush()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crate Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | Enables `AsyncCollection` for tokio compatibility |
//!
//! ## Architecture
//!
//! Arcturus is organized into two crates:
//!
//! - **`arcturus-core`** - Core library with no async runtime dependency
//! - **`arcturus`** - Main crate that re-exports everything
//!
//! ## Logging
//!
//! The library logs through [`tracing`](https://docs.rs/tracing) and never
//! installs a subscriber; the examples show how to set one up.
//!
//! ## Thread Safety
//!
//! - [`Collection`] and [`Database`] are `Send + Sync`; share them through `Arc`
//! - Searches run concurrently with each other; inserts, deletes and rebuilds
//!   are exclusive
//! - `AsyncCollection` is `Clone` and safe to share across tasks

// Re-export everything from core
pub use arcturus_core::*;
