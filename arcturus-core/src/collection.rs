//! Vector collections: the KD-tree, its geometry and secondary indexes.
//!
//! A `Collection` owns one tree over all of its vectors plus any number of
//! payload-keyed [`SecondaryIndex`]es, and coordinates them with storage:
//! - Vectors and payloads are persisted before they are linked into memory
//! - Mutations take the collection write lock, searches the read lock
//! - Secondary indexes are maintained by a background worker

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::{CollectionConfig, SearchConfig};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::index::kd_tree::KdTree;
use crate::index::secondary::SecondaryIndex;
use crate::payload::{IndexKey, Payload};
use crate::search::{SearchCoordinator, SearchParams, SearchResult};
use crate::storage::{MemoryStore, PayloadStore, StoredVector, VectorStore};
use crate::vector::{ensure_finite, Vector, VectorId};

/// Everything guarded by the collection lock.
struct CollectionState {
    tree: KdTree,
    geometry: Geometry,
    space: HashMap<VectorId, Arc<Vector>>,
    indexes: HashMap<String, Arc<SecondaryIndex>>,
}

impl CollectionState {
    fn new(dimension: usize) -> Self {
        Self {
            tree: KdTree::new(dimension),
            geometry: Geometry::new(dimension),
            space: HashMap::new(),
            indexes: HashMap::new(),
        }
    }

    /// Surviving vectors in storage order, which is insertion order.
    fn vectors_in_storage_order(&self) -> Vec<Arc<Vector>> {
        let mut vectors: Vec<Arc<Vector>> = self.space.values().cloned().collect();
        vectors.sort_by_key(|v| v.storage_offset());
        vectors
    }

    /// Recreates the tree and geometry from the vector set.
    fn rebuild(&mut self, dimension: usize) -> Result<()> {
        let vectors = self.vectors_in_storage_order();
        self.geometry = Geometry::from_vectors(dimension, vectors.iter().map(|v| v.as_slice()));
        self.tree = KdTree::build(dimension, vectors)?;
        Ok(())
    }
}

/// A named set of same-dimension vectors.
///
/// # Example
///
/// ```
/// use arcturus_core::{Collection, CollectionConfig, Payload, SearchConfig, SearchParams};
///
/// let config = CollectionConfig::new("points", 2, "euclid");
/// let collection = Collection::new(config, SearchConfig::default()).unwrap();
///
/// collection.insert("a", vec![0.0, 0.0], Payload::new()).unwrap();
/// collection.insert("b", vec![1.0, 0.0], Payload::new()).unwrap();
/// collection.insert("c", vec![10.0, 10.0], Payload::new()).unwrap();
///
/// let results = collection
///     .search(&[0.0, 0.0], &SearchParams::new(2).unrestricted())
///     .unwrap();
/// assert_eq!(results[0].id, "a");
/// assert_eq!(results[1].id, "b");
/// ```
pub struct Collection {
    config: CollectionConfig,
    search: SearchConfig,
    vectors: Arc<dyn VectorStore>,
    payloads: Arc<dyn PayloadStore>,
    state: RwLock<CollectionState>,
    maintenance: IndexMaintenance,
}

impl Collection {
    /// Creates an empty collection backed by a [`MemoryStore`].
    pub fn new(config: CollectionConfig, search: SearchConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()), search)
    }

    /// Creates an empty collection over a store holding both vectors and
    /// payloads.
    pub fn with_store<S>(config: CollectionConfig, store: Arc<S>, search: SearchConfig) -> Result<Self>
    where
        S: VectorStore + PayloadStore + 'static,
    {
        let vectors: Arc<dyn VectorStore> = store.clone();
        let payloads: Arc<dyn PayloadStore> = store;
        Self::with_stores(config, vectors, payloads, search)
    }

    /// Creates an empty collection over separate vector and payload stores.
    pub fn with_stores(
        config: CollectionConfig,
        vectors: Arc<dyn VectorStore>,
        payloads: Arc<dyn PayloadStore>,
        search: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        let maintenance = IndexMaintenance::spawn(&config.name)?;
        Ok(Self {
            state: RwLock::new(CollectionState::new(config.dimension)),
            config,
            search,
            vectors,
            payloads,
            maintenance,
        })
    }

    /// Links already-persisted vector records, in the given order, and
    /// rebuilds the geometry. Returns the number of vectors linked.
    ///
    /// Records repeating a linked id are skipped.
    pub fn restore<I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = StoredVector>,
    {
        let dimension = self.config.dimension;
        let mut state = self.state.write();
        let mut linked = 0;

        for record in records {
            if record.data.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    got: record.data.len(),
                });
            }
            ensure_finite(&record.data)?;
            if state.space.contains_key(&record.id) {
                warn!(collection = %self.config.name, id = %record.id, "skipping duplicate record");
                continue;
            }

            let vector = Arc::new(Vector::new(
                record.id,
                record.data,
                record.offset,
                record.payload_offset,
            ));
            state.tree.insert(Arc::clone(&vector))?;
            state.geometry.include(vector.as_slice());
            state.space.insert(vector.id().to_string(), vector);
            linked += 1;
        }

        Ok(linked)
    }

    /// Inserts a vector with its payload.
    ///
    /// The payload and vector are persisted first; only then is the vector
    /// linked into the tree, the geometry and the id map under one write
    /// lock. Secondary indexes covering the payload are updated in the
    /// background (see [`Collection::sync_indexes`]).
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if `data` has the wrong length
    /// - [`Error::InvalidVector`] if `data` holds a NaN or infinite component
    /// - [`Error::DuplicateId`] if `id` is already present
    /// - [`Error::StorageFailure`] if persisting fails; nothing is linked
    pub fn insert(&self, id: impl Into<VectorId>, data: Vec<f64>, payload: Payload) -> Result<()> {
        let id = id.into();
        if data.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                got: data.len(),
            });
        }
        ensure_finite(&data)?;

        let (vector, targets) = {
            let mut state = self.state.write();
            if state.space.contains_key(&id) {
                return Err(Error::DuplicateId(id));
            }

            let payload_offset = self.payloads.write_payload(&payload)?;
            let storage_offset = self.vectors.persist(&id, &data, payload_offset)?;
            let vector = Arc::new(Vector::new(id, data, storage_offset, payload_offset));

            state.tree.insert(Arc::clone(&vector))?;
            state.geometry.include(vector.as_slice());
            state.space.insert(vector.id().to_string(), Arc::clone(&vector));

            let targets: Vec<Arc<SecondaryIndex>> = state
                .indexes
                .values()
                .filter(|index| index.covers(&payload))
                .cloned()
                .collect();
            (vector, targets)
        };

        if !targets.is_empty() {
            self.maintenance.submit(IndexJob {
                vector,
                payload,
                targets,
            });
        }
        Ok(())
    }

    /// Deletes a vector and rebuilds the tree and geometry from the rest.
    ///
    /// The storage record is flagged first; if that fails nothing changes.
    /// The vector is also removed from every secondary index before the
    /// write lock is released.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        let vector = state
            .space
            .get(id)
            .cloned()
            .ok_or_else(|| Error::VectorNotFound(id.to_string()))?;

        self.vectors.mark_deleted(vector.storage_offset())?;
        vector.mark_deleted();
        state.space.remove(id);

        let start = Instant::now();
        state.rebuild(self.config.dimension)?;
        for index in state.indexes.values() {
            index.remove(id)?;
        }

        debug!(
            collection = %self.config.name,
            id,
            remaining = state.space.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "rebuilt tree after delete"
        );
        Ok(())
    }

    /// Recreates the tree and geometry from the current vector set.
    pub fn rebuild(&self) -> Result<()> {
        let mut state = self.state.write();
        let start = Instant::now();
        state.rebuild(self.config.dimension)?;
        debug!(
            collection = %self.config.name,
            vectors = state.space.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "rebuilt tree"
        );
        Ok(())
    }

    /// Creates a secondary index named `name` over payload field `key` and
    /// fills it from the existing vectors.
    ///
    /// # Errors
    ///
    /// [`Error::IndexExists`] if the name is taken, or a storage error if an
    /// existing payload cannot be read. On error no index is registered.
    pub fn create_index(&self, name: &str, key: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.indexes.contains_key(name) {
            return Err(Error::IndexExists(name.to_string()));
        }

        let index = Arc::new(SecondaryIndex::new(name, key, self.config.dimension));
        for vector in state.vectors_in_storage_order() {
            let payload = self.payloads.read_payload(vector.payload_offset())?;
            index.add(&vector, &payload)?;
        }

        debug!(collection = %self.config.name, index = name, key, indexed = index.len(), "created index");
        state.indexes.insert(name.to_string(), index);
        Ok(())
    }

    /// Searches the whole collection.
    pub fn search(&self, query: &[f64], params: &SearchParams) -> Result<Vec<SearchResult>> {
        let state = self.state.read();
        SearchCoordinator::new(
            &state.tree,
            &state.geometry,
            self.config.metric,
            self.payloads.as_ref(),
            &self.search,
        )
        .search(query, params)
    }

    /// Searches only the vectors whose indexed field equals `value`.
    ///
    /// An unknown value yields an empty result.
    ///
    /// # Errors
    ///
    /// [`Error::IndexNotFound`] if no index is named `index`.
    pub fn index_search(
        &self,
        index: &str,
        value: impl Into<IndexKey>,
        query: &[f64],
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>> {
        let state = self.state.read();
        let index = state
            .indexes
            .get(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;

        let entries = index.read();
        let empty;
        let tree = match entries.entry(&value.into()) {
            Some(tree) => tree,
            None => {
                empty = KdTree::new(self.config.dimension);
                &empty
            }
        };

        SearchCoordinator::new(
            tree,
            &state.geometry,
            self.config.metric,
            self.payloads.as_ref(),
            &self.search,
        )
        .search(query, params)
    }

    /// Blocks until every queued index update has been applied.
    ///
    /// # Errors
    ///
    /// [`Error::IndexMaintenance`] with the first failure since the last
    /// call, if any update failed.
    pub fn sync_indexes(&self) -> Result<()> {
        self.maintenance.wait()
    }

    /// Flushes the vector store.
    pub fn flush(&self) -> Result<()> {
        self.vectors.flush()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.config.metric
    }

    /// Returns the config with the current diagonal length.
    pub fn config(&self) -> CollectionConfig {
        CollectionConfig {
            diagonal_length: self.state.read().geometry.diagonal_length(),
            ..self.config.clone()
        }
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    /// Returns the number of vectors.
    pub fn len(&self) -> usize {
        self.state.read().space.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.state.read().space.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().space.contains_key(id)
    }

    /// Gets a vector by ID.
    pub fn get(&self, id: &str) -> Option<Arc<Vector>> {
        self.state.read().space.get(id).cloned()
    }

    /// Reads the payload of vector `id`.
    pub fn payload(&self, id: &str) -> Result<Payload> {
        let vector = self
            .get(id)
            .ok_or_else(|| Error::VectorNotFound(id.to_string()))?;
        self.payloads.read_payload(vector.payload_offset())
    }

    /// Snapshot of the current geometry.
    pub fn geometry(&self) -> Geometry {
        self.state.read().geometry.clone()
    }

    /// Runs `f` against the main tree under the read lock.
    pub fn with_tree<R>(&self, f: impl FnOnce(&KdTree) -> R) -> R {
        f(&self.state.read().tree)
    }

    /// Height of the main tree.
    pub fn tree_height(&self) -> usize {
        self.state.read().tree.height()
    }

    /// Names of the secondary indexes, sorted.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().indexes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the secondary index named `name`.
    pub fn index(&self, name: &str) -> Option<Arc<SecondaryIndex>> {
        self.state.read().indexes.get(name).cloned()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// A queued secondary index update.
struct IndexJob {
    vector: Arc<Vector>,
    payload: Payload,
    targets: Vec<Arc<SecondaryIndex>>,
}

#[derive(Default)]
struct MaintenanceStatus {
    pending: usize,
    failures: Vec<String>,
}

#[derive(Default)]
struct Tracker {
    status: Mutex<MaintenanceStatus>,
    idle: Condvar,
}

impl Tracker {
    fn finish(&self, failures: Vec<String>) {
        let mut status = self.status.lock();
        status.pending -= 1;
        status.failures.extend(failures);
        if status.pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Background worker applying index updates for one collection.
///
/// The worker only sees jobs, never the collection itself.
struct IndexMaintenance {
    sender: Option<Sender<IndexJob>>,
    tracker: Arc<Tracker>,
    handle: Option<JoinHandle<()>>,
}

impl IndexMaintenance {
    fn spawn(collection: &str) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let tracker = Arc::new(Tracker::default());

        let worker_tracker = Arc::clone(&tracker);
        let name = collection.to_string();
        let handle = std::thread::Builder::new()
            .name(format!("arcturus-index-{}", collection))
            .spawn(move || Self::work(&name, receiver, &worker_tracker))
            .map_err(|e| Error::IndexMaintenance(format!("spawn worker failed: {}", e)))?;

        Ok(Self {
            sender: Some(sender),
            tracker,
            handle: Some(handle),
        })
    }

    fn work(collection: &str, receiver: Receiver<IndexJob>, tracker: &Tracker) {
        for job in receiver.iter() {
            let mut failures = Vec::new();
            for index in &job.targets {
                if let Err(e) = index.add(&job.vector, &job.payload) {
                    warn!(collection, index = index.name(), id = job.vector.id(), error = %e, "index update failed");
                    failures.push(format!("{} ({}): {}", index.name(), job.vector.id(), e));
                }
            }
            tracker.finish(failures);
        }
    }

    fn submit(&self, job: IndexJob) {
        self.tracker.status.lock().pending += 1;
        let sent = self
            .sender
            .as_ref()
            .map(|sender| sender.send(job).is_ok())
            .unwrap_or(false);
        if !sent {
            self.tracker
                .finish(vec!["index maintenance worker is not running".to_string()]);
        }
    }

    fn wait(&self) -> Result<()> {
        let mut status = self.tracker.status.lock();
        while status.pending > 0 {
            self.tracker.idle.wait(&mut status);
        }

        let failures = std::mem::take(&mut status.failures);
        match failures.into_iter().next() {
            Some(first) => Err(Error::IndexMaintenance(first)),
            None => Ok(()),
        }
    }
}

impl Drop for IndexMaintenance {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// Async API when tokio feature is enabled
#[cfg(feature = "async")]
mod async_api {
    use super::*;

    fn join_error(e: tokio::task::JoinError) -> Error {
        Error::TaskFailed(format!("spawn_blocking failed: {}", e))
    }

    /// Async wrapper for Collection.
    ///
    /// Provides async versions of Collection methods using `spawn_blocking`
    /// for compatibility with async runtimes like Tokio.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use arcturus_core::{AsyncCollection, CollectionConfig, Payload, SearchConfig, SearchParams};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let config = CollectionConfig::new("docs", 3, "cosine");
    ///     let collection = AsyncCollection::new(config, SearchConfig::default()).await.unwrap();
    ///
    ///     collection.insert("a", vec![0.1; 3], Payload::new()).await.unwrap();
    ///     let results = collection.search(vec![0.1; 3], SearchParams::new(10)).await.unwrap();
    /// }
    /// ```
    #[derive(Clone)]
    pub struct AsyncCollection {
        inner: Arc<Collection>,
    }

    impl AsyncCollection {
        /// Creates an in-memory collection asynchronously.
        pub async fn new(config: CollectionConfig, search: SearchConfig) -> Result<Self> {
            let collection = tokio::task::spawn_blocking(move || Collection::new(config, search))
                .await
                .map_err(join_error)??;
            Ok(Self::from_shared(Arc::new(collection)))
        }

        /// Wraps an existing Collection in an async wrapper.
        pub fn from_sync(collection: Collection) -> Self {
            Self::from_shared(Arc::new(collection))
        }

        /// Wraps a collection shared with synchronous callers, such as one
        /// handed out by a `Database`.
        pub fn from_shared(inner: Arc<Collection>) -> Self {
            Self { inner }
        }

        /// Inserts a vector asynchronously.
        pub async fn insert(&self, id: impl Into<VectorId>, data: Vec<f64>, payload: Payload) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            let id = id.into();
            tokio::task::spawn_blocking(move || inner.insert(id, data, payload))
                .await
                .map_err(join_error)?
        }

        /// Deletes a vector asynchronously.
        pub async fn delete(&self, id: impl Into<VectorId>) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            let id = id.into();
            tokio::task::spawn_blocking(move || inner.delete(&id))
                .await
                .map_err(join_error)?
        }

        /// Creates a secondary index asynchronously.
        pub async fn create_index(&self, name: impl Into<String>, key: impl Into<String>) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            let (name, key) = (name.into(), key.into());
            tokio::task::spawn_blocking(move || inner.create_index(&name, &key))
                .await
                .map_err(join_error)?
        }

        /// Searches the whole collection asynchronously.
        pub async fn search(&self, query: Vec<f64>, params: SearchParams) -> Result<Vec<SearchResult>> {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.search(&query, &params))
                .await
                .map_err(join_error)?
        }

        /// Searches one secondary index entry asynchronously.
        pub async fn index_search(
            &self,
            index: impl Into<String>,
            value: impl Into<IndexKey>,
            query: Vec<f64>,
            params: SearchParams,
        ) -> Result<Vec<SearchResult>> {
            let inner = Arc::clone(&self.inner);
            let (index, value) = (index.into(), value.into());
            tokio::task::spawn_blocking(move || inner.index_search(&index, value, &query, &params))
                .await
                .map_err(join_error)?
        }

        /// Waits for background index maintenance asynchronously.
        pub async fn sync_indexes(&self) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.sync_indexes())
                .await
                .map_err(join_error)?
        }

        /// Returns the number of vectors.
        pub fn len(&self) -> usize {
            self.inner.len()
        }

        /// Returns true if empty.
        pub fn is_empty(&self) -> bool {
            self.inner.is_empty()
        }

        /// Flushes the vector store asynchronously.
        pub async fn flush(&self) -> Result<()> {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || inner.flush())
                .await
                .map_err(join_error)?
        }

        /// Returns reference to inner sync collection.
        pub fn inner(&self) -> &Collection {
            &self.inner
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_async_collection_round_trip() {
            let config = CollectionConfig::new("async", 2, "euclid");
            let col = AsyncCollection::new(config, SearchConfig::default()).await.unwrap();
            col.create_index("by_type", "type").await.unwrap();

            let mut handles = Vec::new();
            for i in 0..20 {
                let col = col.clone();
                handles.push(tokio::spawn(async move {
                    let kind = if i % 2 == 0 { "even" } else { "odd" };
                    col.insert(format!("v{}", i), vec![i as f64, 0.0], Payload::new().with_field("type", kind))
                        .await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
            col.sync_indexes().await.unwrap();
            assert_eq!(col.len(), 20);

            let params = SearchParams::new(2).unrestricted();
            let results = col.search(vec![0.0, 0.0], params.clone()).await.unwrap();
            let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["v0", "v1"]);

            let results = col
                .index_search("by_type", "odd", vec![0.0, 0.0], params.clone())
                .await
                .unwrap();
            let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["v1", "v3"]);

            col.delete("v1").await.unwrap();
            assert!(matches!(col.delete("v1").await, Err(Error::VectorNotFound(_))));
            let results = col.search(vec![0.0, 0.0], params).await.unwrap();
            assert_eq!(results[1].id, "v2");
            assert!(!col.inner().contains("v1"));
        }
    }
}

#[cfg(feature = "async")]
pub use async_api::AsyncCollection;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn euclid(dimension: usize) -> Collection {
        Collection::new(
            CollectionConfig::new("test", dimension, "euclid"),
            SearchConfig::default(),
        )
        .unwrap()
    }

    fn abc() -> Collection {
        let col = euclid(2);
        col.insert("A", vec![0.0, 0.0], Payload::new()).unwrap();
        col.insert("B", vec![1.0, 0.0], Payload::new()).unwrap();
        col.insert("C", vec![10.0, 10.0], Payload::new()).unwrap();
        col
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    /// Vector store whose operations fail on demand.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_persist: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl VectorStore for FlakyStore {
        fn persist(&self, id: &str, data: &[f64], payload_offset: u64) -> Result<u64> {
            if self.fail_persist.load(Ordering::SeqCst) {
                return Err(Error::storage("persist failed", "disk full"));
            }
            self.inner.persist(id, data, payload_offset)
        }

        fn mark_deleted(&self, offset: u64) -> Result<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(Error::storage("mark deleted failed", "read-only"));
            }
            self.inner.mark_deleted(offset)
        }
    }

    fn flaky() -> (Collection, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        let col = Collection::with_stores(
            CollectionConfig::new("flaky", 2, "euclid"),
            store.clone(),
            Arc::new(MemoryStore::new()),
            SearchConfig::default(),
        )
        .unwrap();
        (col, store)
    }

    #[test]
    fn test_nearest_two() {
        let col = abc();
        let results = col
            .search(&[0.0, 0.0], &SearchParams::new(2).unrestricted())
            .unwrap();
        assert_eq!(ids(&results), vec!["A", "B"]);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[1].distance, 1.0);
    }

    #[test]
    fn test_delete_then_search() {
        let col = abc();
        col.delete("B").unwrap();

        let results = col
            .search(&[0.0, 0.0], &SearchParams::new(2).unrestricted())
            .unwrap();
        assert_eq!(ids(&results), vec!["A", "C"]);
        assert_eq!(results[0].distance, 0.0);
        assert!((results[1].distance - 200f64.sqrt()).abs() < 1e-12);

        assert_eq!(col.len(), 2);
        assert!(!col.contains("B"));
        assert!((col.geometry().diagonal_length() - 200f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_filter_excludes_other_type() {
        let col = euclid(2);
        col.insert("y-near", vec![0.0, 0.0], Payload::new().with_field("type", "y"))
            .unwrap();
        col.insert("x-far", vec![9.0, 9.0], Payload::new().with_field("type", "x"))
            .unwrap();
        col.insert("x-mid", vec![3.0, 3.0], Payload::new().with_field("type", "x"))
            .unwrap();

        let params = SearchParams::all()
            .unrestricted()
            .with_filter(Filter::field("type").eq("x"));
        let results = col.search(&[0.0, 0.0], &params).unwrap();
        assert_eq!(ids(&results), vec!["x-mid", "x-far"]);
        assert!(results.iter().all(|r| r.payload.get_str("type") == Some("x")));
    }

    #[test]
    fn test_insert_rejections_have_no_effect() {
        let col = abc();
        let before = col.geometry();

        let err = col.insert("A", vec![5.0, 5.0], Payload::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(ref id) if id == "A"));

        let err = col.insert("D", vec![5.0], Payload::new()).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, got: 1 }));

        assert_eq!(col.len(), 3);
        assert_eq!(col.geometry(), before);
        assert_eq!(col.get("A").unwrap().as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_non_finite_vectors_are_rejected() {
        let col = abc();
        let before = col.geometry();

        let err = col.insert("nan", vec![f64::NAN, 0.0], Payload::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidVector(_)));
        let err = col
            .insert("inf", vec![0.0, f64::INFINITY], Payload::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidVector(_)));
        assert_eq!(col.len(), 3);
        assert_eq!(col.geometry(), before);

        let results = col
            .search(&[0.0, 0.0], &SearchParams::new(1).unrestricted())
            .unwrap();
        assert_eq!(ids(&results), vec!["A"]);
        assert_eq!(results[0].distance, 0.0);

        assert!(matches!(
            col.search(&[f64::NAN, 0.0], &SearchParams::new(1)),
            Err(Error::InvalidVector(_))
        ));

        let err = euclid(2)
            .restore(vec![StoredVector {
                offset: 0,
                id: "nan".into(),
                data: vec![f64::NAN, 0.0],
                payload_offset: 0,
            }])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidVector(_)));
    }

    #[test]
    fn test_delete_missing() {
        let col = abc();
        let err = col.delete("nope").unwrap_err();
        assert!(matches!(err, Error::VectorNotFound(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_failed_persist_links_nothing() {
        let (col, store) = flaky();
        col.insert("a", vec![1.0, 1.0], Payload::new()).unwrap();

        store.fail_persist.store(true, Ordering::SeqCst);
        let err = col.insert("b", vec![2.0, 2.0], Payload::new()).unwrap_err();
        assert!(matches!(err, Error::StorageFailure(_)));

        assert_eq!(col.len(), 1);
        assert!(!col.contains("b"));
        let results = col.search(&[2.0, 2.0], &SearchParams::all().unrestricted()).unwrap();
        assert_eq!(ids(&results), vec!["a"]);

        // The id stays free for a later attempt.
        store.fail_persist.store(false, Ordering::SeqCst);
        col.insert("b", vec![2.0, 2.0], Payload::new()).unwrap();
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn test_failed_delete_keeps_vector() {
        let (col, store) = flaky();
        col.insert("a", vec![1.0, 1.0], Payload::new()).unwrap();

        store.fail_delete.store(true, Ordering::SeqCst);
        assert!(matches!(col.delete("a"), Err(Error::StorageFailure(_))));

        let a = col.get("a").unwrap();
        assert!(!a.is_deleted());
        assert!(!store.inner.is_deleted(a.storage_offset()));
        let results = col.search(&[1.0, 1.0], &SearchParams::all()).unwrap();
        assert_eq!(ids(&results), vec!["a"]);
    }

    #[test]
    fn test_index_search() {
        let col = euclid(2);
        col.insert("x1", vec![0.0, 0.0], Payload::new().with_field("type", "x"))
            .unwrap();
        col.insert("y1", vec![0.1, 0.0], Payload::new().with_field("type", "y"))
            .unwrap();
        col.create_index("by_type", "type").unwrap();

        col.insert("x2", vec![5.0, 5.0], Payload::new().with_field("type", "x"))
            .unwrap();
        col.insert("plain", vec![0.0, 0.1], Payload::new()).unwrap();
        col.sync_indexes().unwrap();

        let params = SearchParams::all().unrestricted();
        let results = col.index_search("by_type", "x", &[0.0, 0.0], &params).unwrap();
        assert_eq!(ids(&results), vec!["x1", "x2"]);

        let results = col.index_search("by_type", "y", &[0.0, 0.0], &params).unwrap();
        assert_eq!(ids(&results), vec!["y1"]);

        let results = col.index_search("by_type", "z", &[0.0, 0.0], &params).unwrap();
        assert!(results.is_empty());

        assert!(matches!(
            col.index_search("missing", "x", &[0.0, 0.0], &params),
            Err(Error::IndexNotFound(_))
        ));
        assert!(matches!(
            col.create_index("by_type", "other"),
            Err(Error::IndexExists(_))
        ));
        assert_eq!(col.index_names(), vec!["by_type".to_string()]);
    }

    #[test]
    fn test_index_keeps_value_types_apart() {
        let col = euclid(2);
        col.create_index("by_type", "type").unwrap();
        col.insert("str7", vec![0.0, 0.0], Payload::new().with_field("type", "7"))
            .unwrap();
        col.insert("num7", vec![1.0, 0.0], Payload::new().with_field("type", 7))
            .unwrap();
        col.insert("float7", vec![2.0, 0.0], Payload::new().with_field("type", 7.0))
            .unwrap();
        col.sync_indexes().unwrap();

        let params = SearchParams::all().unrestricted();
        let results = col.index_search("by_type", "7", &[0.0, 0.0], &params).unwrap();
        assert_eq!(ids(&results), vec!["str7"]);

        let results = col.index_search("by_type", 7i64, &[0.0, 0.0], &params).unwrap();
        assert_eq!(ids(&results), vec!["num7", "float7"]);
        assert_eq!(col.index("by_type").unwrap().read().values().len(), 2);
    }

    #[test]
    fn test_delete_removes_from_indexes() {
        let col = euclid(2);
        col.create_index("by_type", "type").unwrap();
        for (id, p) in [("a", [0.0, 0.0]), ("b", [1.0, 1.0]), ("c", [2.0, 2.0])] {
            col.insert(id, p.to_vec(), Payload::new().with_field("type", "x"))
                .unwrap();
        }
        col.sync_indexes().unwrap();

        col.delete("b").unwrap();
        let results = col
            .index_search("by_type", "x", &[1.0, 1.0], &SearchParams::all().unrestricted())
            .unwrap();
        let mut found = ids(&results);
        found.sort_unstable();
        assert_eq!(found, vec!["a", "c"]);
        assert_eq!(col.index("by_type").unwrap().len(), 2);
    }

    #[test]
    fn test_maintenance_failure_surfaces_on_sync() {
        let maintenance = IndexMaintenance::spawn("test").unwrap();
        let index = Arc::new(SecondaryIndex::new("by_type", "type", 3));
        maintenance.submit(IndexJob {
            vector: Arc::new(Vector::new("a", vec![1.0, 2.0], 0, 0)),
            payload: Payload::new().with_field("type", "x"),
            targets: vec![index],
        });

        let err = maintenance.wait().unwrap_err();
        assert!(matches!(err, Error::IndexMaintenance(ref msg) if msg.contains("by_type")));
        // Failures are reported once.
        assert!(maintenance.wait().is_ok());
    }

    #[test]
    fn test_rebuild_preserves_vectors() {
        let col = euclid(3);
        for i in 0..50 {
            let x = i as f64;
            col.insert(format!("v{}", i), vec![x, -x, x * 0.5], Payload::new())
                .unwrap();
        }
        let before = col.geometry();
        col.rebuild().unwrap();
        assert_eq!(col.len(), 50);
        assert_eq!(col.geometry(), before);
        assert_eq!(col.tree_height(), 50);
    }

    #[test]
    fn test_delete_rebuilds_tree_in_storage_order() {
        let col = euclid(1);
        for (id, x) in [("m", 5.0), ("l", 2.0), ("r", 8.0), ("ll", 1.0)] {
            col.insert(id, vec![x], Payload::new()).unwrap();
        }
        col.delete("m").unwrap();

        col.with_tree(|tree| {
            assert_eq!(tree.len(), 3);
            let root = tree.root().unwrap();
            assert_eq!(root.vector().id(), "l");
            assert_eq!(root.left().unwrap().vector().id(), "ll");
            assert_eq!(root.right().unwrap().vector().id(), "r");
        });
    }

    #[test]
    fn test_config_tracks_diagonal() {
        let col = abc();
        let config = col.config();
        assert_eq!(config.name, "test");
        assert_eq!(config.metric, DistanceMetric::Euclidean);
        assert!((config.diagonal_length - 200f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_restore_links_records() {
        let col = euclid(2);
        let linked = col
            .restore(vec![
                StoredVector {
                    offset: 0,
                    id: "a".into(),
                    data: vec![1.0, 0.0],
                    payload_offset: 0,
                },
                StoredVector {
                    offset: 1,
                    id: "a".into(),
                    data: vec![2.0, 0.0],
                    payload_offset: 0,
                },
            ])
            .unwrap();
        assert_eq!(linked, 1);
        assert_eq!(col.get("a").unwrap().as_slice(), &[1.0, 0.0]);
        assert_eq!(col.geometry().diagonal_length(), 1.0);
    }

    #[test]
    fn test_concurrent_inserts_and_searches() {
        let col = Arc::new(euclid(2));
        col.create_index("by_bucket", "bucket").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let col = Arc::clone(&col);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let x = (t * 100 + i) as f64;
                        col.insert(
                            format!("{}-{}", t, i),
                            vec![x, x % 7.0],
                            Payload::new().with_field("bucket", i % 3),
                        )
                        .unwrap();
                        if i % 10 == 0 {
                            col.search(&[x, 0.0], &SearchParams::new(5)).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        col.sync_indexes().unwrap();
        assert_eq!(col.len(), 400);
        assert_eq!(col.index("by_bucket").unwrap().len(), 400);

        let all = col
            .search(&[0.0, 0.0], &SearchParams::all().unrestricted())
            .unwrap();
        assert_eq!(all.len(), 400);

        let bucket = col
            .index_search("by_bucket", 1i64, &[0.0, 0.0], &SearchParams::all().unrestricted())
            .unwrap();
        assert_eq!(bucket.len(), 132);
        assert!(bucket.iter().all(|r| r.payload.get_i64("bucket") == Some(1)));
    }
}
