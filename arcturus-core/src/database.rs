//! The database: a set of named collections.
//!
//! A `Database` is an explicit value owned by the caller, with no global
//! state. It comes in two flavors:
//! - [`Database::in_memory`] keeps every collection in a [`MemoryStore`]
//! - [`Database::open`] keeps each collection in `root/<name>/`, holding a
//!   `config.json` and a `data.adb` record file, and reloads them on open
//!
//! [`MemoryStore`]: crate::storage::MemoryStore

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::collection::Collection;
use crate::config::{CollectionConfig, SearchConfig};
use crate::error::{Error, Result};
use crate::payload::{IndexKey, Payload};
use crate::search::{SearchParams, SearchResult};
use crate::storage::FileStore;
use crate::vector::VectorId;

const CONFIG_FILE: &str = "config.json";
const DATA_FILE: &str = "data.adb";

/// A set of named collections sharing one search configuration.
///
/// # Example
///
/// ```
/// use arcturus_core::{Database, Payload, SearchConfig, SearchParams};
///
/// let db = Database::in_memory(SearchConfig::default());
/// let docs = db.create_collection("docs", 2, "euclid").unwrap();
/// docs.insert("a", vec![1.0, 1.0], Payload::new().with_field("lang", "en")).unwrap();
///
/// let results = db.search("docs", &[1.0, 1.0], &SearchParams::new(1)).unwrap();
/// assert_eq!(results[0].id, "a");
/// assert_eq!(db.list_collections(), vec!["docs".to_string()]);
/// ```
pub struct Database {
    root: Option<PathBuf>,
    search: SearchConfig,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    /// Creates a database whose collections live in memory only.
    pub fn in_memory(search: SearchConfig) -> Self {
        Self {
            root: None,
            search,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Opens or creates a file-backed database under `root`.
    ///
    /// Every subdirectory holding a `config.json` is loaded as a collection:
    /// its live vector records are replayed in storage order, rebuilding the
    /// tree and geometry. Secondary indexes are not persisted and must be
    /// recreated.
    pub fn open<P: AsRef<Path>>(root: P, search: SearchConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::storage("create root dir failed", e))?;

        let mut collections = HashMap::new();
        let entries = fs::read_dir(&root).map_err(|e| Error::storage("read root dir failed", e))?;
        for entry in entries {
            let dir = entry
                .map_err(|e| Error::storage("read root dir failed", e))?
                .path();
            if !dir.is_dir() {
                continue;
            }
            if !dir.join(CONFIG_FILE).exists() {
                warn!(path = %dir.display(), "skipping directory without collection config");
                continue;
            }

            let collection = Self::load_collection(&dir, &search)?;
            collections.insert(collection.name().to_string(), Arc::new(collection));
        }

        info!(root = %root.display(), collections = collections.len(), "opened database");

        Ok(Self {
            root: Some(root),
            search,
            collections: RwLock::new(collections),
        })
    }

    fn load_collection(dir: &Path, search: &SearchConfig) -> Result<Collection> {
        let config = read_config(dir)?;
        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if config.name != dir_name {
            return Err(Error::InvalidConfig(format!(
                "collection {:?} stored in directory {:?}",
                config.name, dir_name
            )));
        }

        let store = Arc::new(FileStore::open(dir.join(DATA_FILE))?);
        let records = store.active_vectors()?;
        let collection = Collection::with_store(config, store, search.clone())?;
        let linked = collection.restore(records)?;

        debug!(
            collection = collection.name(),
            vectors = linked,
            diagonal = collection.geometry().diagonal_length(),
            "loaded collection"
        );
        Ok(collection)
    }

    /// Root directory of a file-backed database.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    /// Creates a collection. `metric_name` is `"euclid"` or, for anything
    /// else, cosine.
    ///
    /// # Errors
    ///
    /// - [`Error::CollectionExists`] if the name is taken
    /// - [`Error::InvalidConfig`] for a zero dimension or an unusable name
    pub fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric_name: &str,
    ) -> Result<Arc<Collection>> {
        let config = CollectionConfig::new(name, dimension, metric_name);
        config.validate()?;

        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(Error::CollectionExists(name.to_string()));
        }

        let collection = match &self.root {
            None => Collection::new(config, self.search.clone())?,
            Some(root) => {
                let dir = root.join(name);
                if dir.exists() {
                    return Err(Error::CollectionExists(name.to_string()));
                }
                fs::create_dir_all(&dir)
                    .map_err(|e| Error::storage("create collection dir failed", e))?;
                write_config(&dir, &config)?;
                let store = Arc::new(FileStore::open(dir.join(DATA_FILE))?);
                Collection::with_store(config, store, self.search.clone())?
            }
        };

        info!(
            collection = name,
            dimension,
            metric = collection.metric().name(),
            "created collection"
        );

        let collection = Arc::new(collection);
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Deletes a collection and, when file-backed, its directory.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let removed = self
            .collections
            .write()
            .remove(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;

        if let Some(root) = &self.root {
            fs::remove_dir_all(root.join(name))
                .map_err(|e| Error::storage("remove collection dir failed", e))?;
        }

        info!(collection = name, vectors = removed.len(), "deleted collection");
        Ok(())
    }

    /// Names of all collections, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the collection named `name`.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    /// Flushes every store and rewrites every config with its current
    /// diagonal length.
    pub fn flush(&self) -> Result<()> {
        let collections: Vec<Arc<Collection>> = self.collections.read().values().cloned().collect();
        for collection in collections {
            collection.flush()?;
            if let Some(root) = &self.root {
                write_config(&root.join(collection.name()), &collection.config())?;
            }
        }
        Ok(())
    }

    /// Inserts into the collection named `collection`.
    pub fn insert(
        &self,
        collection: &str,
        id: impl Into<VectorId>,
        data: Vec<f64>,
        payload: Payload,
    ) -> Result<()> {
        self.collection(collection)?.insert(id, data, payload)
    }

    /// Deletes from the collection named `collection`.
    pub fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.collection(collection)?.delete(id)
    }

    /// Creates a secondary index on the collection named `collection`.
    pub fn create_index(&self, collection: &str, name: &str, key: &str) -> Result<()> {
        self.collection(collection)?.create_index(name, key)
    }

    /// Searches the collection named `collection`.
    pub fn search(
        &self,
        collection: &str,
        query: &[f64],
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>> {
        self.collection(collection)?.search(query, params)
    }

    /// Searches one secondary index entry of the collection named
    /// `collection`.
    pub fn index_search(
        &self,
        collection: &str,
        index: &str,
        value: impl Into<IndexKey>,
        query: &[f64],
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>> {
        self.collection(collection)?
            .index_search(index, value, query, params)
    }
}

fn read_config(dir: &Path) -> Result<CollectionConfig> {
    let content = fs::read_to_string(dir.join(CONFIG_FILE))
        .map_err(|e| Error::InvalidConfig(format!("read config failed: {}", e)))?;
    let config: CollectionConfig = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidConfig(format!("parse config failed: {}", e)))?;
    config.validate()?;
    Ok(config)
}

fn write_config(dir: &Path, config: &CollectionConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::storage("serialize config failed", e))?;
    fs::write(dir.join(CONFIG_FILE), content)
        .map_err(|e| Error::storage("write config failed", e))
}
