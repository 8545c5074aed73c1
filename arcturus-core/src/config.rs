//! Collection and search configuration.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};

/// Default traversal pruning radius, as a fraction of the diagonal length.
///
/// Smaller values prune more aggressively and trade recall for latency.
pub const DEFAULT_RADIUS_FRACTION: f64 = 0.1;

/// Default capacity of the channel between traversal and aggregator workers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default tree size below which a query is traversed and ranked on the
/// calling thread instead of the worker pool.
pub const SEQUENTIAL_DISPATCH_THRESHOLD: usize = 256;

/// Tuning for query execution, shared by every collection of a database.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Number of aggregator worker threads per query.
    pub workers: usize,
    /// Capacity of the candidate channel.
    pub channel_capacity: usize,
    /// Pruning radius as a fraction of the collection diagonal.
    pub radius_fraction: f64,
    /// Trees with fewer vectors are searched on the calling thread.
    pub sequential_threshold: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            radius_fraction: DEFAULT_RADIUS_FRACTION,
            sequential_threshold: SEQUENTIAL_DISPATCH_THRESHOLD,
        }
    }
}

impl SearchConfig {
    /// Sets the worker count (at least one). Chainable.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the channel capacity (at least one). Chainable.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Sets the default pruning fraction. Chainable.
    ///
    /// `f64::INFINITY` disables pruning.
    pub fn with_radius_fraction(mut self, fraction: f64) -> Self {
        self.radius_fraction = fraction;
        self
    }

    /// Sets the tree size below which queries skip the worker pool. Chainable.
    pub fn with_sequential_threshold(mut self, threshold: usize) -> Self {
        self.sequential_threshold = threshold;
        self
    }

    /// Reads overrides from `ARCTURUS_SEARCH_WORKERS`,
    /// `ARCTURUS_CHANNEL_CAPACITY` and `ARCTURUS_RADIUS_FRACTION`.
    ///
    /// Absent or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = env_value::<usize>("ARCTURUS_SEARCH_WORKERS") {
            config = config.with_workers(workers);
        }
        if let Some(capacity) = env_value::<usize>("ARCTURUS_CHANNEL_CAPACITY") {
            config = config.with_channel_capacity(capacity);
        }
        if let Some(fraction) = env_value::<f64>("ARCTURUS_RADIUS_FRACTION") {
            if fraction.is_nan() || fraction < 0.0 {
                warn!(fraction, "ignoring negative ARCTURUS_RADIUS_FRACTION");
            } else {
                config = config.with_radius_fraction(fraction);
            }
        }
        config
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring invalid environment override");
            None
        }
    }
}

/// Persistent description of a collection.
///
/// Written as `config.json` by the file-backed database whenever a collection
/// is created or flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Dimensionality of every vector in the collection.
    pub dimension: usize,
    /// Distance metric, persisted by its creation name.
    #[serde(rename = "distance")]
    pub metric: DistanceMetric,
    /// Diagonal length at the time the config was written.
    #[serde(default)]
    pub diagonal_length: f64,
}

impl CollectionConfig {
    /// Creates a config, resolving the metric by name (`"euclid"` or cosine).
    pub fn new(name: impl Into<String>, dimension: usize, metric_name: &str) -> Self {
        Self::with_metric(name, dimension, DistanceMetric::from_name(metric_name))
    }

    pub fn with_metric(name: impl Into<String>, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
            diagonal_length: 0.0,
        }
    }

    /// Checks that the config describes a usable collection.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfig("collection name is empty".into()));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(Error::InvalidConfig(format!(
                "collection name {:?} is not a valid directory name",
                self.name
            )));
        }
        if self.dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_config_defaults() {
        let config = SearchConfig::default();
        assert!(config.workers >= 1);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.radius_fraction, DEFAULT_RADIUS_FRACTION);
        assert_eq!(config.sequential_threshold, SEQUENTIAL_DISPATCH_THRESHOLD);
    }

    #[test]
    fn test_search_config_setters_clamp() {
        let config = SearchConfig::default()
            .with_workers(0)
            .with_channel_capacity(0)
            .with_radius_fraction(f64::INFINITY);
        assert_eq!(config.workers, 1);
        assert_eq!(config.channel_capacity, 1);
        assert!(config.radius_fraction.is_infinite());
    }

    #[test]
    fn test_collection_config_json() {
        let mut config = CollectionConfig::new("docs", 3, "euclid");
        config.diagonal_length = 2.5;

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"distance\":\"euclid\""));

        let back: CollectionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_collection_config_missing_diagonal() {
        let json = r#"{"name":"docs","dimension":2,"distance":"cosine"}"#;
        let config: CollectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert_eq!(config.diagonal_length, 0.0);
    }

    #[test]
    fn test_validate() {
        assert!(CollectionConfig::new("docs", 2, "cosine").validate().is_ok());
        assert!(matches!(
            CollectionConfig::new("docs", 0, "cosine").validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(CollectionConfig::new("", 2, "cosine").validate().is_err());
        assert!(CollectionConfig::new("a/b", 2, "cosine").validate().is_err());
    }
}
