//! Query execution over a KD-tree.
//!
//! One query moves through these phases:
//!
//! 1. **Init**: an empty tree yields an empty result.
//! 2. **Pruning**: the traversal radius is a fraction of the collection
//!    diagonal.
//! 3. **Dispatch**: traversal tasks emit every reached node as a candidate.
//! 4. **Drain**: the aggregator workers finish ranking every candidate.
//! 5. **PostFilter**: euclidean queries with `max_distance_percent > 0` drop
//!    results farther than that fraction of the diagonal.
//! 6. **Sorted**: results are ordered by distance and their payloads resolved.
//!
//! The pruning radius is a heuristic, not a guarantee: true neighbors behind a
//! pruned hyperplane are missed.

pub mod aggregator;

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use rayon::Scope;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::geometry::Geometry;
use crate::index::kd_tree::{KdNode, KdTree};
use crate::payload::Payload;
use crate::storage::PayloadStore;
use crate::vector::{ensure_finite, Vector, VectorId};

pub use aggregator::{BoundedQueue, ResultAggregator, ScoredVector};

/// Per-query parameters.
///
/// # Example
///
/// ```
/// use arcturus_core::{Filter, SearchParams};
///
/// let params = SearchParams::new(10)
///     .with_max_distance_percent(0.5)
///     .with_filter(Filter::field("type").eq("x"));
/// assert_eq!(params.k, 10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Maximum number of results; 0 returns every visited match.
    pub k: usize,
    /// Euclidean cutoff as a fraction of the diagonal; 0 disables it.
    pub max_distance_percent: f64,
    /// Payload predicates a candidate must satisfy.
    pub filter: Option<Filter>,
    /// Overrides the configured pruning fraction for this query.
    pub radius_fraction: Option<f64>,
}

impl SearchParams {
    /// Returns the best `k` results.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    /// Returns every visited match, unbounded.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_max_distance_percent(mut self, percent: f64) -> Self {
        self.max_distance_percent = percent;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_radius_fraction(mut self, fraction: f64) -> Self {
        self.radius_fraction = Some(fraction);
        self
    }

    /// Disables pruning: every node of the tree is visited.
    pub fn unrestricted(self) -> Self {
        self.with_radius_fraction(f64::INFINITY)
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: VectorId,
    pub distance: f64,
    pub payload: Payload,
}

/// Executes queries against one tree and the geometry of its collection.
///
/// The same coordinator serves full-collection searches (the collection tree)
/// and index-scoped searches (one secondary index entry).
pub struct SearchCoordinator<'a> {
    tree: &'a KdTree,
    geometry: &'a Geometry,
    metric: DistanceMetric,
    payloads: &'a dyn PayloadStore,
    config: &'a SearchConfig,
}

impl<'a> SearchCoordinator<'a> {
    pub fn new(
        tree: &'a KdTree,
        geometry: &'a Geometry,
        metric: DistanceMetric,
        payloads: &'a dyn PayloadStore,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            tree,
            geometry,
            metric,
            payloads,
            config,
        }
    }

    /// Traversal radius for a pruning fraction. An infinite fraction visits
    /// everything, even when the diagonal is zero.
    pub fn pruning_radius(&self, fraction: f64) -> f64 {
        if fraction.is_infinite() {
            f64::INFINITY
        } else {
            self.geometry.pruning_radius(fraction)
        }
    }

    /// Runs a query to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `query` does not have the
    /// tree's dimension and [`Error::InvalidVector`] if it holds a NaN or
    /// infinite component. Per-result payload failures are logged and the
    /// result is dropped.
    pub fn search(&self, query: &[f64], params: &SearchParams) -> Result<Vec<SearchResult>> {
        if query.len() != self.tree.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.tree.dimension(),
                got: query.len(),
            });
        }
        ensure_finite(query)?;

        let Some(root) = self.tree.root() else {
            return Ok(Vec::new());
        };

        let start = Instant::now();
        let fraction = params.radius_fraction.unwrap_or(self.config.radius_fraction);
        let radius = self.pruning_radius(fraction);

        let aggregator = ResultAggregator::new(
            self.metric,
            query,
            params.filter.as_ref(),
            self.payloads,
            params.k,
        );

        let mut scored = if self.tree.len() < self.config.sequential_threshold {
            self.tree.traverse(query, radius, |node| {
                aggregator.consider(node.vector());
            });
            aggregator.into_results()
        } else {
            aggregator.run(self.config.workers, self.config.channel_capacity, |tx| {
                rayon::scope(|s| dispatch(s, root, query, radius, &tx));
            })
        };
        let candidates = scored.len();

        if self.metric == DistanceMetric::Euclidean && params.max_distance_percent > 0.0 {
            let cutoff = params.max_distance_percent * self.geometry.diagonal_length();
            scored.retain(|s| s.distance <= cutoff);
        }

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let results: Vec<SearchResult> = scored
            .into_iter()
            .filter_map(|s| self.resolve(s))
            .collect();

        debug!(
            tree_size = self.tree.len(),
            radius,
            candidates,
            results = results.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "search complete"
        );

        Ok(results)
    }

    fn resolve(&self, scored: ScoredVector) -> Option<SearchResult> {
        match self.payloads.read_payload(scored.vector.payload_offset()) {
            Ok(payload) => Some(SearchResult {
                id: scored.vector.id().to_string(),
                distance: scored.distance,
                payload,
            }),
            Err(e) => {
                warn!(id = scored.vector.id(), error = %e, "dropping result with unreadable payload");
                None
            }
        }
    }
}

/// Walks the near chain below `node` on the current task and spawns a task
/// for every far child within `radius`.
fn dispatch<'s, 't: 's>(
    scope: &Scope<'s>,
    node: &'t KdNode,
    query: &'t [f64],
    radius: f64,
    tx: &Sender<&'t Arc<Vector>>,
) {
    let mut next = Some(node);
    while let Some(node) = next {
        if tx.send(node.vector()).is_err() {
            return;
        }

        let (near, far) = node.branches(query, radius);
        if let Some(far) = far {
            let tx = tx.clone();
            scope.spawn(move |s| dispatch(s, far, query, radius, &tx));
        }
        next = near;
    }
}
