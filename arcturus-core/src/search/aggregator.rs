//! Bounded best-K result aggregation fed by concurrent traversal.
//!
//! Traversal tasks push candidate vectors onto a bounded channel. A fixed pool
//! of worker threads drains it: each worker evaluates the filter, computes the
//! distance and offers the candidate to a shared [`BoundedQueue`].
//!
//! # Completion
//!
//! [`ResultAggregator::run`] hands the only [`Sender`] to the producer
//! closure. When the closure returns, every producer has finished and the
//! sender is dropped, which closes the channel. Workers drain what is still
//! buffered and exit; the thread scope joins them before results are read.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::warn;

use crate::distance::DistanceMetric;
use crate::filter::Filter;
use crate::storage::PayloadStore;
use crate::vector::Vector;

/// A candidate vector with its distance to the query.
#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub vector: Arc<Vector>,
    pub distance: f64,
}

impl PartialEq for ScoredVector {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredVector {}

impl PartialOrd for ScoredVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredVector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.vector.storage_offset().cmp(&other.vector.storage_offset()))
    }
}

/// Max-heap of scored vectors capped at `capacity` entries.
///
/// A capacity of zero leaves the queue unbounded. When full, an offer is
/// accepted only if it ranks strictly before the current worst entry, which
/// is evicted. Equal distances rank by storage offset, so the retained set
/// does not depend on arrival order.
#[derive(Debug)]
pub struct BoundedQueue {
    capacity: usize,
    heap: Mutex<BinaryHeap<ScoredVector>>,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        let reserve = if capacity == 0 { 16 } else { capacity };
        Self {
            capacity,
            heap: Mutex::new(BinaryHeap::with_capacity(reserve)),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offers a candidate. Returns true if it was retained.
    pub fn offer(&self, candidate: ScoredVector) -> bool {
        let mut heap = self.heap.lock();
        if self.capacity == 0 || heap.len() < self.capacity {
            heap.push(candidate);
            return true;
        }

        match heap.peek() {
            Some(worst) if candidate < *worst => {
                heap.pop();
                heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    /// Distance of the current worst retained entry.
    pub fn worst_distance(&self) -> Option<f64> {
        self.heap.lock().peek().map(|c| c.distance)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Consumes the queue, returning entries ascending by distance.
    pub fn into_sorted(self) -> Vec<ScoredVector> {
        self.heap.into_inner().into_sorted_vec()
    }
}

/// Per-query aggregation state: the query, its filter and the result queue.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use arcturus_core::search::aggregator::ResultAggregator;
/// use arcturus_core::storage::MemoryStore;
/// use arcturus_core::{DistanceMetric, Vector};
///
/// let store = MemoryStore::new();
/// let vectors: Vec<Arc<Vector>> = (0..10)
///     .map(|i| Arc::new(Vector::new(i.to_string(), vec![i as f64], i, 0)))
///     .collect();
///
/// let query = [3.2];
/// let aggregator = ResultAggregator::new(DistanceMetric::Euclidean, &query, None, &store, 2);
/// let results = aggregator.run(2, 8, |tx| {
///     for v in &vectors {
///         tx.send(v).unwrap();
///     }
/// });
///
/// let ids: Vec<&str> = results.iter().map(|r| r.vector.id()).collect();
/// assert_eq!(ids, vec!["3", "4"]);
/// ```
pub struct ResultAggregator<'q> {
    metric: DistanceMetric,
    query: &'q [f64],
    filter: Option<&'q Filter>,
    payloads: &'q dyn PayloadStore,
    queue: BoundedQueue,
}

impl<'q> ResultAggregator<'q> {
    /// Creates an aggregator retaining the best `k` candidates (`0` = all).
    pub fn new(
        metric: DistanceMetric,
        query: &'q [f64],
        filter: Option<&'q Filter>,
        payloads: &'q dyn PayloadStore,
        k: usize,
    ) -> Self {
        Self {
            metric,
            query,
            filter: filter.filter(|f| !f.is_empty()),
            payloads,
            queue: BoundedQueue::new(k),
        }
    }

    /// Evaluates one candidate: filter first, then distance, then the queue.
    ///
    /// Returns true if the candidate was retained.
    pub fn consider(&self, vector: &Arc<Vector>) -> bool {
        if vector.is_deleted() {
            return false;
        }

        if let Some(filter) = self.filter {
            match self.payloads.read_payload(vector.payload_offset()) {
                Ok(payload) if filter.matches(&payload) => {}
                Ok(_) => return false,
                Err(e) => {
                    warn!(id = vector.id(), error = %e, "skipping candidate with unreadable payload");
                    return false;
                }
            }
        }

        match self.metric.compute(self.query, vector.as_slice()) {
            Ok(distance) => self.queue.offer(ScoredVector {
                vector: Arc::clone(vector),
                distance,
            }),
            Err(e) => {
                warn!(id = vector.id(), error = %e, "skipping candidate");
                false
            }
        }
    }

    /// Runs `produce` against a pool of `workers` threads and returns the
    /// retained candidates ascending by distance.
    ///
    /// `produce` receives the sole sender of a channel of `capacity` slots and
    /// must return only once every candidate it emits has been sent. A failed
    /// send means the workers are gone; producers should stop.
    pub fn run<'t, P>(self, workers: usize, capacity: usize, produce: P) -> Vec<ScoredVector>
    where
        P: FnOnce(Sender<&'t Arc<Vector>>),
    {
        let (tx, rx) = bounded::<&'t Arc<Vector>>(capacity.max(1));

        std::thread::scope(|s| {
            let this = &self;
            for _ in 0..workers.max(1) {
                let rx = rx.clone();
                s.spawn(move || this.work(rx));
            }
            drop(rx);

            produce(tx);
        });

        self.into_results()
    }

    fn work(&self, rx: Receiver<&Arc<Vector>>) {
        for vector in rx.iter() {
            self.consider(vector);
        }
    }

    /// Consumes the aggregator, returning its results ascending by distance.
    pub fn into_results(self) -> Vec<ScoredVector> {
        self.queue.into_sorted()
    }
}
