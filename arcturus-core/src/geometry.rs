//! Collection geometry: bounding extremes and diagonal length.
//!
//! The diagonal drives two thresholds: the traversal pruning radius
//! (`radius_fraction * diagonal`) and the optional euclidean post-filter
//! cutoff (`max_distance_percent * diagonal`).

/// Running component-wise bounds over every vector of a collection.
///
/// Bounds start at the origin and only move outward, so the box always
/// contains the origin and every inserted vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    max: Vec<f64>,
    min: Vec<f64>,
    diff: Vec<f64>,
    diagonal_length: f64,
}

impl Geometry {
    /// Creates the geometry of an empty collection of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            max: vec![0.0; dimension],
            min: vec![0.0; dimension],
            diff: vec![0.0; dimension],
            diagonal_length: 0.0,
        }
    }

    /// Recomputes geometry from scratch over `vectors`.
    pub fn from_vectors<'a, I>(dimension: usize, vectors: I) -> Self
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut geometry = Self::new(dimension);
        for data in vectors {
            geometry.include(data);
        }
        geometry
    }

    /// Widens the bounds to contain `data` and refreshes the diagonal.
    pub fn include(&mut self, data: &[f64]) {
        for (i, &x) in data.iter().enumerate().take(self.max.len()) {
            if x > self.max[i] {
                self.max[i] = x;
            }
            if x < self.min[i] {
                self.min[i] = x;
            }
            self.diff[i] = self.max[i] - self.min[i];
        }
        self.diagonal_length = self.diff.iter().map(|d| d * d).sum::<f64>().sqrt();
    }

    #[inline]
    pub fn max_vector(&self) -> &[f64] {
        &self.max
    }

    #[inline]
    pub fn min_vector(&self) -> &[f64] {
        &self.min
    }

    /// Per-axis extent (`max - min`).
    #[inline]
    pub fn dimension_diff(&self) -> &[f64] {
        &self.diff
    }

    #[inline]
    pub fn diagonal_length(&self) -> f64 {
        self.diagonal_length
    }

    /// Traversal pruning radius for a fraction of the diagonal.
    #[inline]
    pub fn pruning_radius(&self, fraction: f64) -> f64 {
        fraction * self.diagonal_length
    }
}
