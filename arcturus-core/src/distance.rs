//! Distance metrics for vector similarity computations.
//!
//! A collection picks its metric once, at creation time, by name:
//! `"euclid"` selects [`DistanceMetric::Euclidean`], anything else falls back
//! to [`DistanceMetric::Cosine`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported distance metrics. Lower values always mean more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2 norm of the difference).
    #[serde(rename = "euclid")]
    Euclidean,
    /// Cosine distance (1 - cosine similarity).
    #[serde(rename = "cosine")]
    Cosine,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Cosine
    }
}

impl DistanceMetric {
    /// Resolves a metric from its collection-creation name.
    ///
    /// Matching is case-insensitive; unknown names resolve to cosine.
    ///
    /// ```
    /// use arcturus_core::DistanceMetric;
    ///
    /// assert_eq!(DistanceMetric::from_name("Euclid"), DistanceMetric::Euclidean);
    /// assert_eq!(DistanceMetric::from_name("whatever"), DistanceMetric::Cosine);
    /// ```
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("euclid") {
            Self::Euclidean
        } else {
            Self::Cosine
        }
    }

    /// The name this metric is persisted under.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclid",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Computes the distance between two vectors using this metric.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the vectors differ in length.
    #[inline]
    pub fn compute(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                expected: a.len(),
                got: b.len(),
            });
        }

        Ok(match self {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
        })
    }
}

/// Computes Euclidean (L2) distance between two vectors.
///
/// Formula: sqrt(sum((a[i] - b[i])^2))
#[inline]
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    euclidean_distance_squared(a, b).sqrt()
}

/// Computes squared Euclidean distance (avoids sqrt for comparisons).
#[inline]
pub fn euclidean_distance_squared(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Computes cosine distance between two vectors.
///
/// Formula: 1 - (a · b) / (||a|| * ||b||)
/// Range: [0, 2] where 0 = identical direction, 2 = opposite direction
#[inline]
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot = dot_product(a, b);
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    let denominator = norm_a * norm_b;
    if denominator == 0.0 {
        return 1.0; // Undefined, treat as orthogonal
    }

    1.0 - (dot / denominator)
}

/// Computes dot product (inner product) between two vectors.
#[inline]
pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_euclidean_same_vector() {
        let a = [1.0, 2.0, 3.0];
        assert!(euclidean_distance(&a, &a) < 1e-12);
    }

    #[test]
    fn test_cosine_distance_identical_direction() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        assert!(cosine_distance(&a, &b).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = [1.0, 0.0];
        let b = [-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
    }

    #[test]
    fn test_compute_dimension_mismatch() {
        let result = DistanceMetric::Euclidean.compute(&[1.0, 2.0], &[1.0]);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(DistanceMetric::from_name("euclid"), DistanceMetric::Euclidean);
        assert_eq!(DistanceMetric::from_name("EUCLID"), DistanceMetric::Euclidean);
        assert_eq!(DistanceMetric::from_name("cosine"), DistanceMetric::Cosine);
        assert_eq!(DistanceMetric::from_name(""), DistanceMetric::Cosine);
        assert_eq!(DistanceMetric::Euclidean.name(), "euclid");
    }

    #[test]
    fn test_metric_serializes_by_name() {
        let json = serde_json::to_string(&DistanceMetric::Euclidean).unwrap();
        assert_eq!(json, "\"euclid\"");
        let metric: DistanceMetric = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(metric, DistanceMetric::Cosine);
    }
}
