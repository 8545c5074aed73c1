//! KD-tree: recursive axis-aligned binary partition of the vector space.
//!
//! A node at depth `d` splits on dimension `d % D`. Every vector in its left
//! subtree has `data[k] <= node.data[k]`, every vector in its right subtree has
//! `data[k] > node.data[k]` (ties go left).
//!
//! # Shape
//!
//! The tree is never rebalanced: its shape is a direct function of insertion
//! order. Sorted insertion degenerates it into a chain and traversal becomes
//! near-linear. Insertion, traversal and drop are iterative so that degenerate
//! trees cannot exhaust the stack.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::vector::Vector;

/// A single tree node. Owns its two children exclusively.
#[derive(Debug)]
pub struct KdNode {
    vector: Arc<Vector>,
    depth: usize,
    split: usize,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

impl KdNode {
    fn new(vector: Arc<Vector>, depth: usize, dimension: usize) -> Self {
        Self {
            vector,
            depth,
            split: depth % dimension,
            left: None,
            right: None,
        }
    }

    #[inline]
    pub fn vector(&self) -> &Arc<Vector> {
        &self.vector
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The dimension this node partitions on (`depth % D`).
    #[inline]
    pub fn split_dimension(&self) -> usize {
        self.split
    }

    #[inline]
    pub fn left(&self) -> Option<&KdNode> {
        self.left.as_deref()
    }

    #[inline]
    pub fn right(&self) -> Option<&KdNode> {
        self.right.as_deref()
    }

    /// Signed distance from `query` to this node's splitting hyperplane.
    #[inline]
    pub fn plane_distance(&self, query: &[f64]) -> f64 {
        query[self.split] - self.vector[self.split]
    }

    /// Picks the children to descend for `query` at `radius`.
    ///
    /// Returns `(near, far)`: the near child is the side of the hyperplane the
    /// query falls on and is always returned. The far child is returned only
    /// when the hyperplane lies within `radius` of the query; otherwise no
    /// vector behind it can be closer than the radius along this axis.
    pub fn branches(&self, query: &[f64], radius: f64) -> (Option<&KdNode>, Option<&KdNode>) {
        let delta = self.plane_distance(query);
        let (near, far) = if delta <= 0.0 {
            (self.left(), self.right())
        } else {
            (self.right(), self.left())
        };

        let far = if delta.abs() <= radius { far } else { None };
        (near, far)
    }
}

/// A KD-tree over shared vectors of a fixed dimension.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use arcturus_core::{KdTree, Vector};
///
/// let mut tree = KdTree::new(2);
/// tree.insert(Arc::new(Vector::new("a", vec![0.0, 0.0], 0, 0))).unwrap();
/// tree.insert(Arc::new(Vector::new("b", vec![1.0, 0.0], 1, 1))).unwrap();
///
/// let mut seen = Vec::new();
/// tree.traverse(&[0.0, 0.0], f64::INFINITY, |node| seen.push(node.vector().id().to_string()));
/// assert_eq!(seen, vec!["a", "b"]);
/// ```
#[derive(Debug)]
pub struct KdTree {
    dimension: usize,
    root: Option<Box<KdNode>>,
    len: usize,
}

impl KdTree {
    /// Creates an empty tree for vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            root: None,
            len: 0,
        }
    }

    /// Builds a tree by inserting `vectors` in iteration order.
    pub fn build<I>(dimension: usize, vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<Vector>>,
    {
        let mut tree = Self::new(dimension);
        for vector in vectors {
            tree.insert(vector)?;
        }
        Ok(tree)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[inline]
    pub fn root(&self) -> Option<&KdNode> {
        self.root.as_deref()
    }

    /// Inserts a vector below the leaf its coordinates select. An empty tree
    /// makes it the root at depth 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the vector does not have the
    /// tree's dimension.
    pub fn insert(&mut self, vector: Arc<Vector>) -> Result<()> {
        if vector.dimension() != self.dimension || self.dimension == 0 {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: vector.dimension(),
            });
        }

        let mut depth = 0;
        let mut slot = &mut self.root;
        while let Some(node) = slot {
            let k = node.split;
            slot = if vector[k] <= node.vector[k] {
                &mut node.left
            } else {
                &mut node.right
            };
            depth += 1;
        }

        *slot = Some(Box::new(KdNode::new(vector, depth, self.dimension)));
        self.len += 1;
        Ok(())
    }

    /// Walks the tree for `query`, calling `visitor` on every node reached.
    ///
    /// Near children are always descended; far children only when their
    /// splitting hyperplane is within `radius` of the query. Traversal of an
    /// empty tree is a no-op.
    pub fn traverse<F>(&self, query: &[f64], radius: f64, mut visitor: F)
    where
        F: FnMut(&KdNode),
    {
        let mut stack: Vec<&KdNode> = self.root().into_iter().collect();
        while let Some(node) = stack.pop() {
            visitor(node);
            let (near, far) = node.branches(query, radius);
            // Near side is pushed last so it is visited first.
            stack.extend(far);
            stack.extend(near);
        }
    }

    /// Iterates over every vector in pre-order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: self.root().into_iter().collect(),
        }
    }

    /// Height of the tree (0 when empty).
    pub fn height(&self) -> usize {
        self.iter_nodes().map(|n| n.depth + 1).max().unwrap_or(0)
    }

    fn iter_nodes(&self) -> impl Iterator<Item = &KdNode> {
        let mut stack: Vec<&KdNode> = self.root().into_iter().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.right());
            stack.extend(node.left());
            Some(node)
        })
    }
}

impl Drop for KdTree {
    fn drop(&mut self) {
        let mut stack: Vec<Box<KdNode>> = self.root.take().into_iter().collect();
        while let Some(mut node) = stack.pop() {
            stack.extend(node.left.take());
            stack.extend(node.right.take());
        }
    }
}

/// Pre-order iterator over the vectors of a [`KdTree`].
pub struct Iter<'a> {
    stack: Vec<&'a KdNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Arc<Vector>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.right());
        self.stack.extend(node.left());
        Some(&node.vector)
    }
}

impl<'a> IntoIterator for &'a KdTree {
    type Item = &'a Arc<Vector>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn vector(id: &str, data: &[f64]) -> Arc<Vector> {
        Arc::new(Vector::new(id, data.to_vec(), 0, 0))
    }

    /// Checks the split invariant for every node against every descendant.
    pub(crate) fn assert_split_invariant(tree: &KdTree) {
        fn subtree(node: Option<&KdNode>, out: &mut Vec<Arc<Vector>>) {
            let mut stack: Vec<&KdNode> = node.into_iter().collect();
            while let Some(n) = stack.pop() {
                out.push(Arc::clone(n.vector()));
                stack.extend(n.left());
                stack.extend(n.right());
            }
        }

        for node in tree.iter_nodes() {
            let k = node.split_dimension();
            assert_eq!(k, node.depth() % tree.dimension());

            let mut left = Vec::new();
            subtree(node.left(), &mut left);
            for v in left {
                assert!(v[k] <= node.vector()[k], "left child violates split");
            }

            let mut right = Vec::new();
            subtree(node.right(), &mut right);
            for v in right {
                assert!(v[k] > node.vector()[k], "right child violates split");
            }
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::new(3);
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.height(), 0);

        let mut visited = 0;
        tree.traverse(&[0.0, 0.0, 0.0], f64::INFINITY, |_| visited += 1);
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_first_insert_becomes_root() {
        let mut tree = KdTree::new(2);
        tree.insert(vector("a", &[5.0, 5.0])).unwrap();

        let root = tree.root().unwrap();
        assert_eq!(root.vector().id(), "a");
        assert_eq!(root.depth(), 0);
        assert_eq!(root.split_dimension(), 0);
    }

    #[test]
    fn test_ties_go_left() {
        let mut tree = KdTree::new(2);
        tree.insert(vector("root", &[5.0, 5.0])).unwrap();
        tree.insert(vector("tie", &[5.0, 9.0])).unwrap();
        tree.insert(vector("greater", &[6.0, 0.0])).unwrap();

        let root = tree.root().unwrap();
        assert_eq!(root.left().unwrap().vector().id(), "tie");
        assert_eq!(root.right().unwrap().vector().id(), "greater");
        assert_eq!(root.left().unwrap().split_dimension(), 1);
    }

    #[test]
    fn test_split_dimension_cycles() {
        let mut tree = KdTree::new(2);
        for (i, x) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            tree.insert(vector(&i.to_string(), &[*x, *x])).unwrap();
        }
        // Sorted insertion builds a right-leaning chain.
        assert_eq!(tree.height(), 4);
        let depths: Vec<usize> = tree.iter_nodes().map(|n| n.split_dimension()).collect();
        assert_eq!(depths, vec![0, 1, 0, 1]);
        assert_split_invariant(&tree);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut tree = KdTree::new(3);
        let result = tree.insert(vector("a", &[1.0, 2.0]));
        assert!(matches!(result, Err(Error::DimensionMismatch { expected: 3, got: 2 })));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_traverse_prunes_far_side() {
        let mut tree = KdTree::new(1);
        tree.insert(vector("root", &[0.0])).unwrap();
        tree.insert(vector("left", &[-10.0])).unwrap();
        tree.insert(vector("right", &[10.0])).unwrap();

        let mut seen = Vec::new();
        tree.traverse(&[5.0], 1.0, |n| seen.push(n.vector().id().to_string()));
        assert_eq!(seen, vec!["root", "right"]);

        // Hyperplane at distance 5 is within a radius of 5.
        let mut seen = Vec::new();
        tree.traverse(&[5.0], 5.0, |n| seen.push(n.vector().id().to_string()));
        assert_eq!(seen, vec!["root", "right", "left"]);
    }

    #[test]
    fn test_branches() {
        let mut tree = KdTree::new(2);
        tree.insert(vector("root", &[0.0, 0.0])).unwrap();
        tree.insert(vector("l", &[-1.0, 0.0])).unwrap();
        tree.insert(vector("r", &[1.0, 0.0])).unwrap();
        let root = tree.root().unwrap();

        let (near, far) = root.branches(&[-0.5, 0.0], 0.1);
        assert_eq!(near.unwrap().vector().id(), "l");
        assert!(far.is_none());

        let (near, far) = root.branches(&[0.05, 0.0], 0.1);
        assert_eq!(near.unwrap().vector().id(), "r");
        assert_eq!(far.unwrap().vector().id(), "l");
    }

    #[test]
    fn test_build_and_iter() {
        let vectors = vec![
            vector("a", &[0.0, 0.0]),
            vector("b", &[1.0, 0.0]),
            vector("c", &[10.0, 10.0]),
            vector("d", &[-3.0, 7.0]),
        ];
        let tree = KdTree::build(2, vectors).unwrap();
        assert_eq!(tree.len(), 4);

        let mut ids: Vec<&str> = tree.iter().map(|v| v.id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_split_invariant(&tree);
    }

    #[test]
    fn test_deep_chain_drops_without_recursion() {
        let mut tree = KdTree::new(1);
        for i in 0..5_000 {
            tree.insert(vector(&i.to_string(), &[i as f64])).unwrap();
        }
        assert_eq!(tree.height(), 5_000);
        drop(tree);
    }
}
