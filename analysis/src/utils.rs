use linfa_nn::distance::{Distance, L2Dist};
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::Feature;

#[must_use]
#[inline]
pub fn squared_distance(a: ArrayView1<Feature>, b: ArrayView1<Feature>) -> Feature {
    // `rdistance` is the reduced (squared) form of the L2 distance
    L2Dist.rdistance(a, b)
}

#[must_use]
#[inline]
pub fn distance(a: ArrayView1<Feature>, b: ArrayView1<Feature>) -> Feature {
    L2Dist.distance(a, b)
}

/// Dense, symmetric matrix of euclidean distances between every pair of rows.
#[must_use]
#[allow(clippy::missing_inline_in_public_items)]
pub fn pairwise_distances(samples: ArrayView2<Feature>) -> Array2<Feature> {
    let n = samples.nrows();
    let mut distances = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distance(samples.row(i), samples.row(j));
            distances[[i, j]] = d;
            distances[[j, i]] = d;
        }
    }
    distances
}

/// Disjoint sets with union by size and path compression.
#[derive(Clone, Debug)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub(crate) fn size_of_root(&self, root: usize) -> usize {
        self.size[root]
    }

    /// Merge the sets rooted at `a` and `b`, returning the new root.
    pub(crate) fn union_roots(&mut self, a: usize, b: usize) -> usize {
        if a == b {
            return a;
        }
        let (big, small) = if self.size[a] >= self.size[b] {
            (a, b)
        } else {
            (b, a)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        big
    }
}

/// Minimum spanning tree of the complete graph on `n` vertices (Prim, O(n²)).
///
/// Returns `(u, v, weight)` edges in the order vertices joined the tree.
pub(crate) fn prim_mst(
    n: usize,
    weight: impl Fn(usize, usize) -> Feature,
) -> Vec<(usize, usize, Feature)> {
    if n <= 1 {
        return Vec::new();
    }

    let mut in_tree = vec![false; n];
    let mut best = vec![Feature::INFINITY; n];
    let mut via = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for v in 0..n {
            if in_tree[v] {
                continue;
            }
            let w = weight(current, v);
            if w < best[v] {
                best[v] = w;
                via[v] = current;
            }
        }

        let Some(next) = (0..n)
            .filter(|&v| !in_tree[v])
            .min_by(|&a, &b| best[a].total_cmp(&best[b]))
        else {
            break;
        };
        in_tree[next] = true;
        edges.push((via[next], next, best[next]));
        current = next;
    }

    edges
}
