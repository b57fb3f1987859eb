//! Density-based clustering: DBSCAN (through linfa) and HDBSCAN.
//!
//! Both discover the number of clusters themselves, and leave the voters that do not belong to
//! a dense enough region unassigned (`None`).

use std::collections::VecDeque;

use linfa::traits::Transformer;
use linfa_clustering::Dbscan;
use log::debug;
use ndarray::{Array2, ArrayView2};

use crate::{
    Feature,
    errors::{ClusteringError, ClusteringResult},
    utils::{UnionFind, pairwise_distances, prim_mst},
};

/// Merge distances are clamped to this before being inverted into densities.
const MIN_DISTANCE: Feature = 1e-12;

/// DBSCAN with neighborhood radius `eps`, a voter is a core point when at least `min_points`
/// voters (itself included) are within `eps` of it.
///
/// # Errors
///
/// Returns [`ClusteringError::InvalidInput`] if `eps` is not positive or `min_points < 2`.
#[allow(clippy::missing_inline_in_public_items)]
pub fn dbscan(
    samples: ArrayView2<Feature>,
    eps: Feature,
    min_points: usize,
) -> ClusteringResult<Vec<Option<usize>>> {
    if !(eps.is_finite() && eps > 0.0) {
        return Err(ClusteringError::InvalidInput(format!(
            "DBSCAN eps must be positive, got {eps}"
        )));
    }
    if min_points < 2 {
        return Err(ClusteringError::InvalidInput(format!(
            "DBSCAN min_points must be at least 2, got {min_points}"
        )));
    }

    let labels = Dbscan::params(min_points)
        .tolerance(eps)
        .transform(&samples)?
        .to_vec();

    debug!(
        "DBSCAN found {} clusters and {} noise points",
        labels.iter().flatten().max().map_or(0, |m| m + 1),
        labels.iter().filter(|l| l.is_none()).count()
    );
    Ok(labels)
}

/// HDBSCAN with core distances taken to the `min_points`-th nearest voter (itself included), and clusters
/// of fewer than `min_cluster_size` voters treated as points falling out of their parent.
///
/// Clusters are chosen from the condensed tree by excess of mass. The root (everything in one
/// cluster) is only a candidate when `allow_single_cluster` is set. When it is chosen, a voter
/// that falls straight out of the root only belongs to it if it falls out at the root's highest
/// density, anything that left earlier is noise. Labels are numbered by first appearance in
/// voter order.
///
/// # Errors
///
/// Returns [`ClusteringError::InvalidInput`] if `min_points` is 0 or `min_cluster_size < 2`.
#[allow(clippy::missing_inline_in_public_items)]
pub fn hdbscan(
    samples: ArrayView2<Feature>,
    min_points: usize,
    min_cluster_size: usize,
    allow_single_cluster: bool,
) -> ClusteringResult<Vec<Option<usize>>> {
    if min_points == 0 {
        return Err(ClusteringError::InvalidInput(
            "HDBSCAN min_points must be at least 1".into(),
        ));
    }
    if min_cluster_size < 2 {
        return Err(ClusteringError::InvalidInput(format!(
            "HDBSCAN min_cluster_size must be at least 2, got {min_cluster_size}"
        )));
    }

    let n = samples.nrows();
    if n < 2 {
        return Ok(vec![None; n]);
    }

    let distances = pairwise_distances(samples);
    let core = core_distances(&distances, min_points);

    let mut mst = prim_mst(n, |i, j| {
        distances[[i, j]].max(core[i]).max(core[j])
    });
    mst.sort_by(|a, b| a.2.total_cmp(&b.2));

    let hierarchy = single_linkage(&mst, n);
    let tree = CondensedTree::new(&hierarchy, n, min_cluster_size);
    let selected = tree.select(allow_single_cluster);
    let labels = tree.label(&selected);

    debug!(
        "HDBSCAN selected {} of {} condensed clusters, {} noise points",
        selected.iter().filter(|s| **s).count(),
        selected.len(),
        labels.iter().filter(|l| l.is_none()).count()
    );
    Ok(labels)
}

/// Distance from every point to its `min_points`-th nearest point, counting the point itself.
/// The rank among the other points is clamped to `1..=n - 1`.
fn core_distances(distances: &Array2<Feature>, min_points: usize) -> Vec<Feature> {
    let n = distances.nrows();
    let rank = min_points.saturating_sub(1).max(1).min(n - 1);
    distances
        .outer_iter()
        .enumerate()
        .map(|(i, row)| {
            let mut others = row
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, d)| *d)
                .collect::<Vec<_>>();
            others.sort_by(Feature::total_cmp);
            others[rank - 1]
        })
        .collect()
}

/// One merge of the single-linkage dendrogram. Nodes `< n` are points, node `n + i` is the
/// result of merge `i`.
#[derive(Clone, Copy, Debug)]
struct Merge {
    left: usize,
    right: usize,
    distance: Feature,
    size: usize,
}

fn single_linkage(mst: &[(usize, usize, Feature)], n: usize) -> Vec<Merge> {
    let mut sets = UnionFind::new(n);
    let mut node_of: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(n - 1);

    for &(u, v, distance) in mst {
        let (ru, rv) = (sets.find(u), sets.find(v));
        if ru == rv {
            continue;
        }
        let size = sets.size_of_root(ru) + sets.size_of_root(rv);
        merges.push(Merge {
            left: node_of[ru],
            right: node_of[rv],
            distance,
            size,
        });
        let root = sets.union_roots(ru, rv);
        node_of[root] = n + merges.len() - 1;
    }

    merges
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Child {
    Point(usize),
    Cluster(usize),
}

/// `child` left `parent` at density `lambda` (the inverse of the merge distance).
#[derive(Clone, Copy, Debug)]
struct CondensedEdge {
    parent: usize,
    child: Child,
    lambda: Feature,
    size: usize,
}

/// The dendrogram with every split that sheds fewer than `min_cluster_size` points recorded as
/// those points falling out. Cluster 0 is the root, children always have larger ids than their
/// parent.
struct CondensedTree {
    edges: Vec<CondensedEdge>,
    n_points: usize,
    n_clusters: usize,
}

impl CondensedTree {
    fn new(hierarchy: &[Merge], n: usize, min_cluster_size: usize) -> Self {
        let size_of = |node: usize| if node < n { 1 } else { hierarchy[node - n].size };

        let mut edges = Vec::new();
        let mut cluster_of_node = vec![usize::MAX; n + hierarchy.len()];
        let mut next_cluster = 1;

        let Some(root) = hierarchy.len().checked_sub(1).map(|last| n + last) else {
            return Self {
                edges,
                n_points: n,
                n_clusters: 1,
            };
        };
        cluster_of_node[root] = 0;

        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            if node < n {
                continue;
            }
            let merge = hierarchy[node - n];
            let parent = cluster_of_node[node];
            let lambda = merge.distance.max(MIN_DISTANCE).recip();

            let left_big = size_of(merge.left) >= min_cluster_size;
            let right_big = size_of(merge.right) >= min_cluster_size;

            let fall_out = |node: usize, edges: &mut Vec<CondensedEdge>| {
                for point in leaves(hierarchy, n, node) {
                    edges.push(CondensedEdge {
                        parent,
                        child: Child::Point(point),
                        lambda,
                        size: 1,
                    });
                }
            };

            match (left_big, right_big) {
                (true, true) => {
                    for child in [merge.left, merge.right] {
                        cluster_of_node[child] = next_cluster;
                        edges.push(CondensedEdge {
                            parent,
                            child: Child::Cluster(next_cluster),
                            lambda,
                            size: size_of(child),
                        });
                        next_cluster += 1;
                        queue.push_back(child);
                    }
                }
                (true, false) => {
                    cluster_of_node[merge.left] = parent;
                    queue.push_back(merge.left);
                    fall_out(merge.right, &mut edges);
                }
                (false, true) => {
                    cluster_of_node[merge.right] = parent;
                    queue.push_back(merge.right);
                    fall_out(merge.left, &mut edges);
                }
                (false, false) => {
                    fall_out(merge.left, &mut edges);
                    fall_out(merge.right, &mut edges);
                }
            }
        }

        Self {
            edges,
            n_points: n,
            n_clusters: next_cluster,
        }
    }

    fn parents(&self) -> Vec<Option<usize>> {
        let mut parents = vec![None; self.n_clusters];
        for edge in &self.edges {
            if let Child::Cluster(child) = edge.child {
                parents[child] = Some(edge.parent);
            }
        }
        parents
    }

    /// `sum over children of (lambda_child - lambda_birth) * child_size`.
    fn stabilities(&self) -> Vec<Feature> {
        let mut birth = vec![0.0; self.n_clusters];
        for edge in &self.edges {
            if let Child::Cluster(child) = edge.child {
                birth[child] = edge.lambda;
            }
        }

        let mut stability = vec![0.0; self.n_clusters];
        for edge in &self.edges {
            #[allow(clippy::cast_precision_loss)]
            let size = edge.size as Feature;
            stability[edge.parent] += (edge.lambda - birth[edge.parent]) * size;
        }
        stability
    }

    /// Excess-of-mass selection, bottom up.
    fn select(&self, allow_single_cluster: bool) -> Vec<bool> {
        let stability = self.stabilities();
        let mut children = vec![Vec::new(); self.n_clusters];
        for edge in &self.edges {
            if let Child::Cluster(child) = edge.child {
                children[edge.parent].push(child);
            }
        }

        let mut selected = vec![false; self.n_clusters];
        let mut subtree = stability.clone();
        for cluster in (0..self.n_clusters).rev() {
            if cluster == 0 && !allow_single_cluster {
                break;
            }
            if children[cluster].is_empty() {
                selected[cluster] = true;
                continue;
            }

            let below: Feature = children[cluster].iter().map(|&c| subtree[c]).sum();
            if stability[cluster] >= below {
                selected[cluster] = true;
                let mut stack = children[cluster].clone();
                while let Some(descendant) = stack.pop() {
                    selected[descendant] = false;
                    stack.extend_from_slice(&children[descendant]);
                }
            } else {
                subtree[cluster] = below;
            }
        }
        selected
    }

    /// Every point goes to its closest selected ancestor, or is noise if there is none. A selected
    /// root only keeps the points that fall out of it at its highest lambda.
    fn label(&self, selected: &[bool]) -> Vec<Option<usize>> {
        let parents = self.parents();
        let root_threshold = self
            .edges
            .iter()
            .filter(|edge| edge.parent == 0)
            .map(|edge| edge.lambda)
            .fold(0.0, Feature::max);

        let mut cluster_of_point = vec![None; self.n_points];
        for edge in &self.edges {
            let Child::Point(point) = edge.child else {
                continue;
            };
            // straight out of a selected root: only the densest fall-outs are members
            if edge.parent == 0 && selected[0] {
                if edge.lambda >= root_threshold {
                    cluster_of_point[point] = Some(0);
                }
                continue;
            }
            let mut cluster = Some(edge.parent);
            while let Some(c) = cluster {
                if selected[c] {
                    break;
                }
                cluster = parents[c];
            }
            cluster_of_point[point] = cluster;
        }

        let mut names: Vec<usize> = Vec::new();
        cluster_of_point
            .into_iter()
            .map(|cluster| {
                cluster.map(|c| {
                    names.iter().position(|&name| name == c).unwrap_or_else(|| {
                        names.push(c);
                        names.len() - 1
                    })
                })
            })
            .collect()
    }
}

/// The points under a dendrogram node.
fn leaves(hierarchy: &[Merge], n: usize, node: usize) -> Vec<usize> {
    let mut points = Vec::new();
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if node < n {
            points.push(node);
        } else {
            let merge = hierarchy[node - n];
            stack.push(merge.left);
            stack.push(merge.right);
        }
    }
    points
}
