//! Hierarchical agglomerative clustering with Lance-Williams distance updates.

use log::trace;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::{
    Feature,
    errors::{ClusteringError, ClusteringResult},
    utils::pairwise_distances,
};

/// How the distance between two clusters is derived from the distances between their members.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Linkage {
    /// Merge the pair that least increases the total within-cluster variance.
    #[default]
    Ward,
    /// Closest pair of members.
    Single,
    /// Farthest pair of members.
    Complete,
    /// Mean over all pairs of members.
    Average,
}

impl Linkage {
    /// Distance from cluster `k` to the union of clusters `i` and `j`.
    fn update(
        self,
        d_ki: Feature,
        d_kj: Feature,
        d_ij: Feature,
        n_i: f64,
        n_j: f64,
        n_k: f64,
    ) -> Feature {
        match self {
            Self::Ward => {
                ((n_i + n_k) * d_ki + (n_j + n_k) * d_kj - n_k * d_ij) / (n_i + n_j + n_k)
            }
            Self::Single => d_ki.min(d_kj),
            Self::Complete => d_ki.max(d_kj),
            Self::Average => (n_i * d_ki + n_j * d_kj) / (n_i + n_j),
        }
    }
}

/// Merge the closest pair of clusters until `k` remain.
///
/// Ward linkage operates on squared euclidean distances, the others on plain euclidean distances.
/// Ties go to the pair with the lowest indices, and the returned labels are numbered by first
/// appearance in sample order, so the result is fully deterministic.
///
/// # Errors
///
/// Returns [`ClusteringError::InvalidK`] if `k` is zero or larger than the number of samples.
#[allow(clippy::missing_inline_in_public_items)]
pub fn agglomerative(
    samples: ArrayView2<Feature>,
    k: usize,
    linkage: Linkage,
) -> ClusteringResult<Array1<usize>> {
    let n = samples.nrows();
    if k == 0 || k > n {
        return Err(ClusteringError::InvalidK { k, n });
    }

    let mut distances = pairwise_distances(samples);
    if linkage == Linkage::Ward {
        distances.mapv_inplace(|d| d * d);
    }

    let mut active = vec![true; n];
    let mut sizes = vec![1usize; n];
    // every sample starts in the cluster named after itself
    let mut membership: Vec<usize> = (0..n).collect();
    let mut nearest = (0..n)
        .map(|i| nearest_after(&distances, &active, i))
        .collect::<Vec<_>>();

    for _ in 0..(n - k) {
        let Some((i, j)) = closest_pair(&nearest) else {
            break;
        };
        trace!("merging clusters {i} and {j} at {}", distances[[i, j]]);

        #[allow(clippy::cast_precision_loss)]
        let (n_i, n_j) = (sizes[i] as f64, sizes[j] as f64);
        let d_ij = distances[[i, j]];
        for other in (0..n).filter(|&o| active[o] && o != i && o != j) {
            #[allow(clippy::cast_precision_loss)]
            let n_k = sizes[other] as f64;
            let d = linkage.update(
                distances[[other, i]],
                distances[[other, j]],
                d_ij,
                n_i,
                n_j,
                n_k,
            );
            distances[[other, i]] = d;
            distances[[i, other]] = d;
        }

        active[j] = false;
        sizes[i] += sizes[j];
        for m in &mut membership {
            if *m == j {
                *m = i;
            }
        }

        nearest[j] = None;
        nearest[i] = nearest_after(&distances, &active, i);
        for a in (0..n).filter(|&a| active[a] && a != i) {
            match nearest[a] {
                Some((b, _)) if b == i || b == j => {
                    nearest[a] = nearest_after(&distances, &active, a);
                }
                Some((b, d)) if a < i => {
                    let d_ai = distances[[a, i]];
                    if d_ai < d || (d_ai <= d && i < b) {
                        nearest[a] = Some((i, d_ai));
                    }
                }
                _ => {}
            }
        }
    }

    Ok(relabel_by_first_appearance(&membership))
}

/// The closest active cluster with a higher index than `i`, the lowest such index on ties.
fn nearest_after(
    distances: &Array2<Feature>,
    active: &[bool],
    i: usize,
) -> Option<(usize, Feature)> {
    let mut best: Option<(usize, Feature)> = None;
    for j in ((i + 1)..active.len()).filter(|&j| active[j]) {
        let d = distances[[i, j]];
        if best.is_none_or(|(_, b)| d < b) {
            best = Some((j, d));
        }
    }
    best
}

/// The pair `(i, j)`, `i < j`, at the smallest distance, read off the nearest neighbor cache.
fn closest_pair(nearest: &[Option<(usize, Feature)>]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, Feature)> = None;
    for (i, entry) in nearest.iter().enumerate() {
        if let Some((j, d)) = *entry {
            if best.is_none_or(|(_, _, b)| d < b) {
                best = Some((i, j, d));
            }
        }
    }
    best.map(|(i, j, _)| (i, j))
}

fn relabel_by_first_appearance(membership: &[usize]) -> Array1<usize> {
    let mut names: Vec<usize> = Vec::new();
    membership
        .iter()
        .map(|m| {
            names.iter().position(|n| n == m).unwrap_or_else(|| {
                names.push(*m);
                names.len() - 1
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::tests::three_blobs;
    use ndarray::arr2;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    fn test_every_linkage_recovers_blobs(
        #[values(Linkage::Ward, Linkage::Single, Linkage::Complete, Linkage::Average)]
        linkage: Linkage,
    ) {
        let data = three_blobs();

        let labels = agglomerative(data.view(), 3, linkage).unwrap();

        assert_eq!(labels.to_vec(), [[0; 5], [1; 5], [2; 5]].concat());
    }

    #[test]
    fn test_deterministic() {
        let data = three_blobs();
        for linkage in Linkage::iter() {
            assert_eq!(
                agglomerative(data.view(), 4, linkage).unwrap(),
                agglomerative(data.view(), 4, linkage).unwrap()
            );
        }
    }

    #[test]
    fn test_k_equal_n_keeps_every_sample_apart() {
        let samples = arr2(&[[0.0], [1.0], [5.0]]);

        let labels = agglomerative(samples.view(), 3, Linkage::Single).unwrap();

        assert_eq!(labels.to_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn test_ties_merge_lowest_indices_first() {
        // 0-1 and 1-2 are equally close, the (0, 1) pair goes first
        let samples = arr2(&[[0.0], [1.0], [2.0], [10.0]]);

        let labels = agglomerative(samples.view(), 3, Linkage::Single).unwrap();

        assert_eq!(labels.to_vec(), vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_single_vs_complete_chaining() {
        // a chain of unit steps with a slightly longer last link
        let samples = arr2(&[[0.0], [1.0], [2.0], [3.0], [4.0], [5.2]]);

        let single = agglomerative(samples.view(), 2, Linkage::Single).unwrap();
        assert_eq!(single.to_vec(), vec![0, 0, 0, 0, 0, 1]);

        let complete = agglomerative(samples.view(), 2, Linkage::Complete).unwrap();
        assert_eq!(complete.to_vec(), vec![0, 0, 0, 0, 1, 1]);
    }

    /// Merges by scanning every active pair, with the same tie rule.
    fn agglomerative_by_full_scan(
        samples: ArrayView2<Feature>,
        k: usize,
        linkage: Linkage,
    ) -> Vec<usize> {
        let n = samples.nrows();
        let mut distances = pairwise_distances(samples);
        if linkage == Linkage::Ward {
            distances.mapv_inplace(|d| d * d);
        }
        let mut active = vec![true; n];
        let mut sizes = vec![1usize; n];
        let mut membership: Vec<usize> = (0..n).collect();
        for _ in 0..(n - k) {
            let mut best: Option<(usize, usize, Feature)> = None;
            for i in (0..n).filter(|&i| active[i]) {
                for j in ((i + 1)..n).filter(|&j| active[j]) {
                    if best.is_none_or(|(_, _, b)| distances[[i, j]] < b) {
                        best = Some((i, j, distances[[i, j]]));
                    }
                }
            }
            let (i, j, d_ij) = best.unwrap();
            let (n_i, n_j) = (sizes[i] as f64, sizes[j] as f64);
            for other in (0..n).filter(|&o| active[o] && o != i && o != j) {
                let d = linkage.update(
                    distances[[other, i]],
                    distances[[other, j]],
                    d_ij,
                    n_i,
                    n_j,
                    sizes[other] as f64,
                );
                distances[[other, i]] = d;
                distances[[i, other]] = d;
            }
            active[j] = false;
            sizes[i] += sizes[j];
            membership.iter_mut().filter(|m| **m == j).for_each(|m| *m = i);
        }
        relabel_by_first_appearance(&membership).to_vec()
    }

    #[rstest]
    fn test_cached_merges_match_a_full_scan(
        #[values(Linkage::Ward, Linkage::Single, Linkage::Complete, Linkage::Average)]
        linkage: Linkage,
        #[values(2, 4, 7)] k: usize,
    ) {
        // uneven spacing with a few exact ties
        let samples = Array2::from_shape_fn((24, 2), |(i, j)| ((i * (3 + j * 4)) % 11) as f64);

        let labels = agglomerative(samples.view(), k, linkage).unwrap();

        assert_eq!(
            labels.to_vec(),
            agglomerative_by_full_scan(samples.view(), k, linkage)
        );
    }

    #[test]
    fn test_linkage_names() {
        assert_eq!(Linkage::default().to_string(), "ward");
        assert_eq!(Linkage::Average.to_string(), "average");
    }
}
