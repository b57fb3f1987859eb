//! Internal validity indices of a labeling, used to compare runs that have no likelihood.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    Feature,
    utils::{distance, pairwise_distances},
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidityScores {
    /// Mean silhouette coefficient in `[-1, 1]`, higher is better.
    pub silhouette: f64,
    /// Davies-Bouldin index, lower is better.
    pub davies_bouldin: f64,
    /// Dunn index, higher is better.
    pub dunn: f64,
}

impl ValidityScores {
    /// Score `assignment` over `samples`, ignoring noise.
    ///
    /// Returns `None` unless there are at least two non-empty clusters.
    #[must_use]
    #[inline]
    pub fn compute(samples: ArrayView2<Feature>, assignment: &[Option<usize>]) -> Option<Self> {
        if group(assignment).len() < 2 {
            return None;
        }
        Self::with_distances(samples, &pairwise_distances(samples), assignment)
    }

    /// Like [`ValidityScores::compute`], reusing the `samples`' pairwise distances, so that many
    /// labelings of the same voters share a single distance matrix.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn with_distances(
        samples: ArrayView2<Feature>,
        distances: &Array2<Feature>,
        assignment: &[Option<usize>],
    ) -> Option<Self> {
        let members = group(assignment);
        if members.len() < 2 {
            return None;
        }

        Some(Self {
            silhouette: silhouette(distances, &members),
            davies_bouldin: davies_bouldin(samples, &members),
            dunn: dunn(distances, &members),
        })
    }
}

/// Members of every non-empty cluster, in label order.
fn group(assignment: &[Option<usize>]) -> Vec<Vec<usize>> {
    let k = assignment.iter().flatten().max().map_or(0, |m| m + 1);
    let mut members = vec![Vec::new(); k];
    for (i, label) in assignment.iter().enumerate() {
        if let Some(label) = label {
            members[*label].push(i);
        }
    }
    members.retain(|m| !m.is_empty());
    members
}

#[allow(clippy::cast_precision_loss)]
fn mean_distance(distances: &Array2<Feature>, from: usize, to: &[usize]) -> Feature {
    to.iter().map(|&j| distances[[from, j]]).sum::<Feature>() / to.len() as Feature
}

/// Points in singleton clusters score 0.
fn silhouette(distances: &Array2<Feature>, members: &[Vec<usize>]) -> Feature {
    let mut total = 0.0;
    let mut count = 0usize;
    for (c, cluster) in members.iter().enumerate() {
        for &i in cluster {
            count += 1;
            if cluster.len() == 1 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let a = mean_distance(distances, i, cluster) * cluster.len() as Feature
                / (cluster.len() - 1) as Feature;
            let b = members
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != c)
                .map(|(_, other)| mean_distance(distances, i, other))
                .fold(Feature::INFINITY, Feature::min);
            let scale = a.max(b);
            if scale > 0.0 {
                total += (b - a) / scale;
            }
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = total / count as Feature;
    mean
}

fn davies_bouldin(samples: ArrayView2<Feature>, members: &[Vec<usize>]) -> Feature {
    let centroids = members
        .iter()
        .map(|cluster| {
            samples
                .select(Axis(0), cluster)
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(samples.ncols()))
        })
        .collect::<Vec<_>>();
    let scatter = members
        .iter()
        .zip(&centroids)
        .map(|(cluster, centroid)| {
            #[allow(clippy::cast_precision_loss)]
            let mean = cluster
                .iter()
                .map(|&i| distance(samples.row(i), centroid.view()))
                .sum::<Feature>()
                / cluster.len() as Feature;
            mean
        })
        .collect::<Vec<_>>();

    let k = members.len();
    let worst = (0..k).map(|c| {
        (0..k)
            .filter(|&o| o != c)
            .map(|o| {
                let separation = distance(centroids[c].view(), centroids[o].view());
                if separation > 0.0 {
                    (scatter[c] + scatter[o]) / separation
                } else {
                    Feature::INFINITY
                }
            })
            .fold(0.0, Feature::max)
    });
    #[allow(clippy::cast_precision_loss)]
    let mean = worst.sum::<Feature>() / k as Feature;
    mean
}

/// Smallest distance between points of different clusters over the largest cluster diameter.
fn dunn(distances: &Array2<Feature>, members: &[Vec<usize>]) -> Feature {
    let mut separation = Feature::INFINITY;
    let mut diameter: Feature = 0.0;
    for (c, cluster) in members.iter().enumerate() {
        for &i in cluster {
            for &j in cluster {
                diameter = diameter.max(distances[[i, j]]);
            }
            for other in &members[c + 1..] {
                for &j in other {
                    separation = separation.min(distances[[i, j]]);
                }
            }
        }
    }
    if diameter > 0.0 {
        separation / diameter
    } else {
        Feature::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::tests::three_blobs;
    use ndarray::arr2;
    use pretty_assertions::assert_eq;

    fn blob_labels() -> Vec<Option<usize>> {
        [[Some(0); 5], [Some(1); 5], [Some(2); 5]].concat()
    }

    #[test]
    fn test_separated_blobs_score_well() {
        let data = three_blobs();

        let scores = ValidityScores::compute(data.view(), &blob_labels()).unwrap();

        assert!(scores.silhouette > 0.95, "{scores:?}");
        assert!(scores.davies_bouldin < 0.1, "{scores:?}");
        assert!(scores.dunn > 10.0, "{scores:?}");
    }

    #[test]
    fn test_bad_labeling_scores_worse() {
        let data = three_blobs();
        let shuffled = (0..15).map(|i| Some(i % 3)).collect::<Vec<_>>();

        let good = ValidityScores::compute(data.view(), &blob_labels()).unwrap();
        let bad = ValidityScores::compute(data.view(), &shuffled).unwrap();

        assert!(bad.silhouette < good.silhouette);
        assert!(bad.davies_bouldin > good.davies_bouldin);
        assert!(bad.dunn < good.dunn);
    }

    #[test]
    fn test_needs_two_clusters() {
        let data = three_blobs();

        assert_eq!(ValidityScores::compute(data.view(), &[Some(0); 15]), None);
        assert_eq!(ValidityScores::compute(data.view(), &[None; 15]), None);
    }

    #[test]
    fn test_shared_distances_give_the_same_scores() {
        let data = three_blobs();
        let distances = pairwise_distances(data.view());
        let shuffled = (0..15).map(|i| Some(i % 3)).collect::<Vec<_>>();

        for assignment in [blob_labels(), shuffled] {
            assert_eq!(
                ValidityScores::with_distances(data.view(), &distances, &assignment),
                ValidityScores::compute(data.view(), &assignment)
            );
        }
    }

    #[test]
    fn test_noise_is_ignored() {
        let samples = arr2(&[[0.0], [0.0], [100.0], [10.0], [10.0]]);
        let assignment = [Some(0), Some(0), None, Some(1), Some(1)];

        let scores = ValidityScores::compute(samples.view(), &assignment).unwrap();

        assert!((scores.silhouette - 1.0).abs() < 1e-12);
        assert_eq!(scores.davies_bouldin, 0.0);
        assert_eq!(scores.dunn, Feature::INFINITY);
    }
}
