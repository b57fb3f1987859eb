//! Spectral clustering on an RBF similarity graph.

use linfa_linalg::eigh::{EigSort, Eigh};
use log::debug;
use ndarray::{Array2, ArrayView2, Axis, s};
use rand::Rng;

use super::{
    RunOptions,
    kmeans::{KMeansFit, KMeansInit, kmeans},
};
use crate::{
    Feature,
    errors::{ClusteringError, ClusteringResult},
    utils::squared_distance,
};

/// Embed `samples` with the `k` lowest eigenvectors of the symmetric normalized laplacian of the
/// graph `w_ij = exp(-gamma * ||x_i - x_j||²)`, then run k-means++ on the normalized embedding.
///
/// The returned fit's labels refer to the samples, its centroids and inertia to the embedding.
///
/// # Errors
///
/// Returns an error if `gamma` is not positive, if `k` is out of range, or if the
/// eigendecomposition fails.
#[allow(clippy::missing_inline_in_public_items)]
pub fn spectral<R: Rng>(
    samples: ArrayView2<Feature>,
    k: usize,
    gamma: Feature,
    options: &RunOptions,
    rng: &mut R,
) -> ClusteringResult<KMeansFit> {
    let n = samples.nrows();
    if !(gamma.is_finite() && gamma > 0.0) {
        return Err(ClusteringError::InvalidInput(format!(
            "spectral gamma must be positive, got {gamma}"
        )));
    }
    if k == 0 || k > n {
        return Err(ClusteringError::InvalidK { k, n });
    }

    let laplacian = normalized_laplacian(&affinity(samples, gamma));
    let (eigenvalues, eigenvectors) = laplacian.eigh()?.sort_eig_asc();
    debug!(
        "spectral embedding uses eigenvalues {:?}",
        eigenvalues.slice(s![..k]).to_vec()
    );

    let mut embedding = eigenvectors.slice(s![.., ..k]).to_owned();
    for mut row in embedding.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }

    kmeans(embedding.view(), k, &KMeansInit::PlusPlus, options, rng)
}

/// RBF similarity matrix with a zero diagonal.
fn affinity(samples: ArrayView2<Feature>, gamma: Feature) -> Array2<Feature> {
    let n = samples.nrows();
    let mut weights = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let w = (-gamma * squared_distance(samples.row(i), samples.row(j))).exp();
            weights[[i, j]] = w;
            weights[[j, i]] = w;
        }
    }
    weights
}

/// `I - D^-1/2 W D^-1/2`, isolated vertices are given a degree of 1.
fn normalized_laplacian(weights: &Array2<Feature>) -> Array2<Feature> {
    let inv_sqrt_degree = weights
        .sum_axis(Axis(1))
        .mapv(|d| if d > 0.0 { d.sqrt().recip() } else { 1.0 });

    let n = weights.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        let identity = if i == j { 1.0 } else { 0.0 };
        identity - inv_sqrt_degree[i] * weights[[i, j]] * inv_sqrt_degree[j]
    })
}
