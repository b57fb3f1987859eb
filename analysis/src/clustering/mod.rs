//! this module contains the family of clustering algorithms that can be fit to a standardized
//! weight matrix, and the [`ClusterRun`] each fit produces.
//!
//! Algorithms that take the number of clusters as an input (k-means, agglomerative, spectral,
//! gaussian mixture) are meant to be swept over a range of `k` (see [`crate::sweep`]) so that
//! [`crate::selection`] can pick one. The density-based algorithms discover `k` themselves and
//! leave unreachable voters unassigned (noise).
//!
//! # References:
//!
//! - k-means++ [D. Arthur and S. Vassilvitskii (Stanford University, 2007)](https://theory.stanford.edu/~sergei/papers/kMeansPP-soda.pdf)
//! - Spectral clustering [A. Ng, M. Jordan, and Y. Weiss (NIPS, 2001)](https://proceedings.neurips.cc/paper/2001/file/801272ee79cfde7fa5960571fee36b9b-Paper.pdf)
//! - HDBSCAN [R. Campello, D. Moulavi, and J. Sander (PAKDD, 2013)](https://doi.org/10.1007/978-3-642-37456-2_14)

pub mod agglomerative;
pub mod density;
pub mod gmm;
pub mod kmeans;
pub mod spectral;

use log::{debug, warn};
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    errors::{ClusteringError, ClusteringResult, NonConvergenceWarning},
    matrix::StandardizedMatrix,
    sizes::ClusterSizeReport,
    validity::ValidityScores,
};

pub use agglomerative::Linkage;
pub use gmm::{CovarianceType, MixtureScores};
pub use kmeans::KMeansInit;

const fn default_gamma() -> f64 {
    1.0
}

/// The supported clustering algorithms, each carrying only the parameters it needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
    /// Lloyd's algorithm.
    #[serde(rename = "kmeans")]
    #[strum(serialize = "kmeans")]
    KMeans {
        #[serde(default)]
        init: KMeansInit,
    },
    /// Bottom-up merging of the closest clusters.
    Agglomerative {
        #[serde(default)]
        linkage: Linkage,
    },
    /// k-means on the eigenvectors of the normalized graph laplacian of an RBF similarity graph.
    Spectral {
        /// Kernel coefficient of the RBF similarity `exp(-gamma * d²)`.
        #[serde(default = "default_gamma")]
        gamma: f64,
    },
    /// Expectation-maximization of a mixture of gaussians.
    GaussianMixture {
        #[serde(default)]
        covariance: CovarianceType,
    },
    /// DBSCAN.
    DensityBased { eps: f64, min_points: usize },
    /// HDBSCAN.
    DensityBasedHierarchical {
        min_points: usize,
        min_cluster_size: usize,
        #[serde(default)]
        allow_single_cluster: bool,
    },
}

impl Default for Algorithm {
    #[inline]
    fn default() -> Self {
        Self::KMeans {
            init: KMeansInit::default(),
        }
    }
}

impl std::fmt::Display for Algorithm {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

impl Algorithm {
    /// Whether the number of clusters is an input (`true`) or discovered (`false`).
    #[must_use]
    #[inline]
    pub const fn requires_k(&self) -> bool {
        !matches!(
            self,
            Self::DensityBased { .. } | Self::DensityBasedHierarchical { .. }
        )
    }

    /// Fit this algorithm to `data`.
    ///
    /// `k` is required by the algorithms for which [`Self::requires_k`] is true, and ignored by
    /// the others.
    ///
    /// The run never fails because an iterative method ran out of iterations: the best iterate is
    /// kept and a [`NonConvergenceWarning`] is attached to the run.
    ///
    /// # Errors
    ///
    /// - [`ClusteringError::InvalidK`] if `k` is missing, zero, or larger than the number of voters,
    /// - [`ClusteringError::InvalidInput`] if the algorithm's parameters are out of range,
    /// - [`ClusteringError::Linalg`] if a decomposition fails.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn fit(
        &self,
        data: &StandardizedMatrix,
        k: Option<usize>,
        options: &RunOptions,
    ) -> ClusteringResult<ClusterRun> {
        let n = data.nrows();
        let samples = data.view();
        let mut rng = SmallRng::seed_from_u64(options.seed);

        let k = if self.requires_k() {
            match k {
                Some(k) if (1..=n).contains(&k) => k,
                other => {
                    return Err(ClusteringError::InvalidK {
                        k: other.unwrap_or(0),
                        n,
                    });
                }
            }
        } else {
            0
        };

        debug!("Fitting {self} with k={k} to {n} voters");

        let run = match self {
            Self::KMeans { init } => {
                let fit = kmeans::kmeans(samples, k, init, options, &mut rng)?;
                ClusterRun {
                    inertia: Some(fit.inertia),
                    iterations: fit.iterations,
                    warning: fit.warning(options),
                    ..ClusterRun::new(self.clone(), k, fit.labels.iter().copied().map(Some).collect())
                }
            }
            Self::Agglomerative { linkage } => {
                let labels = agglomerative::agglomerative(samples, k, *linkage)?;
                ClusterRun {
                    iterations: (n - k) as u64,
                    ..ClusterRun::new(self.clone(), k, labels.iter().copied().map(Some).collect())
                }
            }
            Self::Spectral { gamma } => {
                let fit = spectral::spectral(samples, k, *gamma, options, &mut rng)?;
                ClusterRun {
                    iterations: fit.iterations,
                    warning: fit.warning(options),
                    ..ClusterRun::new(self.clone(), k, fit.labels.iter().copied().map(Some).collect())
                }
            }
            Self::GaussianMixture { covariance } => {
                let fit = gmm::gaussian_mixture(samples, k, *covariance, options, &mut rng)?;
                ClusterRun {
                    mixture: Some(fit.scores),
                    iterations: fit.iterations,
                    warning: (!fit.converged).then_some(NonConvergenceWarning {
                        max_iterations: options.max_iterations,
                    }),
                    ..ClusterRun::new(self.clone(), k, fit.labels.iter().copied().map(Some).collect())
                }
            }
            Self::DensityBased { eps, min_points } => {
                let labels = density::dbscan(samples, *eps, *min_points)?;
                ClusterRun::discovered(self.clone(), labels)
            }
            Self::DensityBasedHierarchical {
                min_points,
                min_cluster_size,
                allow_single_cluster,
            } => {
                let labels = density::hdbscan(
                    samples,
                    *min_points,
                    *min_cluster_size,
                    *allow_single_cluster,
                )?;
                ClusterRun::discovered(self.clone(), labels)
            }
        };

        if let Some(warning) = &run.warning {
            warn!("{self} with k={}: {warning}, keeping the best iterate", run.k);
        }

        Ok(run)
    }
}

/// Knobs shared by every algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Seed for k-means++ and EM initialization.
    pub seed: u64,
    /// Iteration budget of a single fit.
    pub max_iterations: u64,
    /// Convergence threshold (largest centroid shift for k-means, change in mean
    /// log-likelihood for gaussian mixtures).
    pub tolerance: f64,
    /// Number of randomly seeded restarts, the best one is kept.
    pub n_runs: usize,
}

impl Default for RunOptions {
    #[inline]
    fn default() -> Self {
        Self {
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

/// One fit of one algorithm at one `k`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterRun {
    pub algorithm: Algorithm,
    /// The requested `k`, or the number of discovered clusters for density-based algorithms.
    pub k: usize,
    /// Cluster of each voter, by zero-based voter index. `None` is noise.
    pub assignment: Vec<Option<usize>>,
    /// Within-cluster sum of squares (k-means only).
    pub inertia: Option<f64>,
    /// Log-likelihood and information criteria (gaussian mixtures only).
    pub mixture: Option<MixtureScores>,
    pub iterations: u64,
    pub warning: Option<NonConvergenceWarning>,
    pub validity: Option<ValidityScores>,
}

impl ClusterRun {
    fn new(algorithm: Algorithm, k: usize, assignment: Vec<Option<usize>>) -> Self {
        Self {
            algorithm,
            k,
            assignment,
            inertia: None,
            mixture: None,
            iterations: 0,
            warning: None,
            validity: None,
        }
    }

    fn discovered(algorithm: Algorithm, assignment: Vec<Option<usize>>) -> Self {
        let k = assignment.iter().flatten().max().map_or(0, |max| max + 1);
        Self::new(algorithm, k, assignment)
    }

    /// Population of each cluster, noise reported separately.
    #[must_use]
    #[inline]
    pub fn sizes(&self) -> ClusterSizeReport {
        ClusterSizeReport::tally(&self.assignment, self.k)
    }

    #[must_use]
    #[inline]
    pub fn noise(&self) -> usize {
        self.assignment.iter().filter(|l| l.is_none()).count()
    }

    /// use the labels to reorganize the provided samples into clusters, noise is dropped
    #[must_use]
    #[inline]
    pub fn extract_clusters<T: Clone>(&self, samples: Vec<T>) -> Vec<Vec<T>> {
        let mut clusters = vec![Vec::new(); self.k];

        for (sample, label) in samples.into_iter().zip(self.assignment.iter()) {
            if let Some(cluster) = label.and_then(|l| clusters.get_mut(l)) {
                cluster.push(sample);
            }
        }

        clusters
    }
}
