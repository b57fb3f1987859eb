//! Gaussian mixture models fit with expectation-maximization.

use linfa_linalg::cholesky::Cholesky;
use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_stats::QuantileExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use super::{
    RunOptions,
    kmeans::{KMeansInit, kmeans},
};
use crate::{
    Feature,
    errors::{ClusteringError, ClusteringResult},
};

/// Added to the diagonal of every covariance so that it stays positive definite.
const REGULARIZATION: Feature = 1e-6;

/// The form of the per-component covariance matrices.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CovarianceType {
    /// Each component has its own general covariance matrix.
    #[default]
    Full,
    /// Each component has its own diagonal covariance matrix.
    Diagonal,
}

impl CovarianceType {
    /// Number of free parameters of a `k` component mixture over `d` features.
    #[must_use]
    #[inline]
    pub const fn n_parameters(self, k: usize, d: usize) -> usize {
        let covariance = match self {
            Self::Full => k * d * (d + 1) / 2,
            Self::Diagonal => k * d,
        };
        (k - 1) + k * d + covariance
    }
}

/// Goodness of fit of a mixture model, lower criteria are better.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixtureScores {
    /// Total log-likelihood of the samples.
    pub log_likelihood: f64,
    /// Bayesian information criterion, `-2 logL + p ln N`.
    pub bic: f64,
    /// Akaike information criterion, `-2 logL + 2p`.
    pub aic: f64,
    pub n_parameters: usize,
}

impl MixtureScores {
    #[must_use]
    #[inline]
    pub fn new(log_likelihood: f64, n_parameters: usize, n_samples: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let (p, n) = (n_parameters as f64, n_samples as f64);
        Self {
            log_likelihood,
            bic: p.mul_add(n.ln(), -2.0 * log_likelihood),
            aic: 2.0f64.mul_add(p, -2.0 * log_likelihood),
            n_parameters,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GaussianMixtureFit {
    /// The most responsible component of each sample.
    pub labels: Array1<usize>,
    pub weights: Array1<Feature>,
    pub means: Array2<Feature>,
    pub scores: MixtureScores,
    pub iterations: u64,
    pub converged: bool,
}

/// Per-component covariance, kept in the form the density evaluation needs.
enum Covariances {
    /// Lower cholesky factor of each covariance matrix.
    Full(Vec<Array2<Feature>>),
    /// Variances, one row per component.
    Diagonal(Array2<Feature>),
}

struct Parameters {
    weights: Array1<Feature>,
    means: Array2<Feature>,
    covariances: Covariances,
}

/// Fit a `k` component mixture to `samples`.
///
/// The responsibilities are initialized from a k-means++ run, EM then stops once the mean
/// per-sample log-likelihood changes by less than `options.tolerance`.
///
/// # Errors
///
/// Returns an error if `k` is out of range or if a covariance matrix cannot be factorized.
#[allow(clippy::missing_inline_in_public_items)]
pub fn gaussian_mixture<R: Rng>(
    samples: ArrayView2<Feature>,
    k: usize,
    covariance: CovarianceType,
    options: &RunOptions,
    rng: &mut R,
) -> ClusteringResult<GaussianMixtureFit> {
    let (n, d) = samples.dim();
    if k == 0 || k > n {
        return Err(ClusteringError::InvalidK { k, n });
    }

    let init = kmeans(samples, k, &KMeansInit::PlusPlus, options, rng)?;
    let mut responsibilities = Array2::zeros((n, k));
    for (i, &label) in init.labels.iter().enumerate() {
        responsibilities[[i, label]] = 1.0;
    }

    let mut parameters = maximization(samples, &responsibilities, covariance)?;
    let mut previous = Feature::NEG_INFINITY;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        iterations += 1;
        let (log_resp, mean_log_likelihood) = expectation(samples, &parameters);
        parameters = maximization(samples, &log_resp.mapv(Feature::exp), covariance)?;

        trace!("EM iteration {iterations}: mean log-likelihood {mean_log_likelihood}");
        if (mean_log_likelihood - previous).abs() < options.tolerance {
            converged = true;
            break;
        }
        previous = mean_log_likelihood;
    }

    let (log_resp, mean_log_likelihood) = expectation(samples, &parameters);
    let labels = log_resp
        .outer_iter()
        .map(|row| row.argmax().unwrap_or_default())
        .collect::<Array1<_>>();

    #[allow(clippy::cast_precision_loss)]
    let scores = MixtureScores::new(
        mean_log_likelihood * n as Feature,
        covariance.n_parameters(k, d),
        n,
    );
    debug!(
        "gaussian mixture with k={k}: logL={}, bic={}, aic={}",
        scores.log_likelihood, scores.bic, scores.aic
    );

    Ok(GaussianMixtureFit {
        labels,
        weights: parameters.weights,
        means: parameters.means,
        scores,
        iterations,
        converged,
    })
}

/// Estimate the mixture parameters from the (soft) responsibilities.
fn maximization(
    samples: ArrayView2<Feature>,
    responsibilities: &Array2<Feature>,
    covariance: CovarianceType,
) -> ClusteringResult<Parameters> {
    #[allow(clippy::cast_precision_loss)]
    let n = samples.nrows() as Feature;
    let counts = responsibilities.sum_axis(Axis(0)) + 10.0 * Feature::EPSILON;
    let weights = &counts / n;
    let means = responsibilities.t().dot(&samples) / &counts.view().insert_axis(Axis(1));

    let covariances = match covariance {
        CovarianceType::Full => Covariances::Full(
            means
                .outer_iter()
                .zip(responsibilities.axis_iter(Axis(1)))
                .zip(counts.iter())
                .map(|((mean, resp), &count)| {
                    let diff = &samples - &mean;
                    let weighted = &diff * &resp.view().insert_axis(Axis(1));
                    let mut cov = weighted.t().dot(&diff) / count;
                    cov.diag_mut().mapv_inplace(|v| v + REGULARIZATION);
                    Ok(cov.cholesky()?)
                })
                .collect::<ClusteringResult<Vec<_>>>()?,
        ),
        CovarianceType::Diagonal => {
            let mut variances = Array2::zeros(means.raw_dim());
            for (((mut variance, mean), resp), &count) in variances
                .outer_iter_mut()
                .zip(means.outer_iter())
                .zip(responsibilities.axis_iter(Axis(1)))
                .zip(counts.iter())
            {
                let diff = &samples - &mean;
                let squared = diff.mapv(|v| v * v);
                variance.assign(&(resp.dot(&squared) / count + REGULARIZATION));
            }
            Covariances::Diagonal(variances)
        }
    };

    Ok(Parameters {
        weights,
        means,
        covariances,
    })
}

/// Log-responsibilities of every component for every sample, and the mean log-likelihood.
fn expectation(samples: ArrayView2<Feature>, parameters: &Parameters) -> (Array2<Feature>, Feature) {
    let (n, k) = (samples.nrows(), parameters.weights.len());
    let mut weighted = Array2::zeros((n, k));
    for (c, mut column) in weighted.axis_iter_mut(Axis(1)).enumerate() {
        let log_weight = parameters.weights[c].ln();
        let mean = parameters.means.row(c);
        for (value, sample) in column.iter_mut().zip(samples.outer_iter()) {
            *value = log_weight + log_density(sample, mean, &parameters.covariances, c);
        }
    }

    let mut total = 0.0;
    for mut row in weighted.outer_iter_mut() {
        let norm = log_sum_exp(row.view());
        total += norm;
        row -= norm;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = total / n as Feature;
    (weighted, mean)
}

fn log_density(
    x: ArrayView1<Feature>,
    mean: ArrayView1<Feature>,
    covariances: &Covariances,
    component: usize,
) -> Feature {
    #[allow(clippy::cast_precision_loss)]
    let d = x.len() as Feature;
    let constant = d * (2.0 * std::f64::consts::PI).ln();
    let diff = &x - &mean;

    let (log_det, mahalanobis) = match covariances {
        Covariances::Full(factors) => {
            let factor = &factors[component];
            let y = forward_substitution(factor, &diff);
            let log_det = 2.0 * factor.diag().iter().map(|v| v.ln()).sum::<Feature>();
            (log_det, y.dot(&y))
        }
        Covariances::Diagonal(variances) => {
            let variance = variances.row(component);
            let log_det = variance.iter().map(|v| v.ln()).sum::<Feature>();
            let mahalanobis = diff
                .iter()
                .zip(variance.iter())
                .map(|(delta, var)| delta * delta / var)
                .sum::<Feature>();
            (log_det, mahalanobis)
        }
    };

    -0.5 * (constant + log_det + mahalanobis)
}

/// Solve `L y = b` for lower triangular `L`.
fn forward_substitution(lower: &Array2<Feature>, b: &Array1<Feature>) -> Array1<Feature> {
    let mut y = Array1::zeros(b.len());
    for i in 0..b.len() {
        let partial = (0..i).map(|j| lower[[i, j]] * y[j]).sum::<Feature>();
        y[i] = (b[i] - partial) / lower[[i, i]];
    }
    y
}

fn log_sum_exp(values: ArrayView1<Feature>) -> Feature {
    let max = values.fold(Feature::NEG_INFINITY, |a, &b| a.max(b));
    if max.is_infinite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<Feature>().ln()
}
