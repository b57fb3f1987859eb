//! Fitting a set of algorithms over a range of `k`, in parallel.

use log::{debug, warn};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{
    clustering::{Algorithm, ClusterRun, RunOptions},
    errors::{ClusteringError, ClusteringResult},
    grid::{DensityGrid, DensityRecommendation, GridPoint},
    matrix::StandardizedMatrix,
    selection::{
        CriterionPoint, InformationCriterionCurve, Recommendation, WcssCurve, WcssPoint,
    },
    utils::pairwise_distances,
    validity::ValidityScores,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    /// Algorithms to fit, in reporting order.
    pub algorithms: Vec<Algorithm>,
    /// Smallest `k` tried by the algorithms that take one.
    pub k_min: usize,
    /// Largest `k` tried, inclusive.
    pub k_max: usize,
    #[serde(default)]
    pub options: RunOptions,
    /// Whether to compute [`ValidityScores`] for every run.
    #[serde(default)]
    pub score_validity: bool,
    /// Density-based parameters to search, on top of the algorithms above.
    #[serde(default)]
    pub density_grid: Option<DensityGrid>,
}

impl Default for Sweep {
    #[inline]
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::default()],
            k_min: 1,
            k_max: 10,
            options: RunOptions::default(),
            score_validity: false,
            density_grid: None,
        }
    }
}

/// A `(algorithm, k)` pair that could not be fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub algorithm: Algorithm,
    /// `None` for the algorithms that discover `k` themselves.
    pub k: Option<usize>,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Successful runs, ordered by algorithm (as listed in the sweep), then by `k`.
    pub runs: Vec<ClusterRun>,
    pub failures: Vec<SweepFailure>,
    /// Scored density grid points, empty unless the sweep has a [`DensityGrid`].
    pub grid: Vec<GridPoint>,
}

impl Sweep {
    /// Every `(algorithm index, k)` pair the sweep will fit, in reporting order.
    #[must_use]
    #[inline]
    pub fn jobs(&self) -> Vec<(usize, Option<usize>)> {
        self.algorithms
            .iter()
            .enumerate()
            .flat_map(|(index, algorithm)| {
                let ks: Vec<Option<usize>> = if algorithm.requires_k() {
                    (self.k_min..=self.k_max).map(Some).collect()
                } else {
                    vec![None]
                };
                ks.into_iter().map(move |k| (index, k))
            })
            .collect()
    }

    /// Fit every job on the rayon thread pool.
    ///
    /// Each run seeds its own generator from `options.seed`, so the report does not depend on
    /// how jobs are scheduled. A job that fails is recorded in [`SweepReport::failures`] and does
    /// not stop the others.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::InvalidInput`] if no algorithm is given or the `k` range is
    /// empty or starts at 0.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn run(&self, data: &StandardizedMatrix) -> ClusteringResult<SweepReport> {
        if self.algorithms.is_empty() {
            return Err(ClusteringError::InvalidInput(
                "a sweep needs at least one algorithm".into(),
            ));
        }
        if self.k_min == 0 || self.k_min > self.k_max {
            return Err(ClusteringError::InvalidInput(format!(
                "invalid k range {}..={}",
                self.k_min, self.k_max
            )));
        }

        let jobs = self.jobs();
        debug!("Sweeping {} jobs over {} voters", jobs.len(), data.nrows());

        // shared by every validity score of the sweep
        let distances = (self.score_validity || self.density_grid.is_some())
            .then(|| pairwise_distances(data.view()));

        // an indexed parallel collect keeps the job order
        let results = jobs
            .par_iter()
            .map(|&(index, k)| {
                let algorithm = &self.algorithms[index];
                algorithm
                    .fit(data, k, &self.options)
                    .map(|mut run| {
                        if let (true, Some(distances)) = (self.score_validity, &distances) {
                            run.validity = ValidityScores::with_distances(
                                data.view(),
                                distances,
                                &run.assignment,
                            );
                        }
                        run
                    })
                    .map_err(|e| SweepFailure {
                        algorithm: algorithm.clone(),
                        k,
                        error: e.to_string(),
                    })
            })
            .collect::<Vec<_>>();

        let mut report = SweepReport::default();
        for result in results {
            match result {
                Ok(run) => report.runs.push(run),
                Err(failure) => {
                    warn!(
                        "{} failed for k={:?}: {}",
                        failure.algorithm, failure.k, failure.error
                    );
                    report.failures.push(failure);
                }
            }
        }

        if let (Some(grid), Some(distances)) = (&self.density_grid, &distances) {
            let (points, failures) = grid.search(data, distances, &self.options);
            debug!(
                "Density grid: {} points scored, {} failed",
                points.len(),
                failures.len()
            );
            for failure in &failures {
                warn!("{:?} failed: {}", failure.algorithm, failure.error);
            }
            report.grid = points;
            report.failures.extend(failures);
        }
        Ok(report)
    }
}

impl SweepReport {
    /// Inertia against `k` for the first k-means variant of the sweep.
    #[must_use]
    #[inline]
    pub fn wcss_curve(&self) -> WcssCurve {
        let Some(first) = self
            .runs
            .iter()
            .find(|run| matches!(run.algorithm, Algorithm::KMeans { .. }))
        else {
            return WcssCurve::default();
        };

        WcssCurve::new(
            self.runs
                .iter()
                .filter(|run| run.algorithm == first.algorithm)
                .filter_map(|run| run.inertia.map(|wcss| WcssPoint { k: run.k, wcss }))
                .collect(),
        )
    }

    /// BIC and AIC against `k` for the first gaussian mixture variant of the sweep.
    #[must_use]
    #[inline]
    pub fn information_criteria(&self) -> InformationCriterionCurve {
        let Some(first) = self
            .runs
            .iter()
            .find(|run| matches!(run.algorithm, Algorithm::GaussianMixture { .. }))
        else {
            return InformationCriterionCurve::default();
        };

        InformationCriterionCurve::new(
            self.runs
                .iter()
                .filter(|run| run.algorithm == first.algorithm)
                .filter_map(|run| {
                    run.mixture.map(|scores| CriterionPoint {
                        k: run.k,
                        bic: scores.bic,
                        aic: scores.aic,
                        log_likelihood: scores.log_likelihood,
                    })
                })
                .collect(),
        )
    }

    #[must_use]
    #[inline]
    pub fn recommendation(&self) -> Recommendation {
        Recommendation::new(&self.wcss_curve(), &self.information_criteria())
            .with_density(self.density_recommendation())
    }

    /// Best density grid parameters by each validity index, all `None` without a grid.
    #[must_use]
    #[inline]
    pub fn density_recommendation(&self) -> DensityRecommendation {
        DensityRecommendation::new(&self.grid)
    }

    /// The run of `algorithm` at `k`, if it succeeded.
    #[must_use]
    #[inline]
    pub fn run_for(&self, algorithm: &Algorithm, k: usize) -> Option<&ClusterRun> {
        self.runs
            .iter()
            .find(|run| &run.algorithm == algorithm && run.k == k)
    }
}
