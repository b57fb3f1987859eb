//! Picking the number of clusters from a sweep: the elbow of the WCSS curve, and the minima of
//! the information criteria of gaussian mixtures.
//!
//! Nothing here forces a single answer, the [`Recommendation`] reports each heuristic side by side,
//! along with the density-based parameters a [`crate::grid::DensityGrid`] favors.

use log::info;
use ndarray::Array1;
use ndarray_stats::{QuantileExt, errors::MinMaxError};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ClusteringError, ClusteringResult},
    grid::DensityRecommendation,
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WcssPoint {
    pub k: usize,
    pub wcss: f64,
}

/// Within-cluster sum of squares as a function of `k`, ordered by `k`.
///
/// `k` values need not be contiguous: when a run fails its point is simply missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WcssCurve(Vec<WcssPoint>);

impl WcssCurve {
    #[must_use]
    #[inline]
    pub fn new(mut points: Vec<WcssPoint>) -> Self {
        points.sort_by_key(|p| p.k);
        Self(points)
    }

    /// A contiguous curve whose first value is for `k = k_start`.
    #[must_use]
    #[inline]
    pub fn from_values_starting_at(k_start: usize, values: &[f64]) -> Self {
        Self(
            values
                .iter()
                .enumerate()
                .map(|(i, &wcss)| WcssPoint {
                    k: k_start + i,
                    wcss,
                })
                .collect(),
        )
    }

    #[must_use]
    #[inline]
    pub fn points(&self) -> &[WcssPoint] {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn ks(&self) -> Vec<usize> {
        self.0.iter().map(|p| p.k).collect()
    }

    #[must_use]
    #[inline]
    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.wcss).collect()
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Estimate the best `k` as the point right after the largest drop in WCSS.
    ///
    /// With `d_i = wcss[i + 1] - wcss[i]`, the largest drop is the first `i` minimizing `d_i`,
    /// and the estimate is the `k` of entry `i + 1`.
    ///
    /// # Errors
    ///
    /// - [`ClusteringError::InsufficientData`] if the curve has fewer than 2 points,
    /// - [`ClusteringError::InvalidInput`] if any value is NaN.
    #[inline]
    pub fn elbow(&self) -> ClusteringResult<usize> {
        if self.0.len() < 2 {
            return Err(ClusteringError::InsufficientData {
                needed: 2,
                got: self.0.len(),
            });
        }

        let differences = self
            .0
            .windows(2)
            .map(|pair| pair[1].wcss - pair[0].wcss)
            .collect::<Array1<f64>>();

        let largest_drop = differences.argmin().map_err(|e| match e {
            MinMaxError::UndefinedOrder => {
                ClusteringError::InvalidInput("WCSS curve contains NaN".into())
            }
            MinMaxError::EmptyInput => ClusteringError::InsufficientData {
                needed: 2,
                got: self.0.len(),
            },
        })?;

        Ok(self.0[largest_drop + 1].k)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriterionPoint {
    pub k: usize,
    pub bic: f64,
    pub aic: f64,
    pub log_likelihood: f64,
}

/// BIC and AIC of gaussian mixture fits as a function of `k`, ordered by `k`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InformationCriterionCurve(Vec<CriterionPoint>);

impl InformationCriterionCurve {
    #[must_use]
    #[inline]
    pub fn new(mut points: Vec<CriterionPoint>) -> Self {
        points.sort_by_key(|p| p.k);
        Self(points)
    }

    #[must_use]
    #[inline]
    pub fn points(&self) -> &[CriterionPoint] {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn ks(&self) -> Vec<usize> {
        self.0.iter().map(|p| p.k).collect()
    }

    #[must_use]
    #[inline]
    pub fn bic(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.bic).collect()
    }

    #[must_use]
    #[inline]
    pub fn aic(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.aic).collect()
    }

    /// The `k` with the lowest BIC, the smallest such `k` on ties.
    #[must_use]
    #[inline]
    pub fn min_bic_k(&self) -> Option<usize> {
        self.min_by(|p| p.bic)
    }

    /// The `k` with the lowest AIC, the smallest such `k` on ties.
    #[must_use]
    #[inline]
    pub fn min_aic_k(&self) -> Option<usize> {
        self.min_by(|p| p.aic)
    }

    fn min_by(&self, criterion: impl Fn(&CriterionPoint) -> f64) -> Option<usize> {
        let values = self.0.iter().map(criterion).collect::<Array1<f64>>();
        values.argmin().ok().map(|i| self.0[i].k)
    }
}

/// The `k` each heuristic favors, any of which may be unavailable, and the density-based
/// parameters each validity index favors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub elbow_k: Option<usize>,
    pub min_bic_k: Option<usize>,
    pub min_aic_k: Option<usize>,
    #[serde(default)]
    pub density: DensityRecommendation,
}

impl Recommendation {
    #[must_use]
    #[inline]
    pub fn new(wcss: &WcssCurve, criteria: &InformationCriterionCurve) -> Self {
        let recommendation = Self {
            elbow_k: wcss.elbow().ok(),
            min_bic_k: criteria.min_bic_k(),
            min_aic_k: criteria.min_aic_k(),
            density: DensityRecommendation::default(),
        };
        info!(
            "Recommended k: elbow={:?}, min BIC={:?}, min AIC={:?}",
            recommendation.elbow_k, recommendation.min_bic_k, recommendation.min_aic_k
        );
        recommendation
    }

    #[must_use]
    #[inline]
    pub fn with_density(self, density: DensityRecommendation) -> Self {
        Self { density, ..self }
    }
}
