//! The voter-by-project weight matrix, and its standardized form.
//!
//! Rows are voters and columns are projects. Both are addressed by their zero-based position in
//! the input, and that numbering is kept everywhere downstream.

use log::{debug, warn};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::{
    Feature,
    errors::{ClusteringError, ClusteringResult},
};

/// Standard deviations at or below this (relative to the column magnitude) are treated as zero.
const DEGENERATE_TOLERANCE: Feature = 1e-12;

/// The raw, non-negative contribution weights, one row per voter and one column per project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Feature>>", into = "Vec<Vec<Feature>>")]
pub struct WeightMatrix(pub(crate) Array2<Feature>);

impl WeightMatrix {
    /// Wrap an existing array, validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::InvalidInput`] if the array is empty, or if any weight is
    /// negative or not finite.
    #[inline]
    pub fn new(weights: Array2<Feature>) -> ClusteringResult<Self> {
        if weights.nrows() == 0 || weights.ncols() == 0 {
            return Err(ClusteringError::InvalidInput(format!(
                "weight matrix must have at least one voter and one project, got shape {:?}",
                weights.shape()
            )));
        }
        if let Some(((voter, project), weight)) = weights
            .indexed_iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ClusteringError::InvalidInput(format!(
                "weight of voter {voter} for project {project} must be finite and non-negative, got {weight}"
            )));
        }
        Ok(Self(weights))
    }

    #[must_use]
    #[inline]
    pub fn nvoters(&self) -> usize {
        self.0.nrows()
    }

    #[must_use]
    #[inline]
    pub fn nprojects(&self) -> usize {
        self.0.ncols()
    }

    #[must_use]
    #[inline]
    pub fn view(&self) -> ArrayView2<'_, Feature> {
        self.0.view()
    }

    /// Standardize with the given settings, see [`Standardizer::standardize`].
    ///
    /// # Errors
    ///
    /// See [`Standardizer::standardize`].
    #[inline]
    pub fn standardize(&self, standardizer: &Standardizer) -> ClusteringResult<StandardizedMatrix> {
        standardizer.standardize(self)
    }
}

impl TryFrom<Vec<Vec<Feature>>> for WeightMatrix {
    type Error = ClusteringError;

    #[inline]
    fn try_from(rows: Vec<Vec<Feature>>) -> Result<Self, Self::Error> {
        let nprojects = rows.first().map_or(0, Vec::len);
        if let Some((voter, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != nprojects) {
            return Err(ClusteringError::InvalidInput(format!(
                "weight matrix is not rectangular: voter {voter} has {} weights, expected {nprojects}",
                row.len()
            )));
        }

        let shape = (rows.len(), nprojects);
        let weights = Array2::from_shape_vec(shape, rows.into_iter().flatten().collect())
            .map_err(|e| ClusteringError::InvalidInput(e.to_string()))?;
        Self::new(weights)
    }
}

impl From<WeightMatrix> for Vec<Vec<Feature>> {
    #[inline]
    fn from(matrix: WeightMatrix) -> Self {
        matrix.0.outer_iter().map(|row| row.to_vec()).collect()
    }
}

/// Which denominator to use when computing a column's variance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceConvention {
    /// Divide by `N` (ddof = 0).
    #[default]
    Population,
    /// Divide by `N - 1` (ddof = 1).
    Sample,
}

/// What to do with a column whose standard deviation is zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Centre the column and leave it at 0.
    #[default]
    Zero,
    /// Fail with [`ClusteringError::DegenerateColumn`].
    Reject,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standardizer {
    #[serde(default)]
    pub variance: VarianceConvention,
    #[serde(default)]
    pub degenerate_columns: DegeneratePolicy,
}

impl Standardizer {
    /// Rescale every column to zero mean and unit standard deviation.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::DegenerateColumn`] for the first constant column when the
    /// policy is [`DegeneratePolicy::Reject`].
    #[inline]
    pub fn standardize(&self, matrix: &WeightMatrix) -> ClusteringResult<StandardizedMatrix> {
        let mut data = matrix.0.clone();
        let mut degenerate_columns = Vec::new();

        for (j, mut column) in data.axis_iter_mut(Axis(1)).enumerate() {
            let mean = column.iter().mean();
            let std_dev = match self.variance {
                VarianceConvention::Population => column.iter().population_std_dev(),
                VarianceConvention::Sample => column.iter().std_dev(),
            };

            // statrs gives NaN for the sample deviation of a single value
            if std_dev.is_nan() || std_dev <= DEGENERATE_TOLERANCE * mean.abs().max(1.0) {
                if self.degenerate_columns == DegeneratePolicy::Reject {
                    return Err(ClusteringError::DegenerateColumn { column: j });
                }
                warn!("Project column {j} has zero variance, leaving it at 0");
                column.fill(0.0);
                degenerate_columns.push(j);
                continue;
            }

            column.mapv_inplace(|v| (v - mean) / std_dev);
        }

        debug!(
            "Standardized {}x{} matrix ({} degenerate columns)",
            data.nrows(),
            data.ncols(),
            degenerate_columns.len()
        );

        Ok(StandardizedMatrix {
            data,
            degenerate_columns,
        })
    }
}

/// A [`WeightMatrix`] rescaled column-wise by a [`Standardizer`].
#[derive(Clone, Debug, PartialEq)]
pub struct StandardizedMatrix {
    data: Array2<Feature>,
    degenerate_columns: Vec<usize>,
}

impl StandardizedMatrix {
    #[must_use]
    #[inline]
    pub fn view(&self) -> ArrayView2<'_, Feature> {
        self.data.view()
    }

    #[must_use]
    #[inline]
    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    #[inline]
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// Columns that had zero variance and were left at 0.
    #[must_use]
    #[inline]
    pub fn degenerate_columns(&self) -> &[usize] {
        &self.degenerate_columns
    }

    #[cfg(test)]
    pub(crate) fn from_raw(data: Array2<Feature>) -> Self {
        Self {
            data,
            degenerate_columns: Vec::new(),
        }
    }
}
