//! Two-dimensional projections of the standardized matrix, for charts only.
//!
//! Nothing on the clustering or selection path depends on these.

use linfa::prelude::*;
use linfa_reduction::Pca;
use linfa_tsne::TSneParams;
use log::debug;
use ndarray::{Array2, s};
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::{
    Feature,
    errors::{ClusteringError, ClusteringResult},
    matrix::StandardizedMatrix,
};

/// Dimension of every projection.
pub const PROJECTION_SIZE: usize = 2;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProjectionMethod {
    /// Principal component analysis, linear and deterministic.
    #[default]
    Pca,
    /// Barnes-Hut t-SNE, perplexity derived from the number of voters.
    #[serde(rename = "tsne")]
    #[strum(serialize = "tsne")]
    TSne,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub method: ProjectionMethod,
    /// One `[x, y]` per voter, in voter order.
    pub points: Vec<[Feature; PROJECTION_SIZE]>,
    /// Share of the variance each component explains (PCA only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explained_variance_ratio: Option<Vec<Feature>>,
}

impl Projection {
    /// Project `data` down to two dimensions.
    ///
    /// When there are fewer than two projects (or voters) PCA only finds as many components as
    /// there are, and the missing coordinates are 0.
    ///
    /// # Errors
    ///
    /// Returns an error if there are fewer than 2 voters, or if the underlying reduction fails
    /// (t-SNE needs enough voters for its minimum perplexity).
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn project(
        data: &StandardizedMatrix,
        method: ProjectionMethod,
        seed: u64,
    ) -> ClusteringResult<Self> {
        if data.nrows() < 2 {
            return Err(ClusteringError::InsufficientData {
                needed: 2,
                got: data.nrows(),
            });
        }

        let (embedding, explained_variance_ratio) = match method {
            ProjectionMethod::Pca => {
                let components = PROJECTION_SIZE.min(data.ncols()).min(data.nrows());
                let records = data.view().to_owned();
                let pca = Pca::params(components).fit(&Dataset::from(records.clone()))?;
                let projected: Array2<Feature> = pca.predict(&records);

                let mut embedding = Array2::zeros((data.nrows(), PROJECTION_SIZE));
                embedding
                    .slice_mut(s![.., ..components])
                    .assign(&projected.slice(s![.., ..components]));
                (embedding, Some(pca.explained_variance_ratio().to_vec()))
            }
            ProjectionMethod::TSne => {
                #[allow(clippy::cast_precision_loss)]
                let perplexity = (data.nrows() as f64 / 100.).clamp(5.0, 50.0);
                let embedding = TSneParams::embedding_size_with_rng(
                    PROJECTION_SIZE,
                    SmallRng::seed_from_u64(seed),
                )
                .perplexity(perplexity)
                .approx_threshold(0.5)
                .max_iter(1000)
                .transform(data.view().to_owned())?;
                (embedding, None)
            }
        };

        debug!("Projected {} voters with {method}", embedding.nrows());

        Ok(Self {
            method,
            points: embedding
                .outer_iter()
                .map(|row| [row[0], row[1]])
                .collect(),
            explained_variance_ratio,
        })
    }
}
