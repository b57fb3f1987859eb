//! Grid search over the parameters of the density-based algorithms.
//!
//! DBSCAN and HDBSCAN have no `k` to sweep and no likelihood, so every parameter combination is
//! fit and the resulting labelings are compared through their [`ValidityScores`].

use log::info;
use ndarray::Array2;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    Feature,
    clustering::{Algorithm, RunOptions},
    matrix::StandardizedMatrix,
    sweep::SweepFailure,
    validity::ValidityScores,
};

/// The parameter values tried, DBSCAN gets every `eps` x `min_points` pair and HDBSCAN every
/// `min_points` x `min_cluster_size` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityGrid {
    /// DBSCAN neighborhood radii.
    pub eps: Vec<Feature>,
    pub min_points: Vec<usize>,
    /// HDBSCAN smallest cluster sizes.
    pub min_cluster_size: Vec<usize>,
}

impl Default for DensityGrid {
    /// `eps` from 0.1 to 1.0 in steps of 0.1, `min_points` from 2 to 6 and `min_cluster_size`
    /// from 2 to 12.
    #[inline]
    fn default() -> Self {
        Self {
            eps: (1..=10).map(|i| Feature::from(i) / 10.0).collect(),
            min_points: (2..=6).collect(),
            min_cluster_size: (2..=12).collect(),
        }
    }
}

/// The outcome of one grid point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub algorithm: Algorithm,
    /// Number of clusters found.
    pub k: usize,
    pub noise: usize,
    /// `None` when fewer than two clusters were found.
    pub validity: Option<ValidityScores>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidityIndex {
    Silhouette,
    DaviesBouldin,
    Dunn,
}

impl ValidityIndex {
    pub const ALL: [Self; 3] = [Self::Silhouette, Self::DaviesBouldin, Self::Dunn];

    #[must_use]
    #[inline]
    pub const fn of(self, scores: &ValidityScores) -> Feature {
        match self {
            Self::Silhouette => scores.silhouette,
            Self::DaviesBouldin => scores.davies_bouldin,
            Self::Dunn => scores.dunn,
        }
    }

    /// Whether `score` strictly beats `best`.
    #[must_use]
    #[inline]
    pub fn is_better(self, score: Feature, best: Feature) -> bool {
        match self {
            Self::Silhouette | Self::Dunn => score > best,
            Self::DaviesBouldin => score < best,
        }
    }
}

/// The grid point an index favors, and its score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridChoice {
    pub algorithm: Algorithm,
    pub k: usize,
    pub noise: usize,
    pub score: Feature,
}

/// The best parameters by each validity index. Highest silhouette, lowest Davies-Bouldin, and
/// highest Dunn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DensityRecommendation {
    pub silhouette: Option<GridChoice>,
    pub davies_bouldin: Option<GridChoice>,
    pub dunn: Option<GridChoice>,
}

impl DensityGrid {
    /// DBSCAN over `eps` then `min_points`, followed by HDBSCAN over `min_points` then
    /// `min_cluster_size`.
    #[must_use]
    #[inline]
    pub fn algorithms(&self) -> Vec<Algorithm> {
        let dbscan = self.eps.iter().flat_map(|&eps| {
            self.min_points
                .iter()
                .map(move |&min_points| Algorithm::DensityBased { eps, min_points })
        });
        let hdbscan = self.min_points.iter().flat_map(|&min_points| {
            self.min_cluster_size.iter().map(move |&min_cluster_size| {
                Algorithm::DensityBasedHierarchical {
                    min_points,
                    min_cluster_size,
                    allow_single_cluster: false,
                }
            })
        });
        dbscan.chain(hdbscan).collect()
    }

    /// Fit and score every grid point on the rayon thread pool, `distances` are the pairwise
    /// distances of `data`'s rows.
    ///
    /// Points come back in [`DensityGrid::algorithms`] order. Parameters an algorithm rejects
    /// become failures and do not stop the others.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn search(
        &self,
        data: &StandardizedMatrix,
        distances: &Array2<Feature>,
        options: &RunOptions,
    ) -> (Vec<GridPoint>, Vec<SweepFailure>) {
        let results = self
            .algorithms()
            .par_iter()
            .map(|algorithm| {
                algorithm
                    .fit(data, None, options)
                    .map(|run| GridPoint {
                        k: run.k,
                        noise: run.noise(),
                        validity: ValidityScores::with_distances(
                            data.view(),
                            distances,
                            &run.assignment,
                        ),
                        algorithm: run.algorithm,
                    })
                    .map_err(|e| SweepFailure {
                        algorithm: algorithm.clone(),
                        k: None,
                        error: e.to_string(),
                    })
            })
            .collect::<Vec<_>>();

        let mut points = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(point) => points.push(point),
                Err(failure) => failures.push(failure),
            }
        }
        (points, failures)
    }
}

impl DensityRecommendation {
    /// Ties go to the earliest grid point. Non-finite scores, like the infinite Dunn index of
    /// clusters of coinciding voters, are skipped.
    #[must_use]
    #[inline]
    pub fn new(points: &[GridPoint]) -> Self {
        let recommendation = Self {
            silhouette: best(points, ValidityIndex::Silhouette),
            davies_bouldin: best(points, ValidityIndex::DaviesBouldin),
            dunn: best(points, ValidityIndex::Dunn),
        };
        if !points.is_empty() {
            info!(
                "Best density parameters: silhouette={:?}, davies-bouldin={:?}, dunn={:?}",
                recommendation.silhouette.as_ref().map(|c| &c.algorithm),
                recommendation.davies_bouldin.as_ref().map(|c| &c.algorithm),
                recommendation.dunn.as_ref().map(|c| &c.algorithm),
            );
        }
        recommendation
    }

    #[must_use]
    #[inline]
    pub const fn get(&self, index: ValidityIndex) -> Option<&GridChoice> {
        match index {
            ValidityIndex::Silhouette => self.silhouette.as_ref(),
            ValidityIndex::DaviesBouldin => self.davies_bouldin.as_ref(),
            ValidityIndex::Dunn => self.dunn.as_ref(),
        }
    }
}

fn best(points: &[GridPoint], index: ValidityIndex) -> Option<GridChoice> {
    let mut best: Option<(&GridPoint, Feature)> = None;
    for point in points {
        let Some(score) = point
            .validity
            .map(|scores| index.of(&scores))
            .filter(|score| score.is_finite())
        else {
            continue;
        };
        if best.is_none_or(|(_, b)| index.is_better(score, b)) {
            best = Some((point, score));
        }
    }
    best.map(|(point, score)| GridChoice {
        algorithm: point.algorithm.clone(),
        k: point.k,
        noise: point.noise,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::pairwise_distances;
    use ndarray::Array2;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    /// Two rows of six voters one unit apart, 35 units from each other.
    fn two_lines() -> StandardizedMatrix {
        StandardizedMatrix::from_raw(Array2::from_shape_fn((12, 2), |(i, j)| {
            #[allow(clippy::cast_precision_loss)]
            let x = if i < 6 { i as f64 } else { 34.0 + i as f64 };
            if j == 0 { x } else { 0.0 }
        }))
    }

    fn grid() -> DensityGrid {
        DensityGrid {
            eps: vec![0.5, 1.5, 50.0],
            min_points: vec![2],
            min_cluster_size: vec![3],
        }
    }

    #[test]
    fn test_default_grid() {
        let grid = DensityGrid::default();

        assert_eq!(grid.eps.len(), 10);
        assert!((grid.eps[0] - 0.1).abs() < 1e-12);
        assert!((grid.eps[9] - 1.0).abs() < 1e-12);
        assert_eq!(grid.min_points, vec![2, 3, 4, 5, 6]);
        assert_eq!(grid.min_cluster_size, (2..=12).collect::<Vec<_>>());
        assert_eq!(grid.algorithms().len(), 10 * 5 + 5 * 11);
    }

    #[test]
    fn test_algorithms_order() {
        assert_eq!(
            grid().algorithms(),
            vec![
                Algorithm::DensityBased {
                    eps: 0.5,
                    min_points: 2
                },
                Algorithm::DensityBased {
                    eps: 1.5,
                    min_points: 2
                },
                Algorithm::DensityBased {
                    eps: 50.0,
                    min_points: 2
                },
                Algorithm::DensityBasedHierarchical {
                    min_points: 2,
                    min_cluster_size: 3,
                    allow_single_cluster: false
                },
            ]
        );
    }

    #[test]
    fn test_search_scores_every_point() {
        let data = two_lines();
        let distances = pairwise_distances(data.view());

        let (points, failures) = grid().search(&data, &distances, &RunOptions::default());

        assert!(failures.is_empty(), "{failures:?}");
        assert_eq!(
            points.iter().map(|p| (p.k, p.noise)).collect::<Vec<_>>(),
            // too small, separating, everything in one cluster, then HDBSCAN
            vec![(0, 12), (2, 0), (1, 0), (2, 0)]
        );
        assert_eq!(points[0].validity, None);
        assert!(points[1].validity.is_some());
        assert_eq!(points[2].validity, None);
    }

    #[rstest]
    fn test_grid_picks_the_eps_that_separates_two_blobs(
        #[values(ValidityIndex::Silhouette, ValidityIndex::DaviesBouldin, ValidityIndex::Dunn)]
        index: ValidityIndex,
    ) {
        let data = two_lines();
        let distances = pairwise_distances(data.view());
        let (points, _) = grid().search(&data, &distances, &RunOptions::default());

        let recommendation = DensityRecommendation::new(&points);

        let choice = recommendation.get(index).unwrap();
        assert_eq!(
            choice.algorithm,
            Algorithm::DensityBased {
                eps: 1.5,
                min_points: 2
            }
        );
        assert_eq!(choice.k, 2);
        assert_eq!(choice.noise, 0);
    }

    #[test]
    fn test_rejected_parameters_are_failures() {
        let data = two_lines();
        let distances = pairwise_distances(data.view());
        let grid = DensityGrid {
            eps: vec![-1.0, 1.5],
            min_points: vec![2],
            min_cluster_size: vec![],
        };

        let (points, failures) = grid.search(&data, &distances, &RunOptions::default());

        assert_eq!(points.len(), 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].algorithm,
            Algorithm::DensityBased {
                eps: -1.0,
                min_points: 2
            }
        );
    }

    #[test]
    fn test_best_skips_unscored_and_infinite_points() {
        let point = |min_points: usize, silhouette: f64, dunn: f64| GridPoint {
            algorithm: Algorithm::DensityBased {
                eps: 1.0,
                min_points,
            },
            k: 2,
            noise: 0,
            validity: Some(ValidityScores {
                silhouette,
                davies_bouldin: 1.0 - silhouette,
                dunn,
            }),
        };
        let unscored = GridPoint {
            validity: None,
            ..point(1, 0.9, 9.0)
        };
        let points = vec![
            unscored,
            point(2, 0.5, f64::INFINITY),
            point(3, 0.8, 2.0),
            point(4, 0.8, 1.0),
        ];

        let recommendation = DensityRecommendation::new(&points);

        let min_points = |choice: Option<&GridChoice>| match choice.map(|c| &c.algorithm) {
            Some(Algorithm::DensityBased { min_points, .. }) => Some(*min_points),
            _ => None,
        };
        // ties keep the earlier point
        assert_eq!(min_points(recommendation.get(ValidityIndex::Silhouette)), Some(3));
        assert_eq!(min_points(recommendation.get(ValidityIndex::DaviesBouldin)), Some(3));
        assert_eq!(min_points(recommendation.get(ValidityIndex::Dunn)), Some(3));
        for index in ValidityIndex::ALL {
            assert_eq!(DensityRecommendation::new(&points[..1]).get(index), None);
        }
    }
}
