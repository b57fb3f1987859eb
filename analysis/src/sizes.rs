//! Cluster population counts, the structure the allocation stage indexes by cluster position.

use serde::{Deserialize, Serialize};

use crate::errors::{ClusteringError, ClusteringResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSize {
    pub index: usize,
    pub size: usize,
}

/// Number of voters in every cluster `0..k`, with explicit zeros for empty clusters.
///
/// Noise (voters a density-based algorithm left unassigned) is counted separately and never
/// merged into a numbered cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSizeReport {
    pub clusters: Vec<ClusterSize>,
    pub noise: usize,
}

impl ClusterSizeReport {
    /// Count the voters assigned to each cluster.
    ///
    /// `None` entries in `assignment` are noise.
    ///
    /// # Errors
    ///
    /// Returns [`ClusteringError::InvalidInput`] if a voter is assigned to a cluster `>= k`.
    #[inline]
    pub fn from_assignment(assignment: &[Option<usize>], k: usize) -> ClusteringResult<Self> {
        if let Some((voter, label)) = assignment
            .iter()
            .enumerate()
            .find_map(|(voter, label)| label.filter(|&l| l >= k).map(|l| (voter, l)))
        {
            return Err(ClusteringError::InvalidInput(format!(
                "voter {voter} is assigned to cluster {label}, but there are only {k} clusters"
            )));
        }
        Ok(Self::tally(assignment, k))
    }

    /// Count without validating labels, anything `>= k` is ignored.
    pub(crate) fn tally(assignment: &[Option<usize>], k: usize) -> Self {
        let (sizes, noise) = assignment.iter().fold(
            (vec![0usize; k], 0usize),
            |(mut sizes, noise), label| match label {
                Some(label) => {
                    if let Some(size) = sizes.get_mut(*label) {
                        *size += 1;
                    }
                    (sizes, noise)
                }
                None => (sizes, noise + 1),
            },
        );

        Self {
            clusters: sizes
                .into_iter()
                .enumerate()
                .map(|(index, size)| ClusterSize { index, size })
                .collect(),
            noise,
        }
    }

    /// The sizes alone, ordered by cluster index.
    #[must_use]
    #[inline]
    pub fn sizes(&self) -> Vec<usize> {
        self.clusters.iter().map(|c| c.size).collect()
    }

    /// Voters in numbered clusters (noise excluded).
    #[must_use]
    #[inline]
    pub fn clustered(&self) -> usize {
        self.clusters.iter().map(|c| c.size).sum()
    }

    /// All voters, including noise.
    #[must_use]
    #[inline]
    pub fn total(&self) -> usize {
        self.clustered() + self.noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_clusters_are_reported_as_zero() {
        let assignment = [Some(0), Some(2), Some(0), Some(2)];

        let report = ClusterSizeReport::from_assignment(&assignment, 4).unwrap();

        assert_eq!(report.sizes(), vec![2, 0, 2, 0]);
        assert_eq!(report.noise, 0);
        assert_eq!(report.total(), assignment.len());
    }

    #[test]
    fn test_noise_is_counted_separately() {
        let assignment = [Some(0), None, Some(1), None, Some(0)];

        let report = ClusterSizeReport::from_assignment(&assignment, 2).unwrap();

        assert_eq!(
            report.clusters,
            vec![
                ClusterSize { index: 0, size: 2 },
                ClusterSize { index: 1, size: 1 }
            ]
        );
        assert_eq!(report.noise, 2);
        assert_eq!(report.clustered() + report.noise, 5);
    }

    #[test]
    fn test_out_of_range_label_is_rejected() {
        let result = ClusterSizeReport::from_assignment(&[Some(0), Some(3)], 2);
        assert!(matches!(result, Err(ClusteringError::InvalidInput(_))));
    }
}
