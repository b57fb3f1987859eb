use core::fmt;
use std::io;

use qfcluster_analysis::{Algorithm, clustering::KMeansInit, reduce::ProjectionMethod};
use qfcluster_core::config::Settings;

use super::{AlgorithmKind, ProjectionTarget};

pub struct WriteAdapter<W>(pub W);

impl<W> fmt::Write for WriteAdapter<W>
where
    W: io::Write,
{
    fn write_str(&mut self, s: &str) -> Result<(), fmt::Error> {
        self.0.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), fmt::Error> {
        self.0.write_fmt(args).map_err(|_| fmt::Error)
    }
}

/// The algorithm of the given kind: the first one configured in the sweep, or one with default
/// parameters.
pub fn resolve_algorithm(kind: AlgorithmKind, settings: &Settings) -> Algorithm {
    settings
        .sweep
        .algorithms
        .iter()
        .find(|algorithm| AlgorithmKind::from(*algorithm) == kind)
        .cloned()
        .unwrap_or_else(|| kind.with_default_parameters())
}

impl AlgorithmKind {
    pub fn with_default_parameters(self) -> Algorithm {
        match self {
            Self::Kmeans => Algorithm::KMeans {
                init: KMeansInit::default(),
            },
            Self::Agglomerative => Algorithm::Agglomerative {
                linkage: Default::default(),
            },
            Self::Spectral => Algorithm::Spectral { gamma: 1.0 },
            Self::GaussianMixture => Algorithm::GaussianMixture {
                covariance: Default::default(),
            },
            Self::DensityBased => Algorithm::DensityBased {
                eps: 0.5,
                min_points: 5,
            },
            Self::DensityBasedHierarchical => Algorithm::DensityBasedHierarchical {
                min_points: 5,
                min_cluster_size: 5,
                allow_single_cluster: false,
            },
        }
    }
}

impl From<&Algorithm> for AlgorithmKind {
    fn from(algorithm: &Algorithm) -> Self {
        match algorithm {
            Algorithm::KMeans { .. } => Self::Kmeans,
            Algorithm::Agglomerative { .. } => Self::Agglomerative,
            Algorithm::Spectral { .. } => Self::Spectral,
            Algorithm::GaussianMixture { .. } => Self::GaussianMixture,
            Algorithm::DensityBased { .. } => Self::DensityBased,
            Algorithm::DensityBasedHierarchical { .. } => Self::DensityBasedHierarchical,
        }
    }
}

impl From<ProjectionTarget> for ProjectionMethod {
    fn from(target: ProjectionTarget) -> Self {
        match target {
            ProjectionTarget::Pca => Self::Pca,
            ProjectionTarget::Tsne => Self::TSne,
        }
    }
}
