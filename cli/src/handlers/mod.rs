pub mod implementations;
pub mod printing;
pub mod utils;

#[cfg(test)]
mod smoke_tests;

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use qfcluster_core::config::Settings;

pub trait CommandHandler {
    type Output;

    fn handle<W1: std::fmt::Write, W2: std::fmt::Write>(
        &self,
        settings: &Settings,
        stdout: &mut W1,
        stderr: &mut W2,
    ) -> Self::Output;
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Fit every configured algorithm over the configured range of k, and write the model
    /// selection curves and every run
    Sweep {
        /// JSON weight matrix, one list of per-project weights per voter
        #[clap(value_hint = clap::ValueHint::FilePath)]
        weights: PathBuf,
    },
    /// Partition the voters with one algorithm, and write the assignment the allocation stage
    /// consumes
    Cluster {
        /// JSON weight matrix, one list of per-project weights per voter
        #[clap(value_hint = clap::ValueHint::FilePath)]
        weights: PathBuf,
        /// Which algorithm to use, its parameters come from the config when it is listed there
        #[clap(long, short, value_enum, default_value_t = AlgorithmKind::Kmeans)]
        algorithm: AlgorithmKind,
        /// Number of clusters, estimated with the elbow of a k-means sweep when omitted
        #[clap(long, short)]
        k: Option<usize>,
    },
    /// Estimate k from a stored WCSS curve
    Elbow {
        /// JSON file, either `{"wcss": [..]}` or a plain list, the first value is for k = 1
        #[clap(value_hint = clap::ValueHint::FilePath)]
        wcss: PathBuf,
    },
    /// Project the voters to two dimensions for charts
    Project {
        /// JSON weight matrix, one list of per-project weights per voter
        #[clap(value_hint = clap::ValueHint::FilePath)]
        weights: PathBuf,
        /// Projection method, defaults to the one in the config
        #[clap(long, short, value_enum)]
        method: Option<ProjectionTarget>,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, ValueEnum)]
pub enum AlgorithmKind {
    Kmeans,
    Agglomerative,
    Spectral,
    GaussianMixture,
    DensityBased,
    DensityBasedHierarchical,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, ValueEnum)]
pub enum ProjectionTarget {
    Pca,
    Tsne,
}
