//! This library contains the numeric core of voter clustering for quadratic funding rounds.
//!
//! The pipeline goes:
//!
//! 1. a [`matrix::WeightMatrix`] of voter contributions (voters are rows, projects are columns)
//!    is standardized column-wise into a [`matrix::StandardizedMatrix`],
//! 2. one or more [`clustering::Algorithm`]s are fit to it, usually through a [`sweep::Sweep`]
//!    over a range of `k`,
//! 3. [`selection`] turns the sweep into a WCSS curve and information criterion curves and
//!    recommends a `k`,
//! 4. the chosen [`clustering::ClusterRun`] is summarized by a [`sizes::ClusterSizeReport`], which
//!    is what the allocation stage consumes.
//!
//! [`reduce`] projects the matrix to two dimensions for charts, and [`validity`] scores labelings
//! that have no likelihood to compare. The density-based algorithms have no `k` to sweep, a
//! [`grid::DensityGrid`] searches their parameters instead.

#![deny(clippy::missing_inline_in_public_items)]

pub mod clustering;
pub mod errors;
pub mod grid;
pub mod matrix;
pub mod reduce;
pub mod selection;
pub mod sizes;
pub mod sweep;
pub mod utils;
pub mod validity;

/// The numeric type of every weight and derived quantity.
pub type Feature = f64;

pub use clustering::{Algorithm, ClusterRun, RunOptions};
pub use errors::{ClusteringError, ClusteringResult, NonConvergenceWarning};
pub use matrix::{StandardizedMatrix, Standardizer, WeightMatrix};
pub use sizes::{ClusterSize, ClusterSizeReport};
pub use sweep::{Sweep, SweepReport};
