//! Reading inputs and writing the JSON artifacts the allocation stage and the chart renderers
//! consume.
//!
//! Voter, project, and cluster indexes are zero-based everywhere, and noise is `null`.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use qfcluster_analysis::{
    Algorithm, ClusterRun, ClusterSize, NonConvergenceWarning, WeightMatrix,
    clustering::MixtureScores,
    grid::{DensityRecommendation, GridPoint},
    selection::{InformationCriterionCurve, WcssCurve},
    sweep::{SweepFailure, SweepReport},
    validity::ValidityScores,
};

use crate::errors::{ArtifactError, ArtifactResult};

pub const SWEEP_ARTIFACT: &str = "sweep.json";
pub const CLUSTERING_ARTIFACT: &str = "clustering.json";
pub const PROJECTION_ARTIFACT: &str = "projection.json";

/// Read a weight matrix: a JSON list of voters, each a list of non-negative weights per project.
///
/// # Errors
///
/// Returns an error if the file can't be read, isn't JSON, or isn't a valid weight matrix.
#[inline]
pub fn load_weights(path: &Path) -> ArtifactResult<WeightMatrix> {
    let contents = fs::read_to_string(path).map_err(ArtifactError::io(path))?;
    let rows: Vec<Vec<f64>> = serde_json::from_str(&contents).map_err(ArtifactError::json(path))?;
    let matrix = WeightMatrix::try_from(rows)?;
    debug!(
        "Loaded {} voters by {} projects from {}",
        matrix.nvoters(),
        matrix.nprojects(),
        path.display()
    );
    Ok(matrix)
}

/// The accepted shapes of a stored WCSS curve.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WcssInput {
    Wrapped { wcss: Vec<f64> },
    Bare(Vec<f64>),
}

/// Read a WCSS curve, either `{"wcss": [..]}` or a plain list. The first value is for `k = 1`.
///
/// # Errors
///
/// Returns an error if the file can't be read or has neither shape.
#[inline]
pub fn load_wcss(path: &Path) -> ArtifactResult<WcssCurve> {
    let contents = fs::read_to_string(path).map_err(ArtifactError::io(path))?;
    let values = match serde_json::from_str(&contents).map_err(ArtifactError::json(path))? {
        WcssInput::Wrapped { wcss } | WcssInput::Bare(wcss) => wcss,
    };
    Ok(WcssCurve::from_values_starting_at(1, &values))
}

/// Serialize `value` as pretty JSON into `path`, creating the parent directories.
///
/// # Errors
///
/// Returns an error if the directories or the file can't be created, or serialization fails.
#[inline]
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> ArtifactResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(ArtifactError::io(parent))?;
    }
    let file = fs::File::create(path).map_err(ArtifactError::io(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(ArtifactError::io(path))?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// `directory/name`.
#[must_use]
#[inline]
pub fn artifact_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(name)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ElbowArtifact {
    pub k: Vec<usize>,
    pub wcss: Vec<f64>,
    pub estimated_k: Option<usize>,
}

impl From<&WcssCurve> for ElbowArtifact {
    #[inline]
    fn from(curve: &WcssCurve) -> Self {
        Self {
            k: curve.ks(),
            wcss: curve.values(),
            estimated_k: curve.elbow().ok(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InformationCriteriaArtifact {
    pub k: Vec<usize>,
    pub bic: Vec<f64>,
    pub aic: Vec<f64>,
    pub min_bic_k: Option<usize>,
    pub min_aic_k: Option<usize>,
}

impl From<&InformationCriterionCurve> for InformationCriteriaArtifact {
    #[inline]
    fn from(curve: &InformationCriterionCurve) -> Self {
        Self {
            k: curve.ks(),
            bic: curve.bic(),
            aic: curve.aic(),
            min_bic_k: curve.min_bic_k(),
            min_aic_k: curve.min_aic_k(),
        }
    }
}

/// One run of a sweep, with its cluster sizes spelled out.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunArtifact {
    pub algorithm: Algorithm,
    pub k: usize,
    pub assignments: Vec<Option<usize>>,
    pub clusters: Vec<ClusterSize>,
    pub noise: usize,
    pub inertia: Option<f64>,
    pub mixture: Option<MixtureScores>,
    pub iterations: u64,
    pub warning: Option<NonConvergenceWarning>,
    pub validity: Option<ValidityScores>,
}

impl From<&ClusterRun> for RunArtifact {
    #[inline]
    fn from(run: &ClusterRun) -> Self {
        let sizes = run.sizes();
        Self {
            algorithm: run.algorithm.clone(),
            k: run.k,
            assignments: run.assignment.clone(),
            clusters: sizes.clusters,
            noise: sizes.noise,
            inertia: run.inertia,
            mixture: run.mixture,
            iterations: run.iterations,
            warning: run.warning,
            validity: run.validity,
        }
    }
}

/// Everything a sweep produced: the model-selection curves and every run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SweepArtifact {
    pub voters: usize,
    pub projects: usize,
    pub elbow: ElbowArtifact,
    pub information_criteria: InformationCriteriaArtifact,
    pub runs: Vec<RunArtifact>,
    pub failures: Vec<SweepFailure>,
    /// Only present when the sweep searched a density grid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density_grid: Option<DensityGridArtifact>,
}

/// Every scored grid point and the best parameters by each validity index.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DensityGridArtifact {
    pub points: Vec<GridPoint>,
    pub best: DensityRecommendation,
}

impl SweepArtifact {
    #[must_use]
    #[inline]
    pub fn new(voters: usize, projects: usize, report: &SweepReport) -> Self {
        Self {
            voters,
            projects,
            elbow: ElbowArtifact::from(&report.wcss_curve()),
            information_criteria: InformationCriteriaArtifact::from(&report.information_criteria()),
            runs: report.runs.iter().map(RunArtifact::from).collect(),
            failures: report.failures.clone(),
            density_grid: (!report.grid.is_empty()).then(|| DensityGridArtifact {
                points: report.grid.clone(),
                best: report.density_recommendation(),
            }),
        }
    }
}

/// The chosen partition of the voters, the input of the allocation stage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusteringArtifact {
    pub voters: usize,
    pub projects: usize,
    pub k: usize,
    pub algorithm: Algorithm,
    pub assignments: Vec<Option<usize>>,
    pub clusters: Vec<ClusterSize>,
    pub noise: usize,
    pub iterations: u64,
}

impl ClusteringArtifact {
    #[must_use]
    #[inline]
    pub fn new(voters: usize, projects: usize, run: &ClusterRun) -> Self {
        let sizes = run.sizes();
        Self {
            voters,
            projects,
            k: run.k,
            algorithm: run.algorithm.clone(),
            assignments: run.assignment.clone(),
            clusters: sizes.clusters,
            noise: sizes.noise,
            iterations: run.iterations,
        }
    }
}
