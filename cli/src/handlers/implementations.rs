use anyhow::Context as _;
use log::debug;

use qfcluster_analysis::{
    StandardizedMatrix, Sweep,
    reduce::{Projection, ProjectionMethod},
};
use qfcluster_core::{
    artifacts::{
        CLUSTERING_ARTIFACT, ClusteringArtifact, PROJECTION_ARTIFACT, SWEEP_ARTIFACT,
        SweepArtifact, artifact_path, load_wcss, load_weights, write_json,
    },
    config::Settings,
};

use crate::handlers::{
    AlgorithmKind,
    printing,
    utils::resolve_algorithm,
};

use super::{Command, CommandHandler};

impl CommandHandler for Command {
    type Output = anyhow::Result<()>;

    fn handle<W1: std::fmt::Write, W2: std::fmt::Write>(
        &self,
        settings: &Settings,
        stdout: &mut W1,
        stderr: &mut W2,
    ) -> Self::Output {
        match self {
            Self::Sweep { weights } => {
                let matrix = load_weights(weights)?;
                let data = matrix.standardize(&settings.standardize)?;

                let report = Sweep::from(&settings.sweep).run(&data)?;
                let artifact = SweepArtifact::new(matrix.nvoters(), matrix.nprojects(), &report);

                let path = artifact_path(&settings.output.directory, SWEEP_ARTIFACT);
                write_json(&path, &artifact)?;

                for failure in &artifact.failures {
                    writeln!(
                        stderr,
                        "{} failed for k={}: {}",
                        failure.algorithm,
                        failure.k.map_or_else(|| "-".to_string(), |k| k.to_string()),
                        failure.error
                    )?;
                }
                writeln!(
                    stdout,
                    "{}",
                    printing::sweep_summary(&artifact, &report.recommendation())?
                )?;
                writeln!(stdout, "Wrote {}", path.display())?;
                Ok(())
            }
            Self::Cluster {
                weights,
                algorithm,
                k,
            } => {
                let matrix = load_weights(weights)?;
                let data = matrix.standardize(&settings.standardize)?;
                let algorithm = resolve_algorithm(*algorithm, settings);

                let k = match k {
                    Some(k) => Some(*k),
                    None if algorithm.requires_k() => {
                        let k = estimate_k(&data, settings)?;
                        writeln!(
                            stderr,
                            "No k given, using k={k} from the elbow of the k-means WCSS curve"
                        )?;
                        Some(k)
                    }
                    None => None,
                };

                let run = algorithm.fit(&data, k, &settings.sweep.run_options())?;
                if let Some(warning) = &run.warning {
                    writeln!(stderr, "Warning: {warning}")?;
                }
                let artifact = ClusteringArtifact::new(matrix.nvoters(), matrix.nprojects(), &run);

                let path = artifact_path(&settings.output.directory, CLUSTERING_ARTIFACT);
                write_json(&path, &artifact)?;

                writeln!(stdout, "{}", printing::clustering_summary(&artifact)?)?;
                writeln!(stdout, "Wrote {}", path.display())?;
                Ok(())
            }
            Self::Elbow { wcss } => {
                let curve = load_wcss(wcss)?;
                let k = curve
                    .elbow()
                    .with_context(|| format!("Could not find the elbow of {}", wcss.display()))?;
                writeln!(stdout, "Estimated optimal k: {k}")?;
                Ok(())
            }
            Self::Project { weights, method } => {
                let matrix = load_weights(weights)?;
                let data = matrix.standardize(&settings.standardize)?;
                let method = method.map_or(settings.output.projection, ProjectionMethod::from);

                let projection = Projection::project(&data, method, settings.sweep.seed)?;

                let path = artifact_path(&settings.output.directory, PROJECTION_ARTIFACT);
                write_json(&path, &projection)?;

                writeln!(stdout, "{}", printing::projection_summary(&projection)?)?;
                writeln!(stdout, "Wrote {}", path.display())?;
                Ok(())
            }
        }
    }
}

/// Sweep k-means over the configured range of k and take the elbow of its WCSS curve.
fn estimate_k(data: &StandardizedMatrix, settings: &Settings) -> anyhow::Result<usize> {
    let sweep = Sweep {
        algorithms: vec![resolve_algorithm(AlgorithmKind::Kmeans, settings)],
        density_grid: None,
        ..Sweep::from(&settings.sweep)
    };
    let report = sweep.run(data)?;
    let curve = report.wcss_curve();
    debug!("Estimating k from a WCSS curve over k={:?}", curve.ks());

    curve.elbow().context(
        "Could not estimate k, pass --k or widen the sweep range so the WCSS curve has two points",
    )
}
