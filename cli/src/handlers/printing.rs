//! Handles displaying the output of various commands in a human readable format.
//!
//! The JSON artifacts are the machine readable output, these summaries go to stdout.

use std::fmt::Write;

use qfcluster_analysis::{
    Algorithm, ClusterSize,
    grid::{GridChoice, ValidityIndex},
    reduce::Projection,
    selection::Recommendation,
};
use qfcluster_core::artifacts::{ClusteringArtifact, SweepArtifact};

fn optional(k: Option<usize>) -> String {
    k.map_or_else(|| "n/a".to_string(), |k| k.to_string())
}

/// The parameters of a density-based algorithm, the name of any other.
fn parameters(algorithm: &Algorithm) -> String {
    match algorithm {
        Algorithm::DensityBased { eps, min_points } => {
            format!("dbscan(eps={eps}, min_points={min_points})")
        }
        Algorithm::DensityBasedHierarchical {
            min_points,
            min_cluster_size,
            ..
        } => format!("hdbscan(min_points={min_points}, min_cluster_size={min_cluster_size})"),
        other => other.to_string(),
    }
}

fn grid_choice(choice: Option<&GridChoice>) -> String {
    choice.map_or_else(
        || "n/a".to_string(),
        |choice| {
            format!(
                "{}, k={}, noise={}, score={:.4}",
                parameters(&choice.algorithm),
                choice.k,
                choice.noise,
                choice.score
            )
        },
    )
}

fn cluster_sizes(output: &mut String, clusters: &[ClusterSize], noise: usize) -> std::fmt::Result {
    writeln!(output, "\tClusters: [")?;
    for cluster in clusters {
        writeln!(output, "\t\t{}: {} voters,", cluster.index, cluster.size)?;
    }
    writeln!(output, "\t],")?;
    write!(output, "\tNoise: {noise}")
}

pub fn sweep_summary(
    artifact: &SweepArtifact,
    recommendation: &Recommendation,
) -> Result<String, std::fmt::Error> {
    let mut output = String::new();

    writeln!(output, "Sweep:")?;
    writeln!(
        output,
        "\tVoters: {}, Projects: {}",
        artifact.voters, artifact.projects
    )?;
    writeln!(
        output,
        "\tRuns: {}, Failures: {}",
        artifact.runs.len(),
        artifact.failures.len()
    )?;

    if !artifact.elbow.k.is_empty() {
        writeln!(output, "\tWCSS: [")?;
        for (k, wcss) in artifact.elbow.k.iter().zip(&artifact.elbow.wcss) {
            writeln!(output, "\t\tk={k}: {wcss:.4},")?;
        }
        writeln!(output, "\t],")?;
    }
    let criteria = &artifact.information_criteria;
    if !criteria.k.is_empty() {
        writeln!(output, "\tBIC / AIC: [")?;
        for ((k, bic), aic) in criteria.k.iter().zip(&criteria.bic).zip(&criteria.aic) {
            writeln!(output, "\t\tk={k}: {bic:.4} / {aic:.4},")?;
        }
        writeln!(output, "\t],")?;
    }

    writeln!(output, "\tRecommended k:")?;
    writeln!(output, "\t\tElbow: {}", optional(recommendation.elbow_k))?;
    writeln!(output, "\t\tMin BIC: {}", optional(recommendation.min_bic_k))?;
    write!(output, "\t\tMin AIC: {}", optional(recommendation.min_aic_k))?;

    if artifact.density_grid.is_some() {
        write!(output, "\n\tBest density parameters:")?;
        for index in ValidityIndex::ALL {
            write!(
                output,
                "\n\t\t{index}: {}",
                grid_choice(recommendation.density.get(index))
            )?;
        }
    }

    Ok(output)
}

pub fn clustering_summary(artifact: &ClusteringArtifact) -> Result<String, std::fmt::Error> {
    let mut output = String::new();

    writeln!(output, "Clustering:")?;
    writeln!(output, "\tAlgorithm: {}", artifact.algorithm)?;
    writeln!(output, "\tk: {}", artifact.k)?;
    writeln!(output, "\tIterations: {}", artifact.iterations)?;
    cluster_sizes(&mut output, &artifact.clusters, artifact.noise)?;

    Ok(output)
}

pub fn projection_summary(projection: &Projection) -> Result<String, std::fmt::Error> {
    let mut output = String::new();

    writeln!(output, "Projection:")?;
    writeln!(output, "\tMethod: {}", projection.method)?;
    write!(output, "\tPoints: {}", projection.points.len())?;
    if let Some(ratios) = &projection.explained_variance_ratio {
        let ratios = ratios
            .iter()
            .map(|r| format!("{r:.4}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(output, "\n\tExplained variance ratio: [{ratios}]")?;
    }

    Ok(output)
}
