use std::path::{Path, PathBuf};

use clap::Parser;
use pretty_assertions::{assert_eq, assert_str_eq};
use qfcluster_analysis::grid::DensityGrid;
use qfcluster_core::config::Settings;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

use crate::handlers::{AlgorithmKind, Command, CommandHandler, ProjectionTarget};

/// Two groups of three voters each backing a different project, plus a lone voter.
const WEIGHTS: &str = r"[
    [10.0, 0.0, 1.0],
    [11.0, 0.5, 1.0],
    [9.5, 0.0, 0.0],
    [0.0, 10.0, 1.0],
    [0.5, 11.0, 0.0],
    [0.0, 9.0, 1.0],
    [5.0, 5.0, 20.0]
]";

struct Workspace {
    dir: TempDir,
    settings: Settings,
}

impl Workspace {
    fn weights(&self) -> PathBuf {
        self.dir.path().join("weights.json")
    }

    fn read(&self, name: &str) -> Value {
        let contents = std::fs::read_to_string(self.settings.output.directory.join(name)).unwrap();
        serde_json::from_str(&contents).unwrap()
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("weights.json"), WEIGHTS).unwrap();

    let mut settings = Settings::default();
    settings.output.directory = dir.path().join("out");
    settings.sweep.k_max = 5;
    settings.sweep.n_runs = 3;

    Workspace { dir, settings }
}

fn run(command: &Command, settings: &Settings) -> (String, String) {
    let mut stdout = String::new();
    let mut stderr = String::new();
    command.handle(settings, &mut stdout, &mut stderr).unwrap();
    (stdout, stderr)
}

#[test]
fn test_cli_args_parse() {
    let args = vec!["qfcluster", "--seed", "7", "--k-max", "12"];
    let flags = crate::Flags::try_parse_from(args);
    assert!(flags.is_ok());
    let flags = flags.unwrap();
    assert_eq!(flags.seed, Some(7));
    assert_eq!(flags.k_max, Some(12));
    assert!(flags.subcommand.is_none());

    let overrides = flags.overrides();
    assert_eq!(overrides.seed, Some(7));
    assert_eq!(overrides.k_max, Some(12));
    assert_eq!(overrides.k_min, None);
    assert!(!overrides.density_grid);

    let flags = crate::Flags::try_parse_from(["qfcluster", "--density-grid"]).unwrap();
    assert!(flags.overrides().density_grid);
}

#[rstest]
#[case::sweep(&["qfcluster", "sweep", "w.json"], Command::Sweep { weights: "w.json".into() })]
#[case::cluster_default(
    &["qfcluster", "cluster", "w.json"],
    Command::Cluster { weights: "w.json".into(), algorithm: AlgorithmKind::Kmeans, k: None },
)]
#[case::cluster(
    &["qfcluster", "cluster", "w.json", "--algorithm", "density-based-hierarchical", "-k", "3"],
    Command::Cluster { weights: "w.json".into(), algorithm: AlgorithmKind::DensityBasedHierarchical, k: Some(3) },
)]
#[case::elbow(&["qfcluster", "elbow", "wcss.json"], Command::Elbow { wcss: "wcss.json".into() })]
#[case::project(
    &["qfcluster", "project", "w.json", "--method", "tsne"],
    Command::Project { weights: "w.json".into(), method: Some(ProjectionTarget::Tsne) },
)]
fn test_cli_subcommands_parse(#[case] args: &[&str], #[case] expected: Command) {
    let flags = crate::Flags::try_parse_from(args).unwrap();
    assert_eq!(flags.subcommand, Some(expected));
}

#[rstest]
fn test_sweep_command(workspace: Workspace) {
    let command = Command::Sweep {
        weights: workspace.weights(),
    };

    let (stdout, stderr) = run(&command, &workspace.settings);

    assert!(stdout.starts_with("Sweep:\n\tVoters: 7, Projects: 3\n"), "{stdout}");
    assert!(stdout.contains("Recommended k:"));
    assert_str_eq!(stderr, "");

    let artifact = workspace.read("sweep.json");
    assert_eq!(artifact["voters"], json!(7));
    assert_eq!(artifact["elbow"]["k"], json!([1, 2, 3, 4, 5]));
    assert_eq!(artifact["information_criteria"]["k"], json!([1, 2, 3, 4, 5]));
    // k-means then the gaussian mixture, each over k = 1..=5
    assert_eq!(artifact["runs"].as_array().unwrap().len(), 10);
}

#[rstest]
fn test_sweep_command_with_density_grid(mut workspace: Workspace) {
    workspace.settings.sweep.density_grid = Some(DensityGrid {
        eps: vec![0.5, 1.0],
        min_points: vec![2],
        min_cluster_size: vec![3],
    });
    let command = Command::Sweep {
        weights: workspace.weights(),
    };

    let (stdout, _) = run(&command, &workspace.settings);

    assert!(stdout.contains("\tBest density parameters:\n"), "{stdout}");
    let artifact = workspace.read("sweep.json");
    assert_eq!(artifact["density_grid"]["points"].as_array().unwrap().len(), 3);
    // the grid is reported on its own, not mixed into the runs
    assert_eq!(artifact["runs"].as_array().unwrap().len(), 10);
}

#[rstest]
fn test_sweep_command_reports_failures(mut workspace: Workspace) {
    workspace.settings.sweep.k_max = 8;
    let command = Command::Sweep {
        weights: workspace.weights(),
    };

    let (_, stderr) = run(&command, &workspace.settings);

    assert!(stderr.contains("kmeans failed for k=8"), "{stderr}");
    let artifact = workspace.read("sweep.json");
    assert!(!artifact["failures"].as_array().unwrap().is_empty());
}

#[rstest]
fn test_cluster_command_with_k(workspace: Workspace) {
    let command = Command::Cluster {
        weights: workspace.weights(),
        algorithm: AlgorithmKind::Agglomerative,
        k: Some(3),
    };

    let (stdout, stderr) = run(&command, &workspace.settings);

    assert!(stdout.starts_with("Clustering:\n\tAlgorithm: agglomerative\n\tk: 3\n"), "{stdout}");
    assert_str_eq!(stderr, "");

    let artifact = workspace.read("clustering.json");
    assert_eq!(artifact["k"], json!(3));
    assert_eq!(artifact["noise"], json!(0));
    let assignments = artifact["assignments"].as_array().unwrap();
    assert_eq!(assignments.len(), 7);
    assert_eq!(assignments[0], json!(0));
    assert_eq!(assignments[0], assignments[1]);
    assert_eq!(assignments[0], assignments[2]);
    assert_eq!(assignments[3], assignments[4]);
    assert_eq!(assignments[3], assignments[5]);
    assert_ne!(assignments[0], assignments[3]);
    assert_ne!(assignments[6], assignments[0]);
    assert_ne!(assignments[6], assignments[3]);
}

#[rstest]
fn test_cluster_command_estimates_k(workspace: Workspace) {
    let command = Command::Cluster {
        weights: workspace.weights(),
        algorithm: AlgorithmKind::Kmeans,
        k: None,
    };

    let (_, stderr) = run(&command, &workspace.settings);

    assert!(stderr.starts_with("No k given, using k="), "{stderr}");
    let artifact = workspace.read("clustering.json");
    let k = artifact["k"].as_u64().unwrap();
    assert!((2..=5).contains(&k));
}

#[rstest]
fn test_cluster_command_density_based_discovers_k(workspace: Workspace) {
    let command = Command::Cluster {
        weights: workspace.weights(),
        algorithm: AlgorithmKind::DensityBasedHierarchical,
        k: None,
    };
    let mut settings = workspace.settings.clone();
    settings.sweep.algorithms.push(qfcluster_analysis::Algorithm::DensityBasedHierarchical {
        min_points: 2,
        min_cluster_size: 3,
        allow_single_cluster: false,
    });

    let (_, stderr) = run(&command, &settings);

    assert_str_eq!(stderr, "");
    let artifact = workspace.read("clustering.json");
    let clusters = artifact["clusters"].as_array().unwrap();
    let clustered: u64 = clusters.iter().map(|c| c["size"].as_u64().unwrap()).sum();
    assert_eq!(clustered + artifact["noise"].as_u64().unwrap(), 7);
}

#[rstest]
#[case::wrapped(r#"{"wcss": [100, 80, 60, 55, 53, 52]}"#)]
#[case::bare("[100, 80, 60, 55, 53, 52]")]
fn test_elbow_command(workspace: Workspace, #[case] contents: &str) {
    let path = workspace.dir.path().join("wcss.json");
    std::fs::write(&path, contents).unwrap();

    let (stdout, _) = run(&Command::Elbow { wcss: path }, &workspace.settings);

    assert_str_eq!(stdout, "Estimated optimal k: 2\n");
}

#[rstest]
fn test_elbow_command_needs_two_points(workspace: Workspace) {
    let path = workspace.dir.path().join("wcss.json");
    std::fs::write(&path, "[100]").unwrap();

    let mut stdout = String::new();
    let mut stderr = String::new();
    let result = Command::Elbow { wcss: path }.handle(&workspace.settings, &mut stdout, &mut stderr);

    assert!(result.is_err());
}

#[rstest]
fn test_project_command(workspace: Workspace) {
    let command = Command::Project {
        weights: workspace.weights(),
        method: None,
    };

    let (stdout, _) = run(&command, &workspace.settings);

    assert!(stdout.starts_with("Projection:\n\tMethod: pca\n\tPoints: 7\n"), "{stdout}");
    let artifact = workspace.read("projection.json");
    assert_eq!(artifact["method"], json!("pca"));
    assert_eq!(artifact["points"].as_array().unwrap().len(), 7);
}

#[rstest]
fn test_missing_weights_file(workspace: Workspace) {
    let command = Command::Sweep {
        weights: Path::new("does/not/exist.json").to_path_buf(),
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    let result = command.handle(&workspace.settings, &mut stdout, &mut stderr);

    assert!(result.is_err());
    assert_str_eq!(stdout, "");
}
