//! Handles the configuration of qfcluster.
//!
//! Settings are layered: the embedded defaults ([`DEFAULT_CONFIG`]), then the config file if one
//! is given, then `QFCLUSTER_` environment variables, then command line overrides.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use std::{path::PathBuf, str::FromStr};

use qfcluster_analysis::{
    Algorithm, RunOptions, Standardizer, Sweep,
    clustering::{CovarianceType, KMeansInit},
    grid::DensityGrid,
    reduce::ProjectionMethod,
};

pub static DEFAULT_CONFIG: &str = include_str!("../Qfcluster.toml");

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Settings {
    /// What level of logging to use.
    /// Default is "info".
    #[serde(default = "default_log_level")]
    #[serde(deserialize_with = "de_log_level")]
    pub log_level: log::LevelFilter,
    /// How the weight matrix is standardized.
    #[serde(default)]
    pub standardize: Standardizer,
    /// Which algorithms are fit, over which range of k.
    #[serde(default)]
    pub sweep: SweepSettings,
    /// Where artifacts go.
    #[serde(default)]
    pub output: OutputSettings,
}

impl Default for Settings {
    #[inline]
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            standardize: Standardizer::default(),
            sweep: SweepSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

/// Values given on the command line, they take precedence over everything else.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub log_level: Option<log::LevelFilter>,
    pub k_min: Option<usize>,
    pub k_max: Option<usize>,
    pub seed: Option<u64>,
    pub output_directory: Option<PathBuf>,
    /// Search the default density grid when none is configured.
    pub density_grid: bool,
}

impl Settings {
    /// Load settings from the embedded defaults, the config file, environment variables, and CLI
    /// overrides.
    ///
    /// The environment variables are prefixed with `QFCLUSTER_`, and nested keys are separated by
    /// `__` (e.g. `QFCLUSTER_SWEEP__K_MAX=12`).
    ///
    /// # Errors
    ///
    /// This function will return an error if the config file is not found or if the config file is
    /// invalid.
    #[inline]
    pub fn init(config: Option<PathBuf>, overrides: Overrides) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
        if let Some(config) = config {
            builder = builder.add_source(File::from(config));
        }
        let s = builder
            .add_source(
                Environment::with_prefix("QFCLUSTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        settings.output.directory = shellexpand::tilde(&settings.output.directory.to_string_lossy())
            .into_owned()
            .into();

        if let Some(log_level) = overrides.log_level {
            settings.log_level = log_level;
        }
        if let Some(k_min) = overrides.k_min {
            settings.sweep.k_min = k_min;
        }
        if let Some(k_max) = overrides.k_max {
            settings.sweep.k_max = k_max;
        }
        if let Some(seed) = overrides.seed {
            settings.sweep.seed = seed;
        }
        if let Some(directory) = overrides.output_directory {
            settings.output.directory = directory;
        }
        if overrides.density_grid && settings.sweep.density_grid.is_none() {
            settings.sweep.density_grid = Some(DensityGrid::default());
        }

        Ok(settings)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SweepSettings {
    /// Smallest k tried.
    /// Default is 1.
    #[serde(default = "default_k_min")]
    pub k_min: usize,
    /// Largest k tried, inclusive.
    /// Default is 10.
    #[serde(default = "default_k_max")]
    pub k_max: usize,
    /// Seed of every random generator.
    /// Default is 42.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Iteration budget of a single fit.
    /// Default is 300.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    /// Convergence threshold.
    /// Default is 1e-4.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Number of k-means restarts.
    /// Default is 10.
    #[serde(default = "default_n_runs")]
    pub n_runs: usize,
    /// Whether every run gets validity scores.
    #[serde(default)]
    pub score_validity: bool,
    /// Default is k-means++ and a full-covariance gaussian mixture.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,
    /// DBSCAN and HDBSCAN parameters to search, scored by the validity indices.
    /// Default is no search, values missing from a `[sweep.density_grid]` table take the default
    /// grid's.
    #[serde(default)]
    pub density_grid: Option<DensityGrid>,
}

const fn default_k_min() -> usize {
    1
}

const fn default_k_max() -> usize {
    10
}

const fn default_seed() -> u64 {
    42
}

const fn default_max_iterations() -> u64 {
    300
}

const fn default_tolerance() -> f64 {
    1e-4
}

const fn default_n_runs() -> usize {
    10
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![
        Algorithm::KMeans {
            init: KMeansInit::PlusPlus,
        },
        Algorithm::GaussianMixture {
            covariance: CovarianceType::Full,
        },
    ]
}

impl Default for SweepSettings {
    #[inline]
    fn default() -> Self {
        Self {
            k_min: default_k_min(),
            k_max: default_k_max(),
            seed: default_seed(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            n_runs: default_n_runs(),
            score_validity: false,
            algorithms: default_algorithms(),
            density_grid: None,
        }
    }
}

impl SweepSettings {
    #[must_use]
    #[inline]
    pub const fn run_options(&self) -> RunOptions {
        RunOptions {
            seed: self.seed,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            n_runs: self.n_runs,
        }
    }
}

impl From<&SweepSettings> for Sweep {
    #[inline]
    fn from(settings: &SweepSettings) -> Self {
        Self {
            algorithms: settings.algorithms.clone(),
            k_min: settings.k_min,
            k_max: settings.k_max,
            options: settings.run_options(),
            score_validity: settings.score_validity,
            density_grid: settings.density_grid.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct OutputSettings {
    /// Directory the artifacts are written to.
    /// Default is the current directory.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Projection used for the chart artifact.
    /// Default is "pca".
    #[serde(default)]
    pub projection: ProjectionMethod,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputSettings {
    #[inline]
    fn default() -> Self {
        Self {
            directory: default_directory(),
            projection: ProjectionMethod::default(),
        }
    }
}

fn de_log_level<'de, D>(deserializer: D) -> Result<log::LevelFilter, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(log::LevelFilter::from_str(&s).unwrap_or_else(|_| default_log_level()))
}

const fn default_log_level() -> log::LevelFilter {
    log::LevelFilter::Info
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use qfcluster_analysis::{
        clustering::Linkage,
        matrix::{DegeneratePolicy, VarianceConvention},
    };
    use rstest::rstest;

    #[derive(Debug, PartialEq, Eq, Deserialize)]
    #[serde(transparent)]
    struct LogLevelTest {
        #[serde(deserialize_with = "de_log_level")]
        log_level: log::LevelFilter,
    }

    #[rstest]
    #[case("debug", log::LevelFilter::Debug)]
    #[case("WARN", log::LevelFilter::Warn)]
    #[case("off", log::LevelFilter::Off)]
    #[case("loud", log::LevelFilter::Info)]
    fn test_de_log_level(#[case] input: &str, #[case] expected: log::LevelFilter) {
        let parsed: LogLevelTest = serde_json::from_str(&format!("\"{input}\"")).unwrap();
        assert_eq!(parsed.log_level, expected);
    }

    #[test]
    fn test_default_config_works() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, DEFAULT_CONFIG).unwrap();

        let settings = Settings::init(Some(config_path), Overrides::default());

        assert!(settings.is_ok(), "Error: {:?}", settings.err());
        assert_eq!(settings.unwrap(), Settings::default());
    }

    #[test]
    fn test_no_config_file_uses_defaults() {
        let settings = Settings::init(None, Overrides::default()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_init_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
log_level = "debug"

[standardize]
variance = "sample"
degenerate_columns = "reject"

[sweep]
k_min = 2
k_max = 8
seed = 7
max_iterations = 100
tolerance = 0.1
n_runs = 3
score_validity = true

[[sweep.algorithms]]
type = "kmeans"
init = "random"

[[sweep.algorithms]]
type = "agglomerative"
linkage = "average"

[[sweep.algorithms]]
type = "density_based_hierarchical"
min_points = 4
min_cluster_size = 6

[sweep.density_grid]
eps = [0.25, 0.5]
min_points = [3]

[output]
directory = "/tmp/qf"
projection = "tsne"
            "#,
        )
        .unwrap();

        let expected = Settings {
            log_level: log::LevelFilter::Debug,
            standardize: Standardizer {
                variance: VarianceConvention::Sample,
                degenerate_columns: DegeneratePolicy::Reject,
            },
            sweep: SweepSettings {
                k_min: 2,
                k_max: 8,
                seed: 7,
                max_iterations: 100,
                tolerance: 0.1,
                n_runs: 3,
                score_validity: true,
                algorithms: vec![
                    Algorithm::KMeans {
                        init: KMeansInit::Random,
                    },
                    Algorithm::Agglomerative {
                        linkage: Linkage::Average,
                    },
                    Algorithm::DensityBasedHierarchical {
                        min_points: 4,
                        min_cluster_size: 6,
                        allow_single_cluster: false,
                    },
                ],
                density_grid: Some(DensityGrid {
                    eps: vec![0.25, 0.5],
                    min_points: vec![3],
                    ..DensityGrid::default()
                }),
            },
            output: OutputSettings {
                directory: "/tmp/qf".into(),
                projection: ProjectionMethod::TSne,
            },
        };

        let settings = Settings::init(Some(config_path), Overrides::default()).unwrap();

        assert_eq!(settings, expected);
    }

    #[test]
    fn test_overrides_win() {
        let overrides = Overrides {
            log_level: Some(log::LevelFilter::Trace),
            k_min: Some(3),
            k_max: Some(4),
            seed: Some(1),
            output_directory: Some("out".into()),
            density_grid: true,
        };

        let settings = Settings::init(None, overrides).unwrap();

        assert_eq!(settings.log_level, log::LevelFilter::Trace);
        assert_eq!(settings.sweep.k_min, 3);
        assert_eq!(settings.sweep.k_max, 4);
        assert_eq!(settings.sweep.seed, 1);
        assert_eq!(settings.output.directory, PathBuf::from("out"));
        assert_eq!(settings.sweep.density_grid, Some(DensityGrid::default()));
    }

    #[test]
    fn test_sweep_from_settings() {
        let settings = SweepSettings::default();

        let sweep = Sweep::from(&settings);

        assert_eq!(sweep.k_min, 1);
        assert_eq!(sweep.k_max, 10);
        assert_eq!(sweep.options, RunOptions::default());
        assert_eq!(sweep.algorithms, default_algorithms());
        assert_eq!(sweep.density_grid, None);
    }

    #[test]
    fn test_partial_density_grid_fills_in_the_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[sweep.density_grid]\nmin_cluster_size = [5]\n").unwrap();

        let settings = Settings::init(Some(config_path), Overrides::default()).unwrap();

        let expected = DensityGrid {
            min_cluster_size: vec![5],
            ..DensityGrid::default()
        };
        assert_eq!(settings.sweep.density_grid.as_ref(), Some(&expected));
        assert_eq!(Sweep::from(&settings.sweep).density_grid, Some(expected));
    }
}
