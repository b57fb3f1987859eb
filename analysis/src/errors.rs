use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Column {column} has zero variance and cannot be standardized")]
    DegenerateColumn { column: usize },
    #[error("Invalid number of clusters k={k}, expected 1 <= k <= {n}")]
    InvalidK { k: usize, n: usize },
    #[error("Not enough data: need at least {needed} values, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] linfa_linalg::LinalgError),
    #[error("Invalid DBSCAN parameters: {0}")]
    Dbscan(#[from] linfa_clustering::DbscanParamsError),
    #[error("Failed to project data: {0}")]
    Reduction(#[from] linfa_reduction::ReductionError),
    #[error("Failed to embed data with t-SNE: {0}")]
    TSne(#[from] linfa_tsne::TSneError),
}

pub type ClusteringResult<T> = Result<T, ClusteringError>;

/// Raised (as a value, never as an `Err`) when an iterative fit hits its iteration budget.
///
/// The run that carries it still holds the best iterate that was found.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[error("Did not converge within {max_iterations} iterations")]
pub struct NonConvergenceWarning {
    pub max_iterations: u64,
}
