use thiserror::Error;

#[derive(Error, Debug)]
pub enum QcError {
    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Noise analysis window is empty: starts at sample {start} but recording has {available} samples")]
    EmptyAnalysisWindow { start: usize, available: usize },

    #[error("Missing required column '{column}' in {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("No label found for cluster {0}")]
    MissingLabel(u32),

    #[error("Cluster {cluster_id} has {count} labels, expected exactly one")]
    AmbiguousLabel { cluster_id: u32, count: usize },

    #[error("Cluster {0} appears more than once in the metrics table")]
    DuplicateCluster(u32),

    #[error("Unsupported array format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QcError>;
