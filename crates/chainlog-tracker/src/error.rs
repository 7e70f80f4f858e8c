use chainlog_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the logging layer itself. None of these reach the chain engine.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Unknown chain type '{0}': no output field mapping")]
    UnknownChainType(String),
    #[error("Duplicate run id: {0}")]
    DuplicateRunId(Uuid),
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),
    #[error("Chain type {chain_type} produced no '{field}' output")]
    MissingOutputField { chain_type: String, field: String },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl TrackerError {
    /// Short label used for fault records and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::UnknownChainType(_) => "unknown_chain_type",
            TrackerError::DuplicateRunId(_) => "duplicate_run_id",
            TrackerError::RunNotFound(_) => "run_not_found",
            TrackerError::MissingOutputField { .. } => "missing_output_field",
            TrackerError::Store(StoreError::Corrupt { .. }) => "store_corrupt",
            TrackerError::Store(_) => "store_io",
            TrackerError::Metrics(_) => "metrics",
        }
    }
}

/// Chain-type-specific configuration could not be read; the run keeps its
/// common fields only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Config extraction failed for {chain_type}: {reason}")]
pub struct ConfigExtractionWarning {
    pub chain_type: String,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, TrackerError>;
