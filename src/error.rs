//! Error types for the analysis pipeline
//!
//! Pipeline errors abort the whole run before anything is persisted. Empty
//! comparison partitions are not errors; the comparison engine logs and skips them.

use thiserror::Error;

/// Errors that can occur while loading, deriving, describing or comparing tables
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Join cardinality violated in {stage} stage: more than one baseline row for key [{key}]")]
    JoinCardinality { stage: &'static str, key: String },

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Column {column} has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Column {column} has unsupported storage type {data_type}")]
    UnsupportedColumnType { column: String, data_type: String },

    #[error("Column {column} holds {value}, which does not fit its integer type")]
    IntegerOverflow { column: String, value: String },

    #[error("Column {column} has {found} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Cannot run a rank-sum test on an empty sample")]
    EmptySample,

    #[error("Distribution error: {0}")]
    Distribution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
