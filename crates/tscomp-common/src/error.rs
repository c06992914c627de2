//! tscomp Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TscompError {
    /// A referenced chunk column has no compression role registered.
    #[error("No compression information for column \"{column}\" found")]
    MissingCompressionMetadata { column: String },

    /// The compressed relation lacks a column the chunk relies on.
    #[error("column '{column}' not found in the compressed chunk '{relation}'")]
    SchemaMismatch { column: String, relation: String },

    /// Compression settings or sort requests violate an internal invariant.
    #[error("Invalid ordering request: {0}")]
    InvalidOrderingRequest(String),

    /// An uncompressed path could not be moved to the required parameterization.
    #[error("Reparameterization failed: {0}")]
    ReparameterizationFailure(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Planning error: {0}")]
    Planner(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl TscompError {
    pub fn missing_metadata(column: impl Into<String>) -> Self {
        Self::MissingCompressionMetadata {
            column: column.into(),
        }
    }

    pub fn schema_mismatch(column: impl Into<String>, relation: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            column: column.into(),
            relation: relation.into(),
        }
    }

    /// Fatal errors abort planning of the chunk; soft errors only drop one candidate.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ReparameterizationFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, TscompError>;
