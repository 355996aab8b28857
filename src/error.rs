// Error type for the I/O edges of the crate.
//
// The scoring engine itself never fails: unreadable values become `None`.
// Only reading files, persisting mappings and writing reports can error.
use crate::types::CanonicalField;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RiskError {
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Required fields are not mapped: {}", format_fields(.0))]
    MissingRequiredMapping(Vec<CanonicalField>),

    #[error("No dataset loaded")]
    NoDataset,
}

impl RiskError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RiskError::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, RiskError>;
