use thiserror::Error;

use crate::config_manager::ConfigError;

#[derive(Error, Debug)]
pub enum FieldGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Why a raw record was refused at ingestion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing module name")]
    MissingModule,

    #[error("missing model name")]
    MissingModel,

    #[error("missing field name")]
    MissingField,

    #[error("extension of {0} declares no parent models")]
    NoParents(String),
}

pub type Result<T> = std::result::Result<T, FieldGraphError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordBundle;

    #[test]
    fn malformed_bundle_is_a_serialization_error() {
        let err = RecordBundle::from_json("{ not json").unwrap_err();
        assert!(matches!(err, FieldGraphError::Serialization(_)));
    }

    #[test]
    fn record_errors_name_the_offending_model() {
        let err = RecordError::NoParents("sale.order".to_string());
        assert_eq!(err.to_string(), "extension of sale.order declares no parent models");
    }
}
