use thiserror::Error;

/// Fatal conditions only. Parse ambiguity, low classification confidence,
/// unmapped labels and rule violations are data, never errors.
#[derive(Error, Debug)]
pub enum DigitizationError {
    #[error("Invalid taxonomy for {statement}: {details}")]
    InvalidTaxonomy { statement: String, details: String },

    #[error("Synonym '{synonym}' in {statement} maps to both '{first}' and '{second}'")]
    DuplicateSynonym {
        statement: String,
        synonym: String,
        first: String,
        second: String,
    },

    #[error("Rule '{rule_id}' references key '{key}' which is not in the {statement} taxonomy")]
    UnknownRuleKey {
        rule_id: String,
        statement: String,
        key: String,
    },

    #[error("Invalid threshold {name} = {value}: {reason}")]
    InvalidThreshold {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DigitizationError>;
