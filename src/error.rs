use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArrError {
    #[error("Invalid duration for contract {contract_id}: end date {end} is not after start date {start}")]
    InvalidDuration {
        contract_id: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Invalid contract value for {context}: '{value}' must be a non-negative number")]
    InvalidAmount { context: String, value: String },

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Waterfall imbalance in {month}: opening ({opening}) + movements ({movements}) != closing ({closing})")]
    WaterfallImbalance {
        month: String,
        opening: String,
        movements: String,
        closing: String,
    },

    #[error("Contract {contract_id} does not conserve its value: expected {expected}, monthly revenue sums to {actual}")]
    ConservationViolation {
        contract_id: String,
        expected: String,
        actual: String,
    },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArrError>;
