use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecayError {
    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid dosing record: {0}")]
    InvalidDosing(String),

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    #[error("Mathematical error: {0}")]
    MathError(String),

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Timestamp error: {0}")]
    TimestampError(#[from] chrono::ParseError),
}
