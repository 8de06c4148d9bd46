use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BilhetesError {
    // Parse errors - one bad line is skipped, never fatal
    #[error("Line has {found} fields, expected at least 5: '{line}'")]
    TooFewTokens { line: String, found: usize },

    #[error("Invalid date in bilhete: '{value}'")]
    InvalidDate { value: String },

    #[error("Invalid time in bilhete: '{value}'")]
    InvalidTime { value: String },

    #[error("Invalid field in bilhete: {0}")]
    Field(#[from] catraca_core::Error),

    // IO errors - abort the current cycle, retried next interval
    #[error("Bilhetes file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BilhetesError {
    /// Whether this error means the input line was malformed (skip and
    /// continue) rather than the read itself failing.
    #[must_use]
    pub fn is_malformed_line(&self) -> bool {
        matches!(
            self,
            BilhetesError::TooFewTokens { .. }
                | BilhetesError::InvalidDate { .. }
                | BilhetesError::InvalidTime { .. }
                | BilhetesError::Field(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BilhetesError>;
