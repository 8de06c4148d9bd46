use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Domain validation errors
    #[error("Invalid marcacao: {0}")]
    InvalidMarcacao(String),

    #[error("Invalid card format: {0}")]
    InvalidCardFormat(String),

    #[error("Invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
