use thiserror::Error;

/// Storage-specific error types for the catraca attendance pipeline.
///
/// These errors represent failures in database operations and data
/// integrity checks while ingesting turnstile events and tracking
/// their sync state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Card numeration rejected before it reached a query
    #[error("Invalid card number: {0}")]
    InvalidCard(#[from] catraca_core::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
