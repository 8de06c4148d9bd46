use std::path::PathBuf;

use thiserror::Error;

use catraca_bilhetes::BilhetesError;
use catraca_storage::StorageError;

/// Errors surfaced by the pipeline orchestration layer
///
/// Per-record API failures never become an `EngineError`; they stay inside
/// the sync engine as outcome entries. What propagates here is what makes
/// a cycle step impossible to complete.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Reading or parsing the bilhetes file failed
    #[error("Bilhetes error: {0}")]
    Bilhetes(#[from] BilhetesError),

    /// A database operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The settings file exists but could not be read
    #[error("Settings file error at {}: {}", path.display(), source)]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
