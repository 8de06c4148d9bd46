//! Durable byte-offset marker for a tailed file.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Side-car store holding the last durably consumed byte offset.
///
/// The marker is a plain text file containing one decimal number. A
/// missing marker means "never read", so the next read starts at byte 0.
#[derive(Debug, Clone)]
pub struct OffsetStore {
    path: PathBuf,
}

impl OffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored offset, or 0 when no marker exists.
    ///
    /// A marker that does not parse as a number is treated like a missing
    /// one: the file is re-read from the start and the duplicate guard on
    /// ingestion absorbs the replay.
    pub async fn load(&self) -> Result<u64> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => match content.trim().parse::<u64>() {
                Ok(offset) => Ok(offset),
                Err(_) => {
                    warn!(
                        path = %self.path.display(),
                        content = %content.trim(),
                        "offset marker corrupted, re-reading from the start"
                    );
                    Ok(0)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a new offset.
    ///
    /// Callers persist only after the corresponding lines were fully
    /// processed downstream; a crash in between re-reads those lines.
    pub async fn persist(&self, offset: u64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, offset.to_string()).await?;
        Ok(())
    }

    /// Delete the marker so the next read covers the whole file.
    pub async fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
