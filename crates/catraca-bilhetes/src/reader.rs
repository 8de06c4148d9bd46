//! Offset-tracked reader over the growing bilhetes file.

use crate::error::{BilhetesError, Result};
use crate::offset::OffsetStore;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, warn};

/// One complete line read from the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailedLine {
    pub text: String,
    /// Byte position just past this line's terminator. Committing this
    /// value marks the line (and everything before it) as consumed.
    pub offset: u64,
}

/// Poll-once reader yielding the lines appended since the last commit.
///
/// The reader never persists progress by itself: the caller commits an
/// offset once the corresponding lines are durably ingested. On a crash
/// between read and commit the lines are read again, and the uniqueness
/// signature on access events absorbs the replay (at-least-once).
pub struct BilhetesReader {
    path: PathBuf,
    offsets: OffsetStore,
}

impl BilhetesReader {
    /// Open a reader over `path`.
    ///
    /// # Errors
    /// Returns `SourceNotFound` when the bilhetes file does not exist. A
    /// missing offset marker is not an error; it means a full read.
    pub async fn open(path: impl Into<PathBuf>, offsets: OffsetStore) -> Result<Self> {
        let path = path.into();
        match fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BilhetesError::SourceNotFound { path });
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self { path, offsets })
    }

    /// Read every complete line between the stored offset and the current
    /// end of file.
    ///
    /// Bytes after the last newline stay unconsumed until the writing
    /// turnstile finishes the line. If the file shrank below the stored
    /// offset it was truncated or rotated: the marker is reset and the
    /// whole file is read as new.
    pub async fn read_new_lines(&self) -> Result<Vec<TailedLine>> {
        let mut offset = self.offsets.load().await?;

        let metadata = match fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BilhetesError::SourceNotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let size = metadata.len();

        if size < offset {
            warn!(
                path = %self.path.display(),
                previous_offset = offset,
                current_size = size,
                "bilhetes file truncated or rotated, re-reading from the start"
            );
            self.offsets.persist(0).await?;
            offset = 0;
        }

        if size == offset {
            return Ok(Vec::new());
        }

        let buffer = self.read_from(offset, size - offset).await?;
        let lines = split_complete_lines(&buffer, offset);

        debug!(
            path = %self.path.display(),
            from_offset = offset,
            bytes_read = buffer.len(),
            lines = lines.len(),
            "new bilhetes lines read"
        );

        Ok(lines)
    }

    /// Record that everything up to `offset` was durably processed.
    pub async fn commit(&self, offset: u64) -> Result<()> {
        self.offsets.persist(offset).await
    }

    /// Drop the offset marker so the next read covers the whole file.
    pub async fn force_full_reread(&self) -> Result<()> {
        self.offsets.reset().await
    }

    async fn read_from(&self, offset: u64, max_bytes: u64) -> Result<Vec<u8>> {
        let mut file = fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        // Bounded at the size observed above so a file growing mid-read
        // does not extend this poll.
        let mut buffer = Vec::with_capacity(max_bytes as usize);
        file.take(max_bytes).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }
}

/// Split a chunk into complete lines, dropping a trailing partial line.
///
/// `base` is the file offset of the chunk's first byte; each returned
/// line carries the offset just past its `\n`.
fn split_complete_lines(buffer: &[u8], base: u64) -> Vec<TailedLine> {
    let mut lines = Vec::new();
    let mut start = 0usize;

    for (i, b) in buffer.iter().enumerate() {
        if *b == b'\n' {
            let raw = &buffer[start..i];
            let text = String::from_utf8_lossy(raw)
                .trim_end_matches('\r')
                .to_string();
            lines.push(TailedLine {
                text,
                offset: base + i as u64 + 1,
            });
            start = i + 1;
        }
    }

    lines
}
