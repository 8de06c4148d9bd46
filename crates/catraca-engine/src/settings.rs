//! Staff-editable pipeline settings.
//!
//! Settings live in a small JSON file that is re-read at the start of every
//! scheduler cycle, so an edit takes effect at the next cycle without
//! restarting the daemon. Missing keys (or a missing file) fall back to
//! defaults, and the completed file is written back so staff always find
//! every key in place when they open it.
//!
//! The API key is deliberately not here; it comes from the environment and
//! never touches disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use catraca_core::constants::{
    DEFAULT_CUTOFF, DEFAULT_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES,
};
use catraca_core::parse_cutoff_date;

use crate::error::{EngineError, EngineResult};

/// On-disk shape of the settings file
///
/// Every key is optional on read; absent keys are filled with defaults and
/// the merged result is written back.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SettingsFile {
    /// Path of the turnstile log file to tail
    #[serde(default)]
    bilhetes_path: Option<String>,

    /// Minutes between cycles
    #[serde(default)]
    interval: Option<u32>,

    /// Oldest swipe date pushed to the API, `dd/mm/yyyy`
    #[serde(default)]
    cutoff: Option<String>,
}

/// Settings resolved for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    /// Source file to ingest; `None` when staff have not configured one yet
    pub bilhetes_path: Option<PathBuf>,

    /// Minutes between cycles, already clamped to the valid range
    pub interval_minutes: u32,

    /// Inclusive lower bound on swipe dates pushed to the API
    pub cutoff: NaiveDate,
}

impl CycleSettings {
    /// The wait between cycles as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            bilhetes_path: None,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            cutoff: default_cutoff(),
        }
    }
}

fn default_cutoff() -> NaiveDate {
    // The constant is a valid dd/mm/yyyy literal
    parse_cutoff_date(DEFAULT_CUTOFF).unwrap_or_default()
}

/// Reads and maintains the settings file
///
/// # Example
///
/// ```no_run
/// use catraca_engine::SettingsStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SettingsStore::new("/var/lib/catraca/settings.json");
/// let settings = store.load().await?;
/// println!("interval: {} min", settings.interval_minutes);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the settings, creating or completing the file as needed.
    ///
    /// Invalid values degrade per key: an unparsable cutoff or an
    /// out-of-range interval is warned about and replaced in memory only,
    /// leaving the file exactly as staff wrote it. A file that fails to
    /// parse as JSON is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error only when an existing file cannot be read at all
    /// (for example a permission problem). The scheduler treats that as a
    /// recoverable skip of the cycle.
    pub async fn load(&self) -> EngineResult<CycleSettings> {
        let (file, missing_keys) = match fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str::<SettingsFile>(&raw) {
                Ok(file) => {
                    let missing = file.bilhetes_path.is_none()
                        || file.interval.is_none()
                        || file.cutoff.is_none();
                    (file, missing)
                }
                Err(e) => {
                    // Staff may be mid-edit; use defaults for this cycle
                    // but never clobber a file that failed to parse
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "settings file is not valid JSON, using defaults for this cycle"
                    );
                    return Ok(resolve(&SettingsFile::default()));
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (SettingsFile::default(), true),
            Err(e) => {
                return Err(EngineError::SettingsIo {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let file = with_defaults(file);

        if missing_keys {
            if let Err(e) = self.write(&file).await {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not write settings defaults back"
                );
            }
        }

        Ok(resolve(&file))
    }

    async fn write(&self, file: &SettingsFile) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(file).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, json).await
    }
}

fn with_defaults(mut file: SettingsFile) -> SettingsFile {
    file.bilhetes_path.get_or_insert_with(String::new);
    file.interval.get_or_insert(DEFAULT_INTERVAL_MINUTES);
    file.cutoff.get_or_insert_with(|| DEFAULT_CUTOFF.to_string());
    file
}

fn resolve(file: &SettingsFile) -> CycleSettings {
    let bilhetes_path = file
        .bilhetes_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    let interval_minutes = file
        .interval
        .unwrap_or(DEFAULT_INTERVAL_MINUTES)
        .clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);

    let cutoff = match file.cutoff.as_deref() {
        None => default_cutoff(),
        Some(raw) => match parse_cutoff_date(raw) {
            Ok(date) => date,
            Err(e) => {
                warn!(value = raw, error = %e, "cutoff setting unparsable, keeping default");
                default_cutoff()
            }
        },
    };

    CycleSettings {
        bilhetes_path,
        interval_minutes,
        cutoff,
    }
}
