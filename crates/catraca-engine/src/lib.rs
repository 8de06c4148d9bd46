//! Pipeline orchestration: settings, scheduling, and concurrent sync.
//!
//! This crate ties the storage and API layers into the long-running
//! attendance pipeline:
//!
//! - [`settings`] loads the staff-editable JSON file that points at the
//!   bilhetes file and sets the cycle interval and cutoff date.
//! - [`scheduler`] runs the cycle state machine on that interval,
//!   publishing its state on a `watch` channel.
//! - [`sync`] posts the unsynced backlog with bounded concurrency and a
//!   request rate cap, streaming per-record outcomes back to the caller.
//! - [`cutoff`] drops records older than the configured cutoff date.
//! - [`events`] is the bounded, drop-on-full event feed for observers.
//!
//! Everything here is cancellation-aware: a single
//! [`CancellationToken`](tokio_util::sync::CancellationToken) threads
//! through the scheduler and sync engine, and dropping it mid-cycle stops
//! work at the next step boundary without corrupting stored state.

pub mod cutoff;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod settings;
pub mod sync;

pub use cutoff::filter_by_cutoff;
pub use error::{EngineError, EngineResult};
pub use events::{EventSender, PipelineEvent};
pub use scheduler::{CycleState, Scheduler, SchedulerConfig};
pub use settings::{CycleSettings, SettingsStore};
pub use sync::{SyncDispatch, SyncEngine, SyncEngineConfig, SyncOutcome};
