//! Pipeline notification channel.
//!
//! The scheduler reports progress over a bounded channel that a UI or the
//! daemon's log drain consumes. Delivery is strictly best-effort: sending
//! never blocks, and when the consumer lags the event is dropped and
//! counted instead of stalling ingestion. The database, not this channel,
//! is the source of truth.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::scheduler::CycleState;

/// Capacity of the notification buffer.
///
/// Enough to absorb a whole cycle's worth of per-record progress while the
/// consumer repaints; beyond that, old news is dropped.
pub const EVENT_BUFFER_SIZE: usize = 256;

/// What the pipeline tells its observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The scheduler moved between states
    StateChanged { from: CycleState, to: CycleState },

    /// A new cycle began
    CycleStarted { cycle_id: Uuid },

    /// The student list was refreshed from the school API
    AlunosRefreshed { total: u64 },

    /// A batch of bilhetes lines was ingested
    BatchIngested {
        lines: usize,
        created: usize,
        malformed: usize,
    },

    /// One acesso was confirmed by the school API and flagged synced
    AcessoSynced { acesso_id: i64 },

    /// One acesso failed to post this cycle; it stays unsynced
    AcessoSyncFailed { acesso_id: i64 },

    /// The cycle finished its sync step
    CycleFinished {
        cycle_id: Uuid,
        synced: usize,
        failed: usize,
    },
}

/// Non-blocking sending half of the notification channel
///
/// Clones share the drop counter.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PipelineEvent>,
    dropped: Arc<AtomicU64>,
}

/// Create the notification channel.
pub fn channel() -> (EventSender, mpsc::Receiver<PipelineEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    (
        EventSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl EventSender {
    /// Send `event` without ever waiting.
    ///
    /// A full buffer drops the event and bumps the counter. A closed
    /// channel is ignored entirely: the daemon runs headless when nobody
    /// subscribes.
    pub fn send(&self, event: PipelineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(?event, total_dropped = total, "notification buffer full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// How many events were dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
