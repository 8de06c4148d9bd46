//! Scheduler loop for the attendance pipeline.
//!
//! One cycle walks the whole pipeline: re-read the staff settings, refresh
//! the student list, ingest new bilhetes lines, post the unsynced backlog,
//! then wait out the configured interval. The loop never ends on its own;
//! only the cancellation token stops it.
//!
//! # States
//!
//! - `Idle`: created, not yet running
//! - `FetchingPath`: re-reading settings for this cycle
//! - `SyncingStudents`: refreshing the local student cache from the API
//! - `Ingesting`: reading and storing new bilhetes lines
//! - `Syncing`: posting the unsynced backlog
//! - `Waiting`: sleeping until the next cycle
//! - `Stopped`: terminal, reached only through cancellation
//!
//! # Valid Transitions
//!
//! - Idle → FetchingPath → SyncingStudents → Ingesting → Syncing → Waiting
//! - Waiting → FetchingPath (next cycle)
//! - FetchingPath/SyncingStudents/Ingesting → Waiting (step skipped or failed)
//! - any state → Stopped (cancellation)
//!
//! A step failure never escapes the cycle: it is logged with the cycle id,
//! the remaining steps are abandoned and the loop waits for the next
//! interval. An unconfigured or missing bilhetes file and a failed student
//! list fetch are expected conditions, handled the same way at lower log
//! volume.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use catraca_api::{AlunoRecord, FrequenciaApi};
use catraca_bilhetes::{BilhetesError, BilhetesReader, OffsetStore, parse_line};
use catraca_storage::{
    AcessoRepository, Aluno, AlunoRepository, Database, SqliteAcessoRepository,
    SqliteAlunoRepository,
};

use crate::cutoff::filter_by_cutoff;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventSender, PipelineEvent};
use crate::settings::{CycleSettings, SettingsStore};
use crate::sync::{SyncEngine, SyncEngineConfig, SyncOutcome};

/// Capacity of the per-cycle outcome channel between the sync engine and
/// the scheduler's drain loop. The drain runs concurrently, so this only
/// smooths bursts of completions.
const SYNC_RESULTS_BUFFER: usize = 64;

/// Scheduler lifecycle states
///
/// Published on a `watch` channel so a UI can render the current phase
/// without polling the scheduler itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Created, not yet running
    Idle,

    /// Re-reading staff settings for this cycle
    FetchingPath,

    /// Refreshing the local student cache from the school API
    SyncingStudents,

    /// Reading and storing new bilhetes lines
    Ingesting,

    /// Posting the unsynced backlog to the school API
    Syncing,

    /// Sleeping until the next cycle
    Waiting,

    /// Terminal state, reached only through cancellation
    Stopped,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            CycleState::Idle => "Idle",
            CycleState::FetchingPath => "FetchingPath",
            CycleState::SyncingStudents => "SyncingStudents",
            CycleState::Ingesting => "Ingesting",
            CycleState::Syncing => "Syncing",
            CycleState::Waiting => "Waiting",
            CycleState::Stopped => "Stopped",
        };
        write!(f, "{}", state_str)
    }
}

impl CycleState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use catraca_engine::CycleState;
    ///
    /// assert!(CycleState::Idle.can_transition_to(&CycleState::FetchingPath));
    /// assert!(!CycleState::Idle.can_transition_to(&CycleState::Syncing));
    /// ```
    pub fn can_transition_to(&self, target: &CycleState) -> bool {
        matches!(
            (self, target),
            // Cycle advance
            (CycleState::Idle, CycleState::FetchingPath)
                | (CycleState::FetchingPath, CycleState::SyncingStudents)
                | (CycleState::SyncingStudents, CycleState::Ingesting)
                | (CycleState::Ingesting, CycleState::Syncing)
                | (CycleState::Syncing, CycleState::Waiting)
                | (CycleState::Waiting, CycleState::FetchingPath)
                // A skipped or failed step ends the cycle early
                | (
                    CycleState::FetchingPath
                        | CycleState::SyncingStudents
                        | CycleState::Ingesting,
                    CycleState::Waiting,
                )
                // Cancellation wins from anywhere
                | (
                    CycleState::Idle
                        | CycleState::FetchingPath
                        | CycleState::SyncingStudents
                        | CycleState::Ingesting
                        | CycleState::Syncing
                        | CycleState::Waiting,
                    CycleState::Stopped,
                )
        )
    }

    /// Whether this state has no way out.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleState::Stopped)
    }
}

/// Wiring for the scheduler
pub struct SchedulerConfig {
    /// Where the staff settings file lives
    pub settings: SettingsStore,

    /// Throttles for the sync engine
    pub sync: SyncEngineConfig,

    /// Shared shutdown signal
    pub cancel_token: CancellationToken,
}

/// Drives the pipeline: one full cycle per interval until cancelled
pub struct Scheduler<A> {
    acessos: SqliteAcessoRepository,
    alunos: SqliteAlunoRepository,
    api: Arc<A>,
    engine: SyncEngine<A>,
    settings: SettingsStore,
    events: EventSender,
    state_tx: watch::Sender<CycleState>,
    cancel: CancellationToken,
}

impl<A: FrequenciaApi + 'static> Scheduler<A> {
    pub fn new(
        database: &Database,
        api: Arc<A>,
        events: EventSender,
        config: SchedulerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(CycleState::Idle);
        Self {
            acessos: SqliteAcessoRepository::new(database.pool().clone()),
            alunos: SqliteAlunoRepository::new(database.pool().clone()),
            engine: SyncEngine::new(Arc::clone(&api), config.sync, config.cancel_token.clone()),
            api,
            settings: config.settings,
            events,
            state_tx,
            cancel: config.cancel_token,
        }
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<CycleState> {
        self.state_tx.subscribe()
    }

    /// Clone of the shutdown signal this scheduler obeys.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the cancellation token fires.
    pub async fn run(self) {
        info!(settings = %self.settings.path().display(), "scheduler started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let cycle_id = Uuid::new_v4();
            let settings = self.run_cycle(cycle_id).await;

            if self.wait(settings.interval()).await {
                break;
            }
        }

        self.transition(CycleState::Stopped);
        info!("scheduler stopped");
    }

    /// One full pipeline cycle. Always ends in `Waiting`; returns the
    /// settings that were in force so the caller knows how long to wait.
    async fn run_cycle(&self, cycle_id: Uuid) -> CycleSettings {
        self.transition(CycleState::FetchingPath);
        self.events.send(PipelineEvent::CycleStarted { cycle_id });

        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(cycle = %cycle_id, error = %e, "settings unavailable, skipping cycle");
                self.transition(CycleState::Waiting);
                return CycleSettings::default();
            }
        };

        let Some(bilhetes_path) = settings.bilhetes_path.clone() else {
            debug!(cycle = %cycle_id, "no bilhetes path configured, nothing to do");
            self.transition(CycleState::Waiting);
            return settings;
        };

        if self.cycle_interrupted() {
            return settings;
        }

        self.transition(CycleState::SyncingStudents);
        if !self.sync_students(cycle_id).await {
            self.transition(CycleState::Waiting);
            return settings;
        }

        if self.cycle_interrupted() {
            return settings;
        }

        self.transition(CycleState::Ingesting);
        if let Err(e) = self.ingest(cycle_id, &bilhetes_path).await {
            match e {
                EngineError::Bilhetes(BilhetesError::SourceNotFound { ref path }) => {
                    warn!(
                        cycle = %cycle_id,
                        path = %path.display(),
                        "bilhetes file missing, skipping cycle"
                    );
                }
                _ => {
                    error!(cycle = %cycle_id, error = %e, "ingestion failed, abandoning cycle");
                }
            }
            self.transition(CycleState::Waiting);
            return settings;
        }

        if self.cycle_interrupted() {
            return settings;
        }

        self.transition(CycleState::Syncing);
        match self.sync_backlog(cycle_id, settings.cutoff).await {
            Ok((synced, failed)) => {
                info!(cycle = %cycle_id, synced, failed, "cycle finished");
                self.events.send(PipelineEvent::CycleFinished {
                    cycle_id,
                    synced,
                    failed,
                });
            }
            Err(e) => {
                error!(cycle = %cycle_id, error = %e, "sync step failed, abandoning cycle");
            }
        }

        self.transition(CycleState::Waiting);
        settings
    }

    /// Refresh the local student cache. Returns false when the rest of the
    /// cycle should be skipped.
    async fn sync_students(&self, cycle_id: Uuid) -> bool {
        let records = match self.api.fetch_alunos().await {
            Ok(records) => records,
            Err(e) => {
                // The API being down is an expected condition; swipes keep
                // accumulating locally and sync resumes when it is back
                warn!(cycle = %cycle_id, error = %e, "student list fetch failed, skipping cycle");
                return false;
            }
        };

        let alunos: Vec<Aluno> = records.into_iter().map(aluno_from_record).collect();
        match self.alunos.upsert_from_api(&alunos).await {
            Ok(total) => {
                debug!(cycle = %cycle_id, total, "student cache refreshed");
                self.events.send(PipelineEvent::AlunosRefreshed { total });
                true
            }
            Err(e) => {
                error!(cycle = %cycle_id, error = %e, "student upsert failed, abandoning cycle");
                false
            }
        }
    }

    /// Read new bilhetes lines, store them, then advance the offset.
    async fn ingest(&self, cycle_id: Uuid, path: &Path) -> EngineResult<()> {
        let offsets = OffsetStore::new(offset_marker_path(path));
        let reader = BilhetesReader::open(path, offsets).await?;

        let lines = reader.read_new_lines().await?;
        if lines.is_empty() {
            debug!(cycle = %cycle_id, "no new bilhetes lines");
            return Ok(());
        }

        let mut bilhetes = Vec::with_capacity(lines.len());
        let mut malformed = 0usize;
        for line in &lines {
            match parse_line(&line.text) {
                Ok(bilhete) => bilhetes.push(bilhete),
                Err(e) if e.is_malformed_line() => {
                    warn!(cycle = %cycle_id, line = %line.text, error = %e, "malformed line skipped");
                    malformed += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let created = self.acessos.ingest_batch(&bilhetes).await?;

        // The offset only moves after the batch is durably stored. A crash
        // before this commit replays the lines next cycle and the
        // uniqueness signature absorbs them.
        if let Some(last) = lines.last() {
            reader.commit(last.offset).await?;
        }

        info!(
            cycle = %cycle_id,
            lines = lines.len(),
            created = created.len(),
            malformed,
            "bilhetes ingested"
        );
        self.events.send(PipelineEvent::BatchIngested {
            lines: lines.len(),
            created: created.len(),
            malformed,
        });

        Ok(())
    }

    /// Post the unsynced backlog, flipping `synced` as confirmations
    /// arrive. Returns `(synced, failed)` counts.
    async fn sync_backlog(&self, cycle_id: Uuid, cutoff: NaiveDate) -> EngineResult<(usize, usize)> {
        let backlog = self.acessos.find_unsynced().await?;
        let eligible = filter_by_cutoff(backlog, cutoff);
        if eligible.is_empty() {
            debug!(cycle = %cycle_id, "no unsynced acessos eligible");
            return Ok((0, 0));
        }

        debug!(cycle = %cycle_id, eligible = eligible.len(), "posting attendance backlog");

        let (tx, mut rx) = mpsc::channel::<SyncOutcome>(SYNC_RESULTS_BUFFER);
        let sync_pass = self.engine.sync(eligible, cutoff, tx);

        // Flip flags as confirmations arrive rather than at the end, so a
        // crash mid-sync keeps every already-confirmed record synced
        let drain = async {
            let mut synced = 0usize;
            let mut failed = 0usize;
            while let Some(outcome) = rx.recv().await {
                if outcome.success {
                    match self.acessos.mark_synced(outcome.acesso_id).await {
                        Ok(()) => {
                            synced += 1;
                            self.events.send(PipelineEvent::AcessoSynced {
                                acesso_id: outcome.acesso_id,
                            });
                        }
                        Err(e) => {
                            error!(
                                cycle = %cycle_id,
                                acesso_id = outcome.acesso_id,
                                error = %e,
                                "confirmed by the API but could not flip synced flag"
                            );
                            failed += 1;
                        }
                    }
                } else {
                    failed += 1;
                    self.events.send(PipelineEvent::AcessoSyncFailed {
                        acesso_id: outcome.acesso_id,
                    });
                }
            }
            (synced, failed)
        };

        let (dispatch, (synced, failed)) = tokio::join!(sync_pass, drain);
        debug!(
            cycle = %cycle_id,
            dispatched = dispatch.dispatched,
            skipped = dispatch.skipped,
            interrupted = dispatch.interrupted,
            synced,
            failed,
            "sync step complete"
        );

        Ok((synced, failed))
    }

    /// Cancellation-aware sleep between cycles. Returns true on shutdown.
    async fn wait(&self, interval: Duration) -> bool {
        debug!(secs = interval.as_secs(), "waiting for next cycle");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => true,
            _ = time::sleep(interval) => false,
        }
    }

    /// Cancellation check between cycle steps. Ends the cycle early so the
    /// run loop can reach `Stopped` without waiting out a whole step.
    fn cycle_interrupted(&self) -> bool {
        if self.cancel.is_cancelled() {
            self.transition(CycleState::Waiting);
            return true;
        }
        false
    }

    fn transition(&self, to: CycleState) {
        let from = *self.state_tx.borrow();
        if !from.can_transition_to(&to) {
            // Reaching this is a scheduler bug; say so loudly but keep the
            // machine where it is rather than crash the loop
            error!(from = %from, to = %to, "forbidden scheduler state transition");
            return;
        }
        self.state_tx.send_replace(to);
        debug!(from = %from, to = %to, "scheduler state change");
        self.events.send(PipelineEvent::StateChanged { from, to });
    }
}

/// Side-car offset marker next to the source file:
/// `bilhetes.txt` becomes `bilhetes.txt.offset`.
fn offset_marker_path(source: &Path) -> PathBuf {
    let mut marker = source.as_os_str().to_os_string();
    marker.push(".offset");
    PathBuf::from(marker)
}

fn aluno_from_record(record: AlunoRecord) -> Aluno {
    let now = Utc::now();
    Aluno {
        id: record.id,
        nome: record.nome,
        matricula: record.matricula,
        data_nascimento: record.data_nascimento,
        sexo: record.sexo,
        segmento: record.segmento,
        serie: record.serie,
        turma: record.turma,
        created_at: now, // Will be set by the database on insert
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CycleState::Idle, CycleState::FetchingPath)]
    #[case(CycleState::FetchingPath, CycleState::SyncingStudents)]
    #[case(CycleState::SyncingStudents, CycleState::Ingesting)]
    #[case(CycleState::Ingesting, CycleState::Syncing)]
    #[case(CycleState::Syncing, CycleState::Waiting)]
    #[case(CycleState::Waiting, CycleState::FetchingPath)]
    #[case(CycleState::FetchingPath, CycleState::Waiting)]
    #[case(CycleState::SyncingStudents, CycleState::Waiting)]
    #[case(CycleState::Ingesting, CycleState::Waiting)]
    #[case(CycleState::Idle, CycleState::Stopped)]
    #[case(CycleState::Syncing, CycleState::Stopped)]
    #[case(CycleState::Waiting, CycleState::Stopped)]
    fn test_valid_transitions(#[case] from: CycleState, #[case] to: CycleState) {
        assert!(from.can_transition_to(&to));
    }

    #[rstest]
    #[case(CycleState::Idle, CycleState::Syncing)]
    #[case(CycleState::Idle, CycleState::Waiting)]
    #[case(CycleState::FetchingPath, CycleState::Ingesting)]
    #[case(CycleState::Syncing, CycleState::FetchingPath)]
    #[case(CycleState::Waiting, CycleState::Syncing)]
    #[case(CycleState::Stopped, CycleState::Idle)]
    #[case(CycleState::Stopped, CycleState::FetchingPath)]
    #[case(CycleState::Stopped, CycleState::Stopped)]
    fn test_invalid_transitions(#[case] from: CycleState, #[case] to: CycleState) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn test_stopped_is_the_only_terminal_state() {
        let states = [
            CycleState::Idle,
            CycleState::FetchingPath,
            CycleState::SyncingStudents,
            CycleState::Ingesting,
            CycleState::Syncing,
            CycleState::Waiting,
            CycleState::Stopped,
        ];

        for state in states {
            assert_eq!(state.is_terminal(), state == CycleState::Stopped);
        }
    }

    #[test]
    fn test_state_display_formatting() {
        assert_eq!(CycleState::Idle.to_string(), "Idle");
        assert_eq!(CycleState::FetchingPath.to_string(), "FetchingPath");
        assert_eq!(CycleState::SyncingStudents.to_string(), "SyncingStudents");
        assert_eq!(CycleState::Ingesting.to_string(), "Ingesting");
        assert_eq!(CycleState::Syncing.to_string(), "Syncing");
        assert_eq!(CycleState::Waiting.to_string(), "Waiting");
        assert_eq!(CycleState::Stopped.to_string(), "Stopped");
    }

    #[test]
    fn test_state_serialization() {
        let state = CycleState::SyncingStudents;
        let serialized = serde_json::to_string(&state).unwrap();
        assert_eq!(serialized, "\"syncing_students\"");

        let deserialized: CycleState = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, state);
    }

    #[test]
    fn test_offset_marker_sits_next_to_source() {
        let marker = offset_marker_path(Path::new("/srv/catraca/bilhetes.txt"));
        assert_eq!(marker, PathBuf::from("/srv/catraca/bilhetes.txt.offset"));
    }

    #[test]
    fn test_aluno_from_record_carries_all_fields() {
        let record = AlunoRecord {
            id: 4821,
            nome: "Maria Souza".to_string(),
            matricula: Some("2023-0144".to_string()),
            sexo: Some("F".to_string()),
            segmento: Some("Fundamental II".to_string()),
            serie: Some("7o ano".to_string()),
            turma: Some("B".to_string()),
            data_nascimento: NaiveDate::from_ymd_opt(2011, 3, 7),
        };

        let aluno = aluno_from_record(record);

        assert_eq!(aluno.id, 4821);
        assert_eq!(aluno.nome, "Maria Souza");
        assert_eq!(aluno.matricula.as_deref(), Some("2023-0144"));
        assert_eq!(aluno.data_nascimento, NaiveDate::from_ymd_opt(2011, 3, 7));
        assert_eq!(aluno.segmento.as_deref(), Some("Fundamental II"));
    }
}
