//! Concurrent attendance sync engine.
//!
//! Takes the unsynced backlog and posts each eligible acesso to the school
//! API, with two independent throttles: a cap on simultaneously outstanding
//! requests (semaphore) and a cap on requests started per second (pace
//! ticker). Outcomes stream back over a channel as each request finishes,
//! in completion order, so the caller can flip `synced` flags one by one
//! and a crash loses at most the requests still in flight.
//!
//! Per-record isolation is strict: a timeout, transport error or non-2xx
//! response marks that one record as failed and the batch carries on. The
//! record stays unsynced and is retried on the next cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use catraca_api::{FrequenciaApi, FrequenciaPayload};
use catraca_core::constants::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_PER_SECOND};
use catraca_storage::UnsyncedAcesso;

/// Throttle configuration for the sync engine
///
/// The right values depend on what the school API tolerates; both caps are
/// deployment tunables rather than constants.
#[derive(Debug, Clone, Copy)]
pub struct SyncEngineConfig {
    /// Maximum simultaneously outstanding requests
    pub max_in_flight: usize,

    /// Maximum requests started per second
    pub max_per_second: u32,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_per_second: DEFAULT_MAX_PER_SECOND,
        }
    }
}

/// Result of one attendance post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub acesso_id: i64,
    pub success: bool,
}

/// Summary of one dispatch pass over the backlog
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncDispatch {
    /// Requests actually started
    pub dispatched: usize,

    /// Records skipped without a request (already synced, card not bound,
    /// or before the cutoff)
    pub skipped: usize,

    /// True when cancellation stopped the pass before the end of the
    /// backlog; requests already in flight still complete and report
    pub interrupted: bool,
}

/// Posts the unsynced backlog to the school API under both throttles
pub struct SyncEngine<A> {
    api: Arc<A>,
    config: SyncEngineConfig,
    cancel: CancellationToken,
}

impl<A: FrequenciaApi + 'static> SyncEngine<A> {
    pub fn new(api: Arc<A>, config: SyncEngineConfig, cancel: CancellationToken) -> Self {
        Self {
            api,
            config,
            cancel,
        }
    }

    /// Post every eligible record in `backlog`, streaming outcomes to
    /// `results`.
    ///
    /// Returns once every request has been started (or the pass was cut
    /// short); outcomes keep arriving on the channel until the last
    /// in-flight request finishes, at which point the channel closes. The
    /// caller owns the `synced` flag: nothing is written to storage here.
    ///
    /// Records are skipped without a request when they are already synced,
    /// when their card has no student bound, or when they predate `cutoff`.
    /// The caller is expected to pre-filter by cutoff; this re-check is the
    /// last line of defense before the network.
    pub async fn sync(
        &self,
        backlog: Vec<UnsyncedAcesso>,
        cutoff: NaiveDate,
        results: mpsc::Sender<SyncOutcome>,
    ) -> SyncDispatch {
        let max_in_flight = self.config.max_in_flight.max(1);
        let per_second = self.config.max_per_second.max(1);

        let semaphore = Arc::new(Semaphore::new(max_in_flight));
        let mut pace = time::interval(Duration::from_secs(1) / per_second);
        pace.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut dispatch = SyncDispatch::default();

        for acesso in backlog {
            if acesso.synced {
                dispatch.skipped += 1;
                continue;
            }
            let Some(matricula) = acesso.matricula.clone().filter(|m| !m.is_empty()) else {
                trace!(
                    acesso_id = acesso.id,
                    numeracao = %acesso.numeracao,
                    "card not bound to a student yet, leaving for a later cycle"
                );
                dispatch.skipped += 1;
                continue;
            };
            if acesso.data < cutoff {
                dispatch.skipped += 1;
                continue;
            }

            // Rate cap: one request start per tick
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    dispatch.interrupted = true;
                    break;
                }
                _ = pace.tick() => {}
            }

            // In-flight cap
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    dispatch.interrupted = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    }
                }
            };

            let payload = FrequenciaPayload::new(
                acesso.data_hora(),
                acesso.tipo_entrada_saida(),
                &matricula,
            );
            let api = Arc::clone(&self.api);
            let tx = results.clone();
            let acesso_id = acesso.id;
            dispatch.dispatched += 1;

            tokio::spawn(async move {
                let success = match api.marcar_frequencia(&payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            acesso_id,
                            matricula = %payload.matricula,
                            error = %e,
                            "attendance post failed, record stays unsynced"
                        );
                        false
                    }
                };
                // A dropped receiver means the caller stopped listening
                let _ = tx.send(SyncOutcome { acesso_id, success }).await;
                drop(permit);
            });
        }

        if dispatch.interrupted {
            debug!(
                dispatched = dispatch.dispatched,
                "sync pass interrupted, in-flight requests will still report"
            );
        }

        dispatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn acesso(id: i64, matricula: Option<&str>) -> UnsyncedAcesso {
        UnsyncedAcesso {
            id,
            marcacao: "010".to_string(),
            data: NaiveDate::from_ymd_opt(2023, 10, 15).unwrap(),
            hora: NaiveTime::from_hms_opt(14, 5, 0).unwrap(),
            catraca: "03".to_string(),
            numeracao: "0000000000001234".to_string(),
            matricula: matricula.map(str::to_string),
            synced: false,
        }
    }

    fn cutoff_2023() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    fn fast_config(max_in_flight: usize) -> SyncEngineConfig {
        SyncEngineConfig {
            max_in_flight,
            max_per_second: 1_000,
        }
    }

    /// Counts concurrent calls and records the highest watermark.
    struct CountingApi {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingApi {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl FrequenciaApi for CountingApi {
        async fn fetch_alunos(&self) -> catraca_api::ApiResult<Vec<catraca_api::AlunoRecord>> {
            Ok(Vec::new())
        }

        async fn marcar_frequencia(
            &self,
            _payload: &FrequenciaPayload,
        ) -> catraca_api::ApiResult<()> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Records payloads; fails the configured matriculas.
    struct ScriptedApi {
        payloads: Mutex<Vec<FrequenciaPayload>>,
        fail_matriculas: Vec<String>,
    }

    impl ScriptedApi {
        fn new(fail_matriculas: &[&str]) -> Self {
            Self {
                payloads: Mutex::new(Vec::new()),
                fail_matriculas: fail_matriculas.iter().map(|m| m.to_string()).collect(),
            }
        }
    }

    impl FrequenciaApi for ScriptedApi {
        async fn fetch_alunos(&self) -> catraca_api::ApiResult<Vec<catraca_api::AlunoRecord>> {
            Ok(Vec::new())
        }

        async fn marcar_frequencia(
            &self,
            payload: &FrequenciaPayload,
        ) -> catraca_api::ApiResult<()> {
            self.payloads.lock().unwrap().push(payload.clone());
            if self.fail_matriculas.contains(&payload.matricula) {
                Err(catraca_api::ApiError::InvalidBody("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn drain(mut rx: mpsc::Receiver<SyncOutcome>) -> Vec<SyncOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_in_flight_cap_is_never_exceeded() {
        let api = Arc::new(CountingApi::new());
        let engine = SyncEngine::new(Arc::clone(&api), fast_config(5), CancellationToken::new());
        let backlog: Vec<_> = (1..=40).map(|id| acesso(id, Some("555"))).collect();

        let (tx, rx) = mpsc::channel(64);
        let dispatch = engine.sync(backlog, cutoff_2023(), tx).await;
        let outcomes = drain(rx).await;

        assert_eq!(dispatch.dispatched, 40);
        assert_eq!(outcomes.len(), 40);
        assert!(outcomes.iter().all(|o| o.success));
        assert!(api.peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(api.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_poison_the_batch() {
        let api = Arc::new(ScriptedApi::new(&["666"]));
        let engine = SyncEngine::new(Arc::clone(&api), fast_config(5), CancellationToken::new());

        let mut backlog: Vec<_> = (1..=9).map(|id| acesso(id, Some("555"))).collect();
        backlog.push(acesso(10, Some("666")));

        let (tx, rx) = mpsc::channel(64);
        let dispatch = engine.sync(backlog, cutoff_2023(), tx).await;
        let outcomes = drain(rx).await;

        assert_eq!(dispatch.dispatched, 10);
        assert_eq!(outcomes.len(), 10);
        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 9);

        let failed: Vec<i64> = outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.acesso_id)
            .collect();
        assert_eq!(failed, vec![10]);
    }

    #[tokio::test]
    async fn test_skip_rules_issue_no_requests() {
        let api = Arc::new(ScriptedApi::new(&[]));
        let engine = SyncEngine::new(Arc::clone(&api), fast_config(5), CancellationToken::new());

        let mut already_synced = acesso(1, Some("555"));
        already_synced.synced = true;
        let unbound = acesso(2, None);
        let blank_matricula = acesso(3, Some(""));
        let mut pre_cutoff = acesso(4, Some("555"));
        pre_cutoff.data = NaiveDate::from_ymd_opt(2022, 12, 31).unwrap();
        let eligible = acesso(5, Some("555"));

        let (tx, rx) = mpsc::channel(64);
        let dispatch = engine
            .sync(
                vec![already_synced, unbound, blank_matricula, pre_cutoff, eligible],
                cutoff_2023(),
                tx,
            )
            .await;
        let outcomes = drain(rx).await;

        assert_eq!(dispatch.dispatched, 1);
        assert_eq!(dispatch.skipped, 4);
        assert_eq!(outcomes, vec![SyncOutcome { acesso_id: 5, success: true }]);
        assert_eq!(api.payloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payload_carries_the_swipe() {
        let api = Arc::new(ScriptedApi::new(&[]));
        let engine = SyncEngine::new(Arc::clone(&api), fast_config(1), CancellationToken::new());

        let mut saida = acesso(1, Some("555"));
        saida.marcacao = "011".to_string();

        let (tx, rx) = mpsc::channel(8);
        engine.sync(vec![saida], cutoff_2023(), tx).await;
        drain(rx).await;

        let payloads = api.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].matricula, "555");
        assert_eq!(payloads[0].tipo_entrada_saida, "S");
        assert_eq!(payloads[0].data_hora_wire(), "2023-10-15T14:05:00");
    }

    #[tokio::test]
    async fn test_cancel_before_sync_dispatches_nothing() {
        let api = Arc::new(ScriptedApi::new(&[]));
        let token = CancellationToken::new();
        token.cancel();
        let engine = SyncEngine::new(Arc::clone(&api), fast_config(5), token);

        let backlog: Vec<_> = (1..=10).map(|id| acesso(id, Some("555"))).collect();
        let (tx, rx) = mpsc::channel(64);
        let dispatch = engine.sync(backlog, cutoff_2023(), tx).await;
        let outcomes = drain(rx).await;

        assert!(dispatch.interrupted);
        assert_eq!(dispatch.dispatched, 0);
        assert!(outcomes.is_empty());
        assert!(api.payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_lets_in_flight_finish() {
        /// Completes only after a long sleep, so cancellation lands while
        /// the first request is still outstanding.
        struct SlowApi {
            calls: AtomicUsize,
        }

        impl FrequenciaApi for SlowApi {
            async fn fetch_alunos(&self) -> catraca_api::ApiResult<Vec<catraca_api::AlunoRecord>> {
                Ok(Vec::new())
            }

            async fn marcar_frequencia(
                &self,
                _payload: &FrequenciaPayload,
            ) -> catraca_api::ApiResult<()> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(100)).await;
                Ok(())
            }
        }

        let api = Arc::new(SlowApi {
            calls: AtomicUsize::new(0),
        });
        let token = CancellationToken::new();
        let engine = SyncEngine::new(
            Arc::clone(&api),
            SyncEngineConfig {
                max_in_flight: 1,
                max_per_second: 1_000,
            },
            token.clone(),
        );

        let canceller = tokio::spawn({
            let token = token.clone();
            async move {
                sleep(Duration::from_millis(20)).await;
                token.cancel();
            }
        });

        let backlog: Vec<_> = (1..=3).map(|id| acesso(id, Some("555"))).collect();
        let (tx, rx) = mpsc::channel(8);
        let dispatch = engine.sync(backlog, cutoff_2023(), tx).await;
        let outcomes = drain(rx).await;
        canceller.await.unwrap();

        // The first request was in flight when the token fired; it still
        // completed and reported. The rest were never started.
        assert!(dispatch.interrupted);
        assert_eq!(dispatch.dispatched, 1);
        assert_eq!(outcomes, vec![SyncOutcome { acesso_id: 1, success: true }]);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_cap_spaces_out_dispatches() {
        let api = Arc::new(ScriptedApi::new(&[]));
        let engine = SyncEngine::new(
            Arc::clone(&api),
            SyncEngineConfig {
                max_in_flight: 10,
                max_per_second: 20,
            },
            CancellationToken::new(),
        );

        let backlog: Vec<_> = (1..=5).map(|id| acesso(id, Some("555"))).collect();
        let (tx, rx) = mpsc::channel(16);

        let started = std::time::Instant::now();
        engine.sync(backlog, cutoff_2023(), tx).await;
        drain(rx).await;

        // 5 dispatches at 20/s: the first is immediate, the remaining 4
        // wait one 50ms tick each
        assert!(started.elapsed() >= Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_zero_caps_are_sanitized() {
        let api = Arc::new(ScriptedApi::new(&[]));
        let engine = SyncEngine::new(
            Arc::clone(&api),
            SyncEngineConfig {
                max_in_flight: 0,
                max_per_second: 0,
            },
            CancellationToken::new(),
        );

        let (tx, rx) = mpsc::channel(8);
        let dispatch = engine.sync(vec![acesso(1, Some("555"))], cutoff_2023(), tx).await;
        let outcomes = drain(rx).await;

        assert_eq!(dispatch.dispatched, 1);
        assert_eq!(outcomes.len(), 1);
    }
}
