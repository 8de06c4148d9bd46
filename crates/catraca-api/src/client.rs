//! HTTP client for the school management API.
//!
//! This module provides the client the pipeline uses to pull the student
//! list and push attendance records. The client wraps `reqwest` with the
//! school API's conventions: a versioned base URL, a raw API key in the
//! `Authorization` header (no `Bearer` prefix) and JSON bodies.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ──> FrequenciaApi (trait)
//!     │              │
//!     │              └─> ActivitySoftClient ───(HTTPS)───> school API
//!     │
//!     └─> SyncEngine (spawns one task per attendance post)
//! ```
//!
//! # Design Principles
//!
//! The client is a thin transport layer:
//! - **No automatic retry**: a failed post stays unsynced and the next
//!   scheduler cycle retries it
//! - **One shared client**: reqwest pools connections internally; the
//!   sync engine's concurrent posts reuse them
//! - **Per-request timeout**: a hung request must not stall the cycle
//!
//! Business decisions (skip rules, concurrency caps, retry cadence) live
//! in higher layers.
//!
//! # Example Usage
//!
//! ```no_run
//! use catraca_api::{ActivitySoftClient, ClientConfig, FrequenciaApi};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig {
//!     api_key: std::env::var("CATRACA_API_KEY")?,
//!     ..ClientConfig::default()
//! };
//!
//! let client = ActivitySoftClient::new(config)?;
//! let alunos = client.fetch_alunos().await?;
//! println!("{} students", alunos.len());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use reqwest::{Url, header};
use tracing::{debug, trace, warn};

use crate::error::{ApiError, ApiResult};
use crate::types::{AlunoRecord, FrequenciaPayload};
use catraca_core::constants::{
    API_LISTA_ALUNOS, API_MARCAR_FREQUENCIA, DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT_MS,
};

/// Configuration for the school API client
///
/// # Example
///
/// ```
/// use catraca_api::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     base_url: "https://siga.activesoft.com.br/api/v0/".to_string(),
///     api_key: "chave-secreta".to_string(),
///     request_timeout: Duration::from_secs(10),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API, normally the production endpoint
    pub base_url: String,

    /// API key sent verbatim in the `Authorization` header
    pub api_key: String,

    /// Timeout applied to every request
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// The slice of the school API this pipeline touches
///
/// The sync engine fans attendance posts out over spawned tasks and the
/// scheduler is tested against recording doubles, so the methods return
/// explicitly `Send` futures (native RPITIT; the `Send` bound is what
/// lets callers move these futures onto the runtime).
pub trait FrequenciaApi: Send + Sync {
    /// Fetch the full student list from `lista_alunos/`
    fn fetch_alunos(&self) -> impl Future<Output = ApiResult<Vec<AlunoRecord>>> + Send;

    /// Post one attendance record to `marcar_frequencia_aluno/`
    ///
    /// A 2xx status is the whole confirmation; the response body is not
    /// inspected.
    fn marcar_frequencia(
        &self,
        payload: &FrequenciaPayload,
    ) -> impl Future<Output = ApiResult<()>> + Send;
}

/// HTTP implementation of [`FrequenciaApi`] backed by `reqwest`
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ActivitySoftClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout_ms: u64,
}

impl ActivitySoftClient {
    /// Create a new client from the given configuration
    ///
    /// The base URL is normalized to end with a slash so endpoint paths
    /// append instead of replacing the last segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the underlying
    /// HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let mut base = config.base_url;
        if !base.ends_with('/') {
            base.push('/');
        }

        let base_url = Url::parse(&base)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {}", base, e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        debug!(base_url = %base_url, timeout_ms = config.request_timeout.as_millis() as u64, "school API client ready");

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key,
            timeout_ms: config.request_timeout.as_millis() as u64,
        })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {}", path, e)))
    }

    /// Surfaces timeouts as their own variant; everything else stays a
    /// transport error.
    fn transport_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.timeout_ms)
        } else {
            ApiError::Transport(e)
        }
    }
}

impl FrequenciaApi for ActivitySoftClient {
    async fn fetch_alunos(&self) -> ApiResult<Vec<AlunoRecord>> {
        let url = self.endpoint(API_LISTA_ALUNOS)?;
        debug!(endpoint = API_LISTA_ALUNOS, "fetching student list");

        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, &self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = API_LISTA_ALUNOS, status = %status, "student list request rejected");
            return Err(ApiError::Status {
                endpoint: API_LISTA_ALUNOS,
                status,
            });
        }

        let alunos: Vec<AlunoRecord> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidBody(e.to_string()))?;

        debug!(total = alunos.len(), "student list received");
        Ok(alunos)
    }

    async fn marcar_frequencia(&self, payload: &FrequenciaPayload) -> ApiResult<()> {
        let url = self.endpoint(API_MARCAR_FREQUENCIA)?;
        trace!(
            matricula = %payload.matricula,
            data_hora = %payload.data_hora_wire(),
            tipo = %payload.tipo_entrada_saida,
            "posting attendance"
        );

        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                endpoint = API_MARCAR_FREQUENCIA,
                status = %status,
                matricula = %payload.matricula,
                "attendance post rejected"
            );
            return Err(ApiError::Status {
                endpoint: API_MARCAR_FREQUENCIA,
                status,
            });
        }

        trace!(matricula = %payload.matricula, "attendance post confirmed");
        Ok(())
    }
}
