//! School API client for Catraca
//!
//! This crate talks to the school management system over HTTPS. It covers
//! the two endpoints the attendance pipeline needs: the student list
//! (`lista_alunos/`) and attendance marking (`marcar_frequencia_aluno/`).
//!
//! # Components
//!
//! - **ActivitySoftClient**: reqwest-backed HTTP client with API key auth
//! - **FrequenciaApi**: trait the scheduler and sync engine program against,
//!   so tests can substitute recording doubles
//! - **AlunoRecord / FrequenciaPayload**: wire types for the two endpoints
//!
//! # Example
//!
//! ```no_run
//! use catraca_api::{ActivitySoftClient, ClientConfig, FrequenciaApi};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig {
//!     api_key: "chave-da-escola".to_string(),
//!     ..ClientConfig::default()
//! };
//!
//! let client = ActivitySoftClient::new(config)?;
//! for aluno in client.fetch_alunos().await? {
//!     println!("{} ({:?})", aluno.nome, aluno.matricula);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod types;

pub use client::{ActivitySoftClient, ClientConfig, FrequenciaApi};
pub use error::{ApiError, ApiResult};
pub use types::{AlunoRecord, FrequenciaPayload};
