//! Storage layer for the catraca attendance pipeline.
//!
//! This crate provides SQLite-backed persistence for students, access
//! cards and turnstile swipe events, sitting between the bilhetes file
//! reader and the attendance sync engine.
//!
//! # Architecture
//!
//! Access goes through repositories over a shared pool:
//!
//! - [`Database`] - pool handle; opens, migrates and hands out connections
//! - [`AlunoRepository`], [`CartaoRepository`], [`AcessoRepository`] - data access traits
//! - [`transaction`] - building blocks the batch ingest composes atomically
//!
//! # Core Concepts
//!
//! ## Replay Absorption
//!
//! The bilhetes file is read at-least-once: its offset marker can be reset
//! by log rotation, truncation or a manual full reread. The `acessos`
//! table therefore carries a five-column UNIQUE constraint
//! `(marcacao, data, hora, catraca, cartao_id)` and
//! [`AcessoRepository::ingest_batch`] drops any swipe whose signature is
//! already stored. Replaying the whole file is always safe.
//!
//! ## Card Auto-Registration
//!
//! Cards are never entered by hand. The first swipe of an unknown
//! numeration creates an unbound card row; staff later bind it to a
//! student via [`CartaoRepository::bind_to_matricula`], which makes the
//! card's past and future swipes eligible for attendance sync.
//!
//! ## Per-Row Sync State
//!
//! Each swipe carries its own `synced` flag, flipped as the school API
//! confirms each attendance post. A failed post simply leaves the row in
//! the backlog for the next cycle.
//!
//! # Examples
//!
//! ## Ingesting a Batch of Bilhetes
//!
//! ```no_run
//! use catraca_bilhetes::parse_line;
//! use catraca_storage::{Database, DatabaseConfig};
//! use catraca_storage::repositories::{AcessoRepository, SqliteAcessoRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig::new("catraca.db").max_connections(5);
//! let db = Database::new(config).await?;
//!
//! let repo = SqliteAcessoRepository::new(db.pool().clone());
//!
//! let bilhetes = vec![parse_line("010 15/10/23 14:05 1234567890123456 03")?];
//! let novos = repo.ingest_batch(&bilhetes).await?;
//!
//! println!("{} new swipes stored", novos.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Walking the Unsynced Backlog
//!
//! ```no_run
//! use catraca_storage::{Database, DatabaseConfig};
//! use catraca_storage::repositories::{AcessoRepository, SqliteAcessoRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig::new("catraca.db");
//! let db = Database::new(config).await?;
//!
//! let repo = SqliteAcessoRepository::new(db.pool().clone());
//!
//! for acesso in repo.find_unsynced().await? {
//!     if acesso.can_sync() {
//!         // ... post attendance, then:
//!         repo.mark_synced(acesso.id).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Security Considerations
//!
//! ## SQL Injection Prevention
//!
//! All queries use parameterized statements via SQLx, preventing SQL
//! injection from card numerations or student data coming off the wire.
//!
//! ## Embedded Migrations
//!
//! Schema migrations are compiled into the binary by `sqlx::migrate!`;
//! the daemon never loads SQL from disk at runtime.
//!
//! # Performance
//!
//! - Connection pooling with a configurable upper bound (default: 5)
//! - WAL journaling so external readers do not block a cycle's writes
//! - Batch ingest uses multi-row inserts, bounded replay lookups and one
//!   transaction per batch
//! - Indexed columns for the backlog poll and replay detection queries

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod transaction;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{Acesso, Aluno, CartaoAcesso, UnsyncedAcesso};
pub use repositories::{
    AcessoRepository, AlunoRepository, CartaoRepository, SqliteAcessoRepository,
    SqliteAlunoRepository, SqliteCartaoRepository,
};
