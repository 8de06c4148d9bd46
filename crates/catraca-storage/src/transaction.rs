//! Transaction-aware building blocks for atomic multistep operations.
//!
//! These functions accept a SQLite transaction reference, allowing the
//! repositories to group several statements into a single atomic unit.
//! Ingesting a batch of bilhetes touches two tables (auto-registering
//! cards, then inserting swipe events) and must land all-or-nothing:
//! a partially ingested batch would desync the reader offset from the
//! database contents.
//!
//! # Usage Pattern
//!
//! ```no_run
//! use catraca_storage::{Database, DatabaseConfig};
//! use catraca_storage::transaction;
//! use catraca_storage::models::Aluno;
//! use chrono::Utc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig::new("catraca.db");
//! let db = Database::new(config).await?;
//!
//! # let aluno = Aluno {
//! #     id: 4821,
//! #     nome: "Maria Souza".to_string(),
//! #     matricula: Some("2023-0144".to_string()),
//! #     data_nascimento: None,
//! #     sexo: None,
//! #     segmento: None,
//! #     serie: None,
//! #     turma: None,
//! #     created_at: Utc::now(),
//! #     updated_at: Utc::now(),
//! # };
//! // Begin transaction
//! let mut tx = db.pool().begin().await?;
//!
//! // Perform multiple operations atomically
//! transaction::upsert_aluno(&mut tx, &aluno).await?;
//!
//! // Commit transaction - all operations succeed or all fail
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Atomic Guarantees
//!
//! All operations within a transaction are guaranteed to either all succeed
//! or all fail. If any operation returns an error, the transaction should be
//! rolled back by dropping it or calling `rollback()`.

use crate::error::StorageResult;
use crate::models::{Acesso, Aluno};
use chrono::{NaiveDate, NaiveTime};
use sqlx::{Sqlite, Transaction};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Identity of a swipe event, used for replay detection.
///
/// Matches the five-column UNIQUE constraint on `acessos`:
/// `(marcacao, data, hora, catraca, cartao_id)`.
pub type AcessoSignature = (String, NaiveDate, NaiveTime, String, i64);

/// Rows per statement, kept well under SQLite's bind parameter limit.
const BIND_CHUNK: usize = 400;

/// Resolve card numerations to ids, creating rows for unseen cards
///
/// Numerations must already be zero-padded to 16 digits. Newly created
/// cards have no student bound.
///
/// # Returns
///
/// A map from numeration to card id covering every requested numeration.
///
/// # Errors
///
/// Returns error if the insert or lookup fails, or if the transaction is
/// already committed or rolled back.
pub async fn ensure_cards(
    tx: &mut Transaction<'_, Sqlite>,
    numeracoes: &BTreeSet<String>,
) -> StorageResult<HashMap<String, i64>> {
    if numeracoes.is_empty() {
        return Ok(HashMap::new());
    }

    let ids = select_card_ids(tx, numeracoes).await?;

    let missing: Vec<&String> = numeracoes.iter().filter(|n| !ids.contains_key(*n)).collect();
    if missing.is_empty() {
        return Ok(ids);
    }

    for chunk in missing.chunks(BIND_CHUNK) {
        let mut builder = sqlx::QueryBuilder::new("INSERT INTO cartoes_acesso (numeracao) ");
        builder.push_values(chunk, |mut b, numeracao| {
            b.push_bind(numeracao.as_str());
        });
        builder.build().execute(&mut **tx).await?;
    }

    // Re-select so freshly created cards get their ids too
    select_card_ids(tx, numeracoes).await
}

async fn select_card_ids(
    tx: &mut Transaction<'_, Sqlite>,
    numeracoes: &BTreeSet<String>,
) -> StorageResult<HashMap<String, i64>> {
    let todas: Vec<&String> = numeracoes.iter().collect();
    let mut ids = HashMap::new();

    for chunk in todas.chunks(BIND_CHUNK) {
        let mut builder =
            sqlx::QueryBuilder::new("SELECT numeracao, id FROM cartoes_acesso WHERE numeracao IN (");
        let mut separated = builder.separated(", ");
        for numeracao in chunk {
            separated.push_bind(numeracao.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<(String, i64)> = builder.build_query_as().fetch_all(&mut **tx).await?;
        ids.extend(rows);
    }

    Ok(ids)
}

/// Fetch the signatures of already-stored swipes for a set of cards
///
/// Bounded by the cards and date range of the batch being ingested, so
/// the result stays proportional to the batch rather than the table.
///
/// # Errors
///
/// Returns error if the query fails or the transaction is no longer
/// active.
pub async fn existing_signatures(
    tx: &mut Transaction<'_, Sqlite>,
    cartao_ids: &[i64],
    inicio: NaiveDate,
    fim: NaiveDate,
) -> StorageResult<HashSet<AcessoSignature>> {
    let mut assinaturas = HashSet::new();

    for chunk in cartao_ids.chunks(BIND_CHUNK) {
        let mut builder = sqlx::QueryBuilder::new(
            "SELECT marcacao, data, hora, catraca, cartao_id FROM acessos WHERE data BETWEEN ",
        );
        builder.push_bind(inicio);
        builder.push(" AND ");
        builder.push_bind(fim);
        builder.push(" AND cartao_id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<AcessoSignature> = builder.build_query_as().fetch_all(&mut **tx).await?;
        assinaturas.extend(rows);
    }

    Ok(assinaturas)
}

/// Insert swipe events within a transaction
///
/// Callers are expected to have already dropped rows whose signature
/// exists (see [`existing_signatures`]); a constraint violation here is
/// therefore a real error, not a replay.
///
/// # Returns
///
/// The created rows as stored, with database-assigned ids and timestamps.
///
/// # Errors
///
/// Returns error if:
/// - Unique constraint violation (duplicate swipe signature)
/// - Foreign key constraint violation (invalid cartao_id)
/// - Transaction is already committed or rolled back
pub async fn insert_acessos(
    tx: &mut Transaction<'_, Sqlite>,
    acessos: &[Acesso],
) -> StorageResult<Vec<Acesso>> {
    let mut criados = Vec::with_capacity(acessos.len());

    for chunk in acessos.chunks(BIND_CHUNK) {
        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO acessos (marcacao, data, hora, catraca, cartao_id) ",
        );
        builder.push_values(chunk, |mut b, acesso| {
            b.push_bind(acesso.marcacao.as_str())
                .push_bind(acesso.data)
                .push_bind(acesso.hora)
                .push_bind(acesso.catraca.as_str())
                .push_bind(acesso.cartao_id);
        });
        builder.push(" RETURNING id, marcacao, data, hora, catraca, cartao_id, synced, created_at");

        let rows: Vec<Acesso> = builder.build_query_as().fetch_all(&mut **tx).await?;
        criados.extend(rows);
    }

    Ok(criados)
}

/// Insert or refresh a student row within a transaction
///
/// Keyed on the API's student id: an existing row is updated in place so
/// bound cards keep pointing at the same student across refreshes.
///
/// # Errors
///
/// Returns error if the statement fails or the transaction is no longer
/// active.
pub async fn upsert_aluno(tx: &mut Transaction<'_, Sqlite>, aluno: &Aluno) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO alunos (id, nome, matricula, data_nascimento, sexo, segmento, serie, turma)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            nome = excluded.nome,
            matricula = excluded.matricula,
            data_nascimento = excluded.data_nascimento,
            sexo = excluded.sexo,
            segmento = excluded.segmento,
            serie = excluded.serie,
            turma = excluded.turma,
            updated_at = datetime('now')
        "#,
    )
    .bind(aluno.id)
    .bind(&aluno.nome)
    .bind(&aluno.matricula)
    .bind(aluno.data_nascimento)
    .bind(&aluno.sexo)
    .bind(&aluno.segmento)
    .bind(&aluno.serie)
    .bind(&aluno.turma)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
