#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::CartaoAcesso;
use catraca_core::CardNumber;
use sqlx::SqlitePool;

/// Repository trait for access card operations
///
/// Cards are created implicitly by the ingestion path; this trait covers
/// lookups and the staff-facing bind operation that attaches a card to a
/// student. Every numeration crossing this boundary is normalized to its
/// 16-digit zero-padded form first, so callers may pass the short form
/// printed on the card.
pub trait CartaoRepository: Send + Sync {
    /// Find a card by its numeration (any padding accepted)
    async fn find_by_numeracao(&self, numeracao: &str) -> StorageResult<Option<CartaoAcesso>>;

    /// Bind a card to the student holding the given registration number
    ///
    /// Returns `false` when the card was never seen at a turnstile or no
    /// student carries that matricula; nothing is changed in that case.
    /// Rebinding an already-bound card overwrites the previous bind.
    async fn bind_to_matricula(&self, numeracao: &str, matricula: &str) -> StorageResult<bool>;
}

/// SQLite implementation of CartaoRepository
pub struct SqliteCartaoRepository {
    pool: SqlitePool,
}

impl SqliteCartaoRepository {
    /// Create a new SQLite card repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl CartaoRepository for SqliteCartaoRepository {
    async fn find_by_numeracao(&self, numeracao: &str) -> StorageResult<Option<CartaoAcesso>> {
        let padded = CardNumber::new(numeracao)?.padded();

        let cartao = sqlx::query_as::<_, CartaoAcesso>(
            r#"
            SELECT id, numeracao, aluno_id, created_at, updated_at
            FROM cartoes_acesso
            WHERE numeracao = ?
            "#,
        )
        .bind(padded)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cartao)
    }

    async fn bind_to_matricula(&self, numeracao: &str, matricula: &str) -> StorageResult<bool> {
        let padded = CardNumber::new(numeracao)?.padded();

        let aluno: Option<(i64,)> = sqlx::query_as("SELECT id FROM alunos WHERE matricula = ?")
            .bind(matricula)
            .fetch_optional(&self.pool)
            .await?;

        let Some((aluno_id,)) = aluno else {
            return Ok(false);
        };

        let result = sqlx::query(
            r#"
            UPDATE cartoes_acesso
            SET aluno_id = ?, updated_at = datetime('now')
            WHERE numeracao = ?
            "#,
        )
        .bind(aluno_id)
        .bind(padded)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
