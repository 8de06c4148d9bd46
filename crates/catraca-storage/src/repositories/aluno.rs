#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::Aluno;
use crate::transaction;
use sqlx::SqlitePool;

/// Repository trait for student operations
///
/// The `alunos` table is a read-mostly mirror of the school API's
/// student list. The scheduler refreshes it at the start of every cycle
/// and card binding resolves registration numbers through it; nothing
/// else writes to it.
pub trait AlunoRepository: Send + Sync {
    /// Find a student by their API id
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<Aluno>>;

    /// Find a student by their registration number
    async fn find_by_matricula(&self, matricula: &str) -> StorageResult<Option<Aluno>>;

    /// Refresh the local mirror from a batch of API records
    ///
    /// Upserts keyed on the API id, all in one transaction: a refresh
    /// either lands completely or leaves the previous mirror intact.
    /// Students that disappeared from the API are kept; cards may still
    /// reference them.
    async fn upsert_from_api(&self, alunos: &[Aluno]) -> StorageResult<u64>;
}

/// SQLite implementation of AlunoRepository
pub struct SqliteAlunoRepository {
    pool: SqlitePool,
}

impl SqliteAlunoRepository {
    /// Create a new SQLite student repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AlunoRepository for SqliteAlunoRepository {
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<Aluno>> {
        let aluno = sqlx::query_as::<_, Aluno>(
            r#"
            SELECT id, nome, matricula, data_nascimento, sexo,
                   segmento, serie, turma, created_at, updated_at
            FROM alunos
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(aluno)
    }

    async fn find_by_matricula(&self, matricula: &str) -> StorageResult<Option<Aluno>> {
        let aluno = sqlx::query_as::<_, Aluno>(
            r#"
            SELECT id, nome, matricula, data_nascimento, sexo,
                   segmento, serie, turma, created_at, updated_at
            FROM alunos
            WHERE matricula = ?
            "#,
        )
        .bind(matricula)
        .fetch_optional(&self.pool)
        .await?;

        Ok(aluno)
    }

    async fn upsert_from_api(&self, alunos: &[Aluno]) -> StorageResult<u64> {
        if alunos.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for aluno in alunos {
            transaction::upsert_aluno(&mut tx, aluno).await?;
        }

        tx.commit().await?;

        Ok(alunos.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use chrono::{NaiveDate, Utc};

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    fn aluno_api(id: i64, nome: &str, matricula: Option<&str>) -> Aluno {
        Aluno {
            id,
            nome: nome.to_string(),
            matricula: matricula.map(String::from),
            data_nascimento: NaiveDate::from_ymd_opt(2011, 3, 7),
            sexo: Some("F".to_string()),
            segmento: Some("Fundamental II".to_string()),
            serie: Some("7o ano".to_string()),
            turma: Some("B".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_find_by_id() {
        let db = setup_test_db().await;
        let repo = SqliteAlunoRepository::new(db.pool().clone());

        let count = repo
            .upsert_from_api(&[
                aluno_api(1, "Maria Souza", Some("2023-0144")),
                aluno_api(2, "Joao Lima", None),
            ])
            .await
            .unwrap();
        assert_eq!(count, 2);

        let maria = repo.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(maria.nome, "Maria Souza");
        assert_eq!(maria.matricula.as_deref(), Some("2023-0144"));
        assert_eq!(maria.data_nascimento, NaiveDate::from_ymd_opt(2011, 3, 7));

        let joao = repo.find_by_id(2).await.unwrap().unwrap();
        assert!(joao.matricula.is_none());
    }

    #[tokio::test]
    async fn test_find_by_matricula() {
        let db = setup_test_db().await;
        let repo = SqliteAlunoRepository::new(db.pool().clone());

        repo.upsert_from_api(&[aluno_api(1, "Maria Souza", Some("2023-0144"))])
            .await
            .unwrap();

        let found = repo.find_by_matricula("2023-0144").await.unwrap();
        assert!(found.is_some());

        let missing = repo.find_by_matricula("9999-9999").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_reupsert_updates_in_place() {
        let db = setup_test_db().await;
        let repo = SqliteAlunoRepository::new(db.pool().clone());

        repo.upsert_from_api(&[aluno_api(1, "Maria Souza", Some("2023-0144"))])
            .await
            .unwrap();

        // Same id comes back with a new name and class
        let mut atualizada = aluno_api(1, "Maria Souza Santos", Some("2023-0144"));
        atualizada.turma = Some("C".to_string());
        repo.upsert_from_api(&[atualizada]).await.unwrap();

        let aluno = repo.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(aluno.nome, "Maria Souza Santos");
        assert_eq!(aluno.turma.as_deref(), Some("C"));

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alunos")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_upsert_empty_batch_is_noop() {
        let db = setup_test_db().await;
        let repo = SqliteAlunoRepository::new(db.pool().clone());

        let count = repo.upsert_from_api(&[]).await.unwrap();
        assert_eq!(count, 0);
    }
}
