#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::{Acesso, UnsyncedAcesso};
use crate::transaction;
use catraca_bilhetes::Bilhete;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

/// Repository trait for swipe event operations
///
/// This is the ingestion boundary of the pipeline: parsed bilhetes come
/// in, deduplicated rows come out, and the sync loop later walks the
/// unsynced backlog. Reading the bilhetes file is at-least-once (the
/// offset marker can be reset by rotation or by hand), so ingestion is
/// where replays are absorbed.
pub trait AcessoRepository: Send + Sync {
    /// Ingest a batch of parsed bilhetes atomically
    ///
    /// Cards appearing for the first time are auto-registered (unbound).
    /// Swipes whose signature `(marcacao, data, hora, catraca, cartao_id)`
    /// already exists, in the database or earlier in the same batch, are
    /// silently dropped. The whole batch runs in one transaction: either
    /// every new row lands or none do, so the caller can only advance the
    /// reader offset after a successful return.
    ///
    /// # Returns
    ///
    /// Only the newly created rows, in file order.
    async fn ingest_batch(&self, bilhetes: &[Bilhete]) -> StorageResult<Vec<Acesso>>;

    /// Fetch the unsynced backlog joined with card and student
    ///
    /// Rows come back oldest first. `matricula` is NULL for swipes whose
    /// card is unbound or whose student has no registration number.
    async fn find_unsynced(&self) -> StorageResult<Vec<UnsyncedAcesso>>;

    /// Mark a single swipe as synced
    ///
    /// Called once per confirmed attendance post, so a crash mid-cycle
    /// loses at most the in-flight confirmations.
    async fn mark_synced(&self, id: i64) -> StorageResult<()>;
}

/// SQLite implementation of AcessoRepository
pub struct SqliteAcessoRepository {
    pool: SqlitePool,
}

impl SqliteAcessoRepository {
    /// Create a new SQLite swipe event repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AcessoRepository for SqliteAcessoRepository {
    async fn ingest_batch(&self, bilhetes: &[Bilhete]) -> StorageResult<Vec<Acesso>> {
        if bilhetes.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        // Auto-register every card in the batch, normalized to padded form
        let numeracoes: BTreeSet<String> = bilhetes.iter().map(|b| b.cartao.padded()).collect();
        let cartoes = transaction::ensure_cards(&mut tx, &numeracoes).await?;

        // Replay detection window: this batch's cards over its date span
        let mut inicio = bilhetes[0].data;
        let mut fim = bilhetes[0].data;
        for bilhete in bilhetes {
            inicio = inicio.min(bilhete.data);
            fim = fim.max(bilhete.data);
        }
        let cartao_ids: Vec<i64> = cartoes.values().copied().collect();
        let mut vistos =
            transaction::existing_signatures(&mut tx, &cartao_ids, inicio, fim).await?;

        let mut novos = Vec::new();
        for bilhete in bilhetes {
            let padded = bilhete.cartao.padded();
            let cartao_id =
                cartoes
                    .get(&padded)
                    .copied()
                    .ok_or_else(|| StorageError::NotFound {
                        entity_type: "CartaoAcesso".to_string(),
                        field: "numeracao".to_string(),
                        value: padded.clone(),
                    })?;

            let assinatura = (
                bilhete.marcacao.as_wire().to_string(),
                bilhete.data,
                bilhete.hora,
                bilhete.catraca.clone(),
                cartao_id,
            );
            // Drops stored replays and batch-internal repeats alike
            if !vistos.insert(assinatura) {
                continue;
            }

            novos.push(Acesso::from_bilhete(bilhete, cartao_id));
        }

        let criados = transaction::insert_acessos(&mut tx, &novos).await?;

        // Commit even when every swipe was a replay: card registrations
        // from this batch must still stick.
        tx.commit().await?;

        Ok(criados)
    }

    async fn find_unsynced(&self) -> StorageResult<Vec<UnsyncedAcesso>> {
        let acessos = sqlx::query_as::<_, UnsyncedAcesso>(
            r#"
            SELECT a.id, a.marcacao, a.data, a.hora, a.catraca, a.synced,
                   c.numeracao, al.matricula
            FROM acessos a
            JOIN cartoes_acesso c ON c.id = a.cartao_id
            LEFT JOIN alunos al ON al.id = c.aluno_id
            WHERE a.synced = 0
            ORDER BY a.data, a.hora, a.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(acessos)
    }

    async fn mark_synced(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query("UPDATE acessos SET synced = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity_type: "Acesso".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use catraca_bilhetes::parse_line;

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    fn bilhete(line: &str) -> Bilhete {
        parse_line(line).unwrap()
    }

    async fn seed_aluno(db: &Database, id: i64, matricula: Option<&str>) {
        sqlx::query("INSERT INTO alunos (id, nome, matricula) VALUES (?, 'Aluno Teste', ?)")
            .bind(id)
            .bind(matricula)
            .execute(db.pool())
            .await
            .unwrap();
    }

    async fn bind_cartao(db: &Database, numeracao: &str, aluno_id: i64) {
        sqlx::query("UPDATE cartoes_acesso SET aluno_id = ? WHERE numeracao = ?")
            .bind(aluno_id)
            .bind(numeracao)
            .execute(db.pool())
            .await
            .unwrap();
    }

    async fn count(db: &Database, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn test_ingest_creates_cards_and_acessos() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        let criados = repo
            .ingest_batch(&[
                bilhete("010 15/10/23 14:05 1234567890123456 03"),
                bilhete("011 15/10/23 17:32 6543210987654321 01 000124"),
            ])
            .await
            .unwrap();

        assert_eq!(criados.len(), 2);
        assert!(criados.iter().all(|a| a.id > 0 && !a.synced));
        assert_eq!(count(&db, "cartoes_acesso").await, 2);
        assert_eq!(count(&db, "acessos").await, 2);
    }

    #[tokio::test]
    async fn test_ingest_replayed_batch_creates_nothing() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        let linhas = [
            bilhete("010 15/10/23 14:05 1234567890123456 03"),
            bilhete("011 15/10/23 17:32 1234567890123456 03"),
        ];

        let primeira = repo.ingest_batch(&linhas).await.unwrap();
        assert_eq!(primeira.len(), 2);

        // Offset reset: the same lines come around again
        let segunda = repo.ingest_batch(&linhas).await.unwrap();
        assert!(segunda.is_empty());

        assert_eq!(count(&db, "acessos").await, 2);
        assert_eq!(count(&db, "cartoes_acesso").await, 1);
    }

    #[tokio::test]
    async fn test_ingest_collapses_batch_internal_repeats() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        let criados = repo
            .ingest_batch(&[
                bilhete("010 15/10/23 14:05 1234567890123456 03"),
                bilhete("010 15/10/23 14:05 1234567890123456 03"),
            ])
            .await
            .unwrap();

        assert_eq!(criados.len(), 1);
        assert_eq!(count(&db, "acessos").await, 1);
    }

    #[tokio::test]
    async fn test_ingest_keeps_distinct_nearby_swipes() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        // Same card and minute, but differing in marker, time or turnstile
        let criados = repo
            .ingest_batch(&[
                bilhete("010 15/10/23 14:05 1234567890123456 03"),
                bilhete("011 15/10/23 14:05 1234567890123456 03"),
                bilhete("010 15/10/23 14:06 1234567890123456 03"),
                bilhete("010 15/10/23 14:05 1234567890123456 02"),
            ])
            .await
            .unwrap();

        assert_eq!(criados.len(), 4);
    }

    #[tokio::test]
    async fn test_ingest_sequence_token_does_not_split_swipes() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        // Same swipe logged with and without a firmware sequence number
        let criados = repo
            .ingest_batch(&[
                bilhete("010 15/10/23 14:05 1234567890123456 03"),
                bilhete("010 15/10/23 14:05 1234567890123456 03 000124"),
            ])
            .await
            .unwrap();

        assert_eq!(criados.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_pads_card_variants_to_one_card() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        repo.ingest_batch(&[bilhete("010 15/10/23 14:05 1234 03")])
            .await
            .unwrap();

        // Same physical card, fully padded this time, same swipe
        let replay = repo
            .ingest_batch(&[bilhete("010 15/10/23 14:05 0000000000001234 03")])
            .await
            .unwrap();

        assert!(replay.is_empty());
        assert_eq!(count(&db, "cartoes_acesso").await, 1);

        let (numeracao,): (String,) = sqlx::query_as("SELECT numeracao FROM cartoes_acesso")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(numeracao, "0000000000001234");
    }

    #[tokio::test]
    async fn test_ingest_empty_batch_is_noop() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        let criados = repo.ingest_batch(&[]).await.unwrap();
        assert!(criados.is_empty());
    }

    #[tokio::test]
    async fn test_find_unsynced_resolves_matricula_through_card() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        repo.ingest_batch(&[
            bilhete("010 15/10/23 14:05 1234567890123456 03"),
            bilhete("010 15/10/23 14:06 6543210987654321 03"),
        ])
        .await
        .unwrap();

        seed_aluno(&db, 1, Some("2023-0144")).await;
        bind_cartao(&db, "1234567890123456", 1).await;

        let backlog = repo.find_unsynced().await.unwrap();
        assert_eq!(backlog.len(), 2);

        let resolvido = backlog
            .iter()
            .find(|a| a.numeracao == "1234567890123456")
            .unwrap();
        assert_eq!(resolvido.matricula.as_deref(), Some("2023-0144"));
        assert!(resolvido.can_sync());

        let pendente = backlog
            .iter()
            .find(|a| a.numeracao == "6543210987654321")
            .unwrap();
        assert!(pendente.matricula.is_none());
        assert!(!pendente.can_sync());
    }

    #[tokio::test]
    async fn test_find_unsynced_orders_oldest_first() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        repo.ingest_batch(&[
            bilhete("010 16/10/23 08:00 1234567890123456 03"),
            bilhete("010 15/10/23 14:05 1234567890123456 03"),
            bilhete("010 15/10/23 07:12 1234567890123456 03"),
        ])
        .await
        .unwrap();

        let backlog = repo.find_unsynced().await.unwrap();
        let horas: Vec<String> = backlog
            .iter()
            .map(|a| a.data_hora().format("%d/%m %H:%M").to_string())
            .collect();

        assert_eq!(horas, vec!["15/10 07:12", "15/10 14:05", "16/10 08:00"]);
    }

    #[tokio::test]
    async fn test_mark_synced_removes_from_backlog() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        let criados = repo
            .ingest_batch(&[
                bilhete("010 15/10/23 14:05 1234567890123456 03"),
                bilhete("011 15/10/23 17:32 1234567890123456 03"),
            ])
            .await
            .unwrap();

        repo.mark_synced(criados[0].id).await.unwrap();

        let backlog = repo.find_unsynced().await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, criados[1].id);
    }

    #[tokio::test]
    async fn test_mark_synced_unknown_id_is_not_found() {
        let db = setup_test_db().await;
        let repo = SqliteAcessoRepository::new(db.pool().clone());

        let result = repo.mark_synced(424242).await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }
}
