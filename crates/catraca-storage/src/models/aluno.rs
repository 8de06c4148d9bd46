use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Student entity mirrored from the school management API
///
/// Rows in this table are a local cache of the `lista_alunos/` endpoint,
/// refreshed at the start of every scheduler cycle. The upsert is keyed on
/// the API's own `id`, so a student keeps the same row (and any card bound
/// to it) across refreshes even when their name or class changes.
///
/// # Fields
///
/// * `id` - The API's student identifier (primary key, NOT autoincrement)
/// * `nome` - Full name, required
/// * `matricula` - Registration number used by the attendance endpoint;
///   the API can return students without one
/// * `data_nascimento` - Birth date, NULL when the API sends an empty or
///   unparsable value
/// * `sexo` - Sex as reported by the API (free-form text)
/// * `segmento` - School segment (e.g. "Fundamental II")
/// * `serie` - Grade/year
/// * `turma` - Class group
/// * `created_at` - When this row first appeared locally
/// * `updated_at` - Last refresh that touched this row
///
/// # Sync Semantics
///
/// A student with no `matricula` can still have cards bound and swipes
/// recorded; those swipes stay in the unsynced backlog until the API
/// starts returning a registration number for them.
///
/// # Examples
///
/// ```
/// use catraca_storage::models::Aluno;
/// use chrono::Utc;
///
/// let aluno = Aluno {
///     id: 4821,
///     nome: "Maria Souza".to_string(),
///     matricula: Some("2023-0144".to_string()),
///     data_nascimento: None,
///     sexo: Some("F".to_string()),
///     segmento: Some("Fundamental II".to_string()),
///     serie: Some("7o ano".to_string()),
///     turma: Some("B".to_string()),
///     created_at: Utc::now(),
///     updated_at: Utc::now(),
/// };
///
/// assert!(aluno.has_matricula());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Aluno {
    /// API student identifier (primary key)
    pub id: i64,

    /// Full name
    pub nome: String,

    /// Registration number used when posting attendance
    pub matricula: Option<String>,

    /// Birth date (NULL when the API value did not parse)
    pub data_nascimento: Option<NaiveDate>,

    /// Sex as reported by the API
    pub sexo: Option<String>,

    /// School segment
    pub segmento: Option<String>,

    /// Grade/year
    pub serie: Option<String>,

    /// Class group
    pub turma: Option<String>,

    /// Record creation timestamp
    pub created_at: DateTime<Utc>,

    /// Record last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Aluno {
    /// Whether this student can appear in attendance posts
    ///
    /// The attendance endpoint identifies students by `matricula`; without
    /// one there is nothing to send.
    pub fn has_matricula(&self) -> bool {
        self.matricula.as_deref().is_some_and(|m| !m.is_empty())
    }
}
