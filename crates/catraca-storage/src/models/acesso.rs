use catraca_bilhetes::Bilhete;
use catraca_core::Marcacao;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Swipe event recorded from the bilhetes file
///
/// Every well-formed line the reader hands over becomes at most one of
/// these rows. The tuple `(marcacao, data, hora, catraca, cartao_id)` is
/// the event's identity: the bilhetes file is append-only but the reader
/// offset can be reset (rotation, truncation, manual reread), so the same
/// line may be ingested more than once and must land on the same row.
///
/// # Fields
///
/// * `id` - Auto-increment primary key
/// * `marcacao` - Direction marker exactly as it appeared on the line
///   (`"010"` entry, `"011"` exit)
/// * `data` - Swipe date
/// * `hora` - Swipe time (minute resolution, as the turnstile logs it)
/// * `catraca` - Turnstile identifier (two digits)
/// * `cartao_id` - The card that swiped
/// * `synced` - Whether attendance for this swipe reached the school API
/// * `created_at` - When the row was ingested
///
/// # Sync Lifecycle
///
/// Rows are born with `synced = false` and flipped per-row as the API
/// confirms each post. A failed post leaves the flag untouched; the next
/// cycle picks the row up again (at-least-once delivery).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Acesso {
    /// Auto-increment primary key
    pub id: i64,

    /// Direction marker as logged ("010" entry, "011" exit)
    pub marcacao: String,

    /// Swipe date
    pub data: NaiveDate,

    /// Swipe time
    pub hora: NaiveTime,

    /// Turnstile identifier
    pub catraca: String,

    /// Card that produced the swipe
    pub cartao_id: Option<i64>,

    /// Whether this swipe has been posted to the school API
    pub synced: bool,

    /// Record creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Acesso {
    /// Build a row from a parsed bilhete and the resolved card id
    ///
    /// The sequence number some turnstile firmwares append to the line is
    /// deliberately not part of the row: firmwares disagree on whether it
    /// resets daily, which would split one physical swipe into two rows.
    pub fn from_bilhete(bilhete: &Bilhete, cartao_id: i64) -> Self {
        Self {
            id: 0, // Will be set by database
            marcacao: bilhete.marcacao.as_wire().to_string(),
            data: bilhete.data,
            hora: bilhete.hora,
            catraca: bilhete.catraca.clone(),
            cartao_id: Some(cartao_id),
            synced: false,
            created_at: Utc::now(),
        }
    }
}

/// A swipe still awaiting attendance sync, joined with its card and student
///
/// This is the projection the sync engine consumes: everything needed to
/// build one attendance post, plus enough context to explain a skip.
/// `matricula` is NULL when the card is unbound or the bound student has
/// no registration number; such rows stay in the backlog untouched.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UnsyncedAcesso {
    /// Primary key of the underlying acesso row
    pub id: i64,

    /// Direction marker as logged
    pub marcacao: String,

    /// Swipe date
    pub data: NaiveDate,

    /// Swipe time
    pub hora: NaiveTime,

    /// Turnstile identifier
    pub catraca: String,

    /// Card numeration (zero-padded)
    pub numeracao: String,

    /// Registration number of the bound student, if resolvable
    pub matricula: Option<String>,

    /// Sync flag at the time of the query
    pub synced: bool,
}

impl UnsyncedAcesso {
    /// Combined timestamp for the attendance payload
    pub fn data_hora(&self) -> NaiveDateTime {
        self.data.and_time(self.hora)
    }

    /// Entry/exit code expected by the attendance endpoint
    ///
    /// Markers other than the entry marker map to exit, matching how the
    /// turnstiles classify everything that is not an inbound rotation.
    pub fn tipo_entrada_saida(&self) -> &'static str {
        match Marcacao::from_wire(&self.marcacao) {
            Ok(marcacao) => marcacao.api_code(),
            Err(_) => "S",
        }
    }

    /// Whether the sync engine can build a post for this row
    pub fn can_sync(&self) -> bool {
        !self.synced && self.matricula.as_deref().is_some_and(|m| !m.is_empty())
    }
}
