use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access card entity, one row per distinct card seen at the turnstiles
///
/// Cards are auto-registered by the ingestion path: the first time a
/// numeration shows up in the bilhetes file a row is created with no
/// student bound. Staff later bind the card to a student, at which point
/// the card's past and future swipes become eligible for attendance sync.
///
/// # Fields
///
/// * `id` - Auto-increment primary key
/// * `numeracao` - Card numeration, zero-padded to 16 digits, unique
/// * `aluno_id` - Bound student, NULL until staff bind the card
/// * `created_at` - When the card was first seen
/// * `updated_at` - Last bind/rebind timestamp
///
/// # Padding Invariant
///
/// `numeracao` is always stored in its 16-digit zero-padded form.
/// Turnstile firmware is inconsistent about leading zeros, so every
/// lookup and insert normalizes first; `1234` and `0000000000001234`
/// are the same card and must never create two rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartaoAcesso {
    /// Auto-increment primary key
    pub id: i64,

    /// Card numeration (zero-padded to 16 digits, unique)
    pub numeracao: String,

    /// Bound student, if any
    pub aluno_id: Option<i64>,

    /// Record creation timestamp
    pub created_at: DateTime<Utc>,

    /// Record last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl CartaoAcesso {
    /// Whether the card has a student bound to it
    pub fn is_bound(&self) -> bool {
        self.aluno_id.is_some()
    }
}
