//! Wire types for the school API.
//!
//! Field names follow the API's JSON exactly; the structs here are the
//! only place in the pipeline where that wire vocabulary appears.

use catraca_core::constants::API_DATETIME_FORMAT;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// One student record as returned by `lista_alunos/`
///
/// The endpoint returns a JSON array of these. Only the scalar fields the
/// pipeline needs are kept; list-valued fields (guardians, class history)
/// are ignored during deserialization. Everything but `id` and `nome` is
/// optional because the API omits or empties fields freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlunoRecord {
    /// The API's student identifier
    pub id: i64,

    /// Full name
    pub nome: String,

    /// Registration number used by the attendance endpoint
    #[serde(default)]
    pub matricula: Option<String>,

    /// Birth date; unparsable or empty values become `None`
    #[serde(default, deserialize_with = "lenient_date")]
    pub data_nascimento: Option<NaiveDate>,

    #[serde(default)]
    pub sexo: Option<String>,

    #[serde(default)]
    pub segmento: Option<String>,

    #[serde(default)]
    pub serie: Option<String>,

    #[serde(default)]
    pub turma: Option<String>,
}

/// Body of a `marcar_frequencia_aluno/` POST
///
/// The two trailing fields are always sent as explicit JSON nulls; the
/// endpoint requires their presence even though the turnstile flow never
/// fills them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequenciaPayload {
    /// Swipe timestamp, second resolution
    pub data_hora: NaiveDateTime,

    /// `"E"` for entry, `"S"` for exit
    pub tipo_entrada_saida: String,

    /// Student registration number
    pub matricula: String,

    /// Unused by the turnstile flow, sent as null
    pub id_responsavel_acompanhante: Option<i64>,

    /// Unused by the turnstile flow, sent as null
    pub comentario: Option<String>,
}

impl FrequenciaPayload {
    /// Build a payload for one swipe
    pub fn new(data_hora: NaiveDateTime, tipo_entrada_saida: &str, matricula: &str) -> Self {
        Self {
            data_hora,
            tipo_entrada_saida: tipo_entrada_saida.to_string(),
            matricula: matricula.to_string(),
            id_responsavel_acompanhante: None,
            comentario: None,
        }
    }

    /// The timestamp exactly as it appears on the wire
    pub fn data_hora_wire(&self) -> String {
        self.data_hora.format(API_DATETIME_FORMAT).to_string()
    }
}

/// Accepts a date string, an empty string, a null or a missing field.
///
/// The API is inconsistent about birth dates; a bad value must not sink
/// the whole student list.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
}
