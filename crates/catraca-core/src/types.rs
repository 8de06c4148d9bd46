use crate::{
    Result,
    constants::{CUTOFF_DATE_FORMAT, MARCACAO_ENTRADA, MARCACAO_SAIDA, MAX_CARD_LENGTH},
    error::Error,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Swipe direction marker.
///
/// Turnstiles write `010` for an entry and `011` for an exit; the school
/// API wants the same information as `"E"` / `"S"`. Both encodings live
/// here so no other crate hard-codes either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marcacao {
    Entrada,
    Saida,
}

impl Marcacao {
    /// Parse the three-character marker token from a bilhete line.
    ///
    /// # Errors
    /// Returns `Error::InvalidMarcacao` for anything other than the two
    /// known markers.
    pub fn from_wire(token: &str) -> Result<Self> {
        match token {
            MARCACAO_ENTRADA => Ok(Marcacao::Entrada),
            MARCACAO_SAIDA => Ok(Marcacao::Saida),
            other => Err(Error::InvalidMarcacao(other.to_string())),
        }
    }

    /// The marker as it appears in the bilhetes file.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Marcacao::Entrada => MARCACAO_ENTRADA,
            Marcacao::Saida => MARCACAO_SAIDA,
        }
    }

    /// The single-letter code the attendance API expects.
    #[must_use]
    pub fn api_code(self) -> &'static str {
        match self {
            Marcacao::Entrada => "E",
            Marcacao::Saida => "S",
        }
    }

    /// Returns `true` for an entry swipe.
    #[inline]
    #[must_use]
    pub fn is_entrada(self) -> bool {
        matches!(self, Marcacao::Entrada)
    }

    /// Returns `true` for an exit swipe.
    #[inline]
    #[must_use]
    pub fn is_saida(self) -> bool {
        matches!(self, Marcacao::Saida)
    }
}

impl fmt::Display for Marcacao {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Marcacao::Entrada => write!(f, "Entrada"),
            Marcacao::Saida => write!(f, "Saida"),
        }
    }
}

impl std::str::FromStr for Marcacao {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Marcacao::from_wire(s)
    }
}

/// Badge number as read from the bilhetes file.
///
/// Digits only, at most 16 before padding. The stored representation is
/// always the zero-padded form; [`CardNumber::padded`] is the single place
/// that produces it.
///
/// # Security
/// Comparison is constant-time so badge lookups do not leak where two
/// numbers diverge.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct CardNumber(String);

impl CardNumber {
    /// Create a card number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardFormat` if the token is empty, longer
    /// than 16 characters, or contains anything besides ASCII digits.
    pub fn new(number: &str) -> Result<Self> {
        let number = number.trim();

        if number.is_empty() {
            return Err(Error::InvalidCardFormat(
                "Card number must not be empty".to_string(),
            ));
        }
        if number.len() > MAX_CARD_LENGTH {
            return Err(Error::InvalidCardFormat(format!(
                "Card number must be at most {MAX_CARD_LENGTH} chars, got {}",
                number.len()
            )));
        }
        if !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidCardFormat(format!(
                "Card number must be digits only: {number}"
            )));
        }

        Ok(CardNumber(number.to_string()))
    }

    /// Get the card number as read, without padding.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Left-pad with zeros to the stored width (16 digits).
    #[must_use]
    pub fn padded(&self) -> String {
        format!("{:0>16}", self.0)
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardNumber::new(s)
    }
}

/// Equality runs in constant time (see the type-level note); two numbers
/// compare equal only in their unpadded form.
impl PartialEq for CardNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

/// Hashes the raw digits, consistent with `PartialEq`.
impl std::hash::Hash for CardNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Parse the staff-configured cutoff date (`dd/mm/yyyy`).
///
/// # Errors
/// Returns `Error::InvalidDate` when the string does not match the
/// four-digit-year format or names a date that does not exist.
pub fn parse_cutoff_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, CUTOFF_DATE_FORMAT).map_err(|e| Error::InvalidDate {
        value: s.to_string(),
        reason: e.to_string(),
    })
}
