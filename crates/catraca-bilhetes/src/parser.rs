//! Bilhete line parser.
//!
//! Converts one raw line from the turnstile log into a structured
//! [`Bilhete`].
//!
//! # Line format
//!
//! ```text
//! <marcacao:3> <data:dd/mm/yy> <hora:hh:mm> <cartao> <catraca:2> [sequencial]
//! ```
//!
//! Tokens are separated by runs of whitespace (turnstile firmware mixes
//! tabs and spaces). The first five are mandatory; a sixth token is the
//! device's sequence counter and is carried through as informational only.
//!
//! # Malformed lines
//!
//! A short line, an unknown marker, an unparsable date or time, or a
//! non-numeric card all yield an error instead of a value. Callers log a
//! warning and skip the line; ingestion never stops for one bad record.
//!
//! # Examples
//!
//! ```
//! use catraca_bilhetes::parse_line;
//! use catraca_core::Marcacao;
//!
//! let bilhete = parse_line("010 15/10/23 14:05 1234567890123456 03").unwrap();
//! assert_eq!(bilhete.marcacao, Marcacao::Entrada);
//! assert_eq!(bilhete.data.to_string(), "2023-10-15");
//! assert_eq!(bilhete.catraca, "03");
//! assert!(bilhete.sequencial.is_none());
//!
//! // Card numbers are kept exactly as read; padding happens at the
//! // storage boundary.
//! assert_eq!(bilhete.cartao.as_str(), "1234567890123456");
//! ```

use crate::error::{BilhetesError, Result};
use catraca_core::{
    CardNumber, Marcacao,
    constants::{BILHETE_DATE_FORMAT, BILHETE_TIME_FORMAT, MIN_LINE_TOKENS},
};
use chrono::{NaiveDate, NaiveTime};

/// One parsed turnstile swipe, straight from the log file.
///
/// Field names follow the upstream system's vocabulary: `marcacao` is the
/// direction, `cartao` the badge, `catraca` the two-digit turnstile id.
#[derive(Debug, Clone, PartialEq)]
pub struct Bilhete {
    pub marcacao: Marcacao,
    pub data: NaiveDate,
    pub hora: NaiveTime,
    pub cartao: CardNumber,
    pub catraca: String,
    /// Device sequence counter, when the firmware emits one. Not part of
    /// the uniqueness signature and not persisted.
    pub sequencial: Option<String>,
}

/// Parse one raw bilhete line.
///
/// # Errors
///
/// Returns a malformed-line error when the line has fewer than five
/// tokens, the marker is not `010`/`011`, the date or time do not match
/// `dd/mm/yy` / `hh:mm`, or the card token is not all digits.
pub fn parse_line(line: &str) -> Result<Bilhete> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    if tokens.len() < MIN_LINE_TOKENS {
        return Err(BilhetesError::TooFewTokens {
            line: line.trim().to_string(),
            found: tokens.len(),
        });
    }

    let marcacao = Marcacao::from_wire(tokens[0])?;

    let data = NaiveDate::parse_from_str(tokens[1], BILHETE_DATE_FORMAT).map_err(|_| {
        BilhetesError::InvalidDate {
            value: tokens[1].to_string(),
        }
    })?;

    let hora = NaiveTime::parse_from_str(tokens[2], BILHETE_TIME_FORMAT).map_err(|_| {
        BilhetesError::InvalidTime {
            value: tokens[2].to_string(),
        }
    })?;

    let cartao = CardNumber::new(tokens[3])?;
    let catraca = tokens[4].to_string();
    let sequencial = tokens.get(5).map(|s| (*s).to_string());

    Ok(Bilhete {
        marcacao,
        data,
        hora,
        cartao,
        catraca,
        sequencial,
    })
}
