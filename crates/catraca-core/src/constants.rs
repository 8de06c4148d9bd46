//! Core constants for the bilhetes ingestion and attendance sync pipeline.
//!
//! This module defines the domain-level constants shared by the parser, the
//! storage layer, the sync engine and the scheduler. Centralizing them keeps
//! the log-line contract and the API contract consistent across crates.
//!
//! # Log line structure
//!
//! Turnstiles append one record per swipe to the bilhetes file:
//!
//! ```text
//! <marcacao:3> <data:dd/mm/yy> <hora:hh:mm> <cartao> <catraca:2> [sequencial]
//! ```
//!
//! Where:
//! - `marcacao` - direction marker, `010` entry / `011` exit
//! - `data`/`hora` - swipe date and time, two-digit year, no seconds
//! - `cartao` - badge number, digits, stored zero-padded to 16
//! - `catraca` - turnstile id, two digits
//! - `sequencial` - optional device sequence counter, informational only
//!
//! # Usage
//!
//! ```
//! use catraca_core::constants::*;
//!
//! assert_eq!(MARCACAO_ENTRADA, "010");
//!
//! fn pad_card(raw: &str) -> String {
//!     format!("{:0>width$}", raw, width = CARD_PADDED_LENGTH)
//! }
//! assert_eq!(pad_card("123"), "0000000000000123");
//! ```

// ============================================================================
// Log Line Format
// ============================================================================

/// Direction marker for an entry swipe.
///
/// First token of every bilhete line. Anything that is not
/// [`MARCACAO_ENTRADA`] or [`MARCACAO_SAIDA`] makes the line malformed.
pub const MARCACAO_ENTRADA: &str = "010";

/// Direction marker for an exit swipe.
pub const MARCACAO_SAIDA: &str = "011";

/// Minimum number of whitespace-separated tokens in a well-formed line.
///
/// Marker, date, time, card and turnstile id are mandatory; the trailing
/// sequence number is optional.
pub const MIN_LINE_TOKENS: usize = 5;

/// Date format of the `data` token (two-digit year).
///
/// # Examples
///
/// ```
/// use catraca_core::constants::BILHETE_DATE_FORMAT;
///
/// let d = chrono::NaiveDate::parse_from_str("15/10/23", BILHETE_DATE_FORMAT).unwrap();
/// assert_eq!(d.to_string(), "2023-10-15");
/// ```
pub const BILHETE_DATE_FORMAT: &str = "%d/%m/%y";

/// Time format of the `hora` token (no seconds).
pub const BILHETE_TIME_FORMAT: &str = "%H:%M";

// ============================================================================
// Card Format
// ============================================================================

/// Stored width of a card number.
///
/// Card numbers are zero-padded to this width before every lookup and
/// insert. Padding in exactly one place (the storage boundary) is what
/// keeps `0123` and `123` from becoming two different cards.
///
/// # Value: 16 digits
pub const CARD_PADDED_LENGTH: usize = 16;

/// Maximum accepted card number length before padding.
///
/// Longer tokens cannot be represented in the fixed stored width and are
/// rejected as malformed.
pub const MAX_CARD_LENGTH: usize = 16;

// ============================================================================
// Cutoff and API Date Formats
// ============================================================================

/// Format of the staff-configured cutoff date (four-digit year).
pub const CUTOFF_DATE_FORMAT: &str = "%d/%m/%Y";

/// Cutoff applied when the configured value is absent or unparsable.
pub const DEFAULT_CUTOFF: &str = "01/01/2022";

/// Combined date-time format sent in the attendance payload.
///
/// Naive local time, no offset; the school API expects the turnstile's
/// wall-clock reading as-is.
pub const API_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ============================================================================
// Scheduler Interval
// ============================================================================

/// Minimum sync interval in minutes.
pub const MIN_INTERVAL_MINUTES: u32 = 1;

/// Maximum sync interval in minutes (one day).
pub const MAX_INTERVAL_MINUTES: u32 = 1440;

/// Interval applied when the configured value is absent or out of range.
///
/// # Value: 1 minute
pub const DEFAULT_INTERVAL_MINUTES: u32 = 1;

// ============================================================================
// Sync Engine Defaults
// ============================================================================

/// Default cap on simultaneously outstanding attendance requests.
///
/// Tunable per deployment; this default matches what the school API
/// tolerates comfortably.
///
/// # Value: 5 requests in flight
pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

/// Default cap on attendance requests started per second.
///
/// # Value: 10 requests/second
pub const DEFAULT_MAX_PER_SECOND: u32 = 10;

/// Default timeout for a single API request (milliseconds).
///
/// Applies to both the student list fetch and each attendance post.
///
/// # Value: 10000ms (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// External API
// ============================================================================

/// Production base URL of the school management API.
///
/// Overridable through the API client configuration. Endpoints are resolved
/// relative to this URL, so it must end with a slash.
pub const DEFAULT_API_BASE_URL: &str = "https://siga.activesoft.com.br/api/v0/";

/// Path of the student list endpoint, relative to the base URL.
pub const API_LISTA_ALUNOS: &str = "lista_alunos/";

/// Path of the attendance post endpoint, relative to the base URL.
pub const API_MARCAR_FREQUENCIA: &str = "marcar_frequencia_aluno/";
