//! Bilhetes file ingestion: line parsing and offset-tracked reading.
//!
//! Turnstiles append one swipe record per line to a shared text file. This
//! crate turns that file into structured [`Bilhete`] values without ever
//! re-processing old lines:
//!
//! - [`parser`] converts one raw line into a [`Bilhete`], rejecting
//!   malformed input as a recoverable error.
//! - [`offset`] persists the last durably consumed byte position in a
//!   side-car file so ingestion survives process restarts.
//! - [`reader`] reads every complete line appended since the stored
//!   offset, holding back partial trailing lines and recovering from file
//!   truncation.
//!
//! Reading is poll-once: each call returns the lines present at call time
//! and terminates. The scheduler decides when to poll again.

pub mod error;
pub mod offset;
pub mod parser;
pub mod reader;

pub use error::{BilhetesError, Result};
pub use offset::OffsetStore;
pub use parser::{Bilhete, parse_line};
pub use reader::{BilhetesReader, TailedLine};
