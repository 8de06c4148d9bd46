//! Cutoff date filter.
//!
//! Staff configure a cutoff date so that swipes recorded before it stay in
//! the local history but are never pushed to the school API. The filter is
//! an inclusive lower bound on the calendar date alone: a swipe on the
//! cutoff day itself is kept regardless of its time of day.

use chrono::NaiveDate;

use catraca_storage::UnsyncedAcesso;

/// Keep only the acessos dated on or after `cutoff`.
///
/// Pure and side-effect free. The sync engine re-checks the same bound per
/// record, so an event slipping past this filter still cannot be posted.
pub fn filter_by_cutoff(acessos: Vec<UnsyncedAcesso>, cutoff: NaiveDate) -> Vec<UnsyncedAcesso> {
    acessos.into_iter().filter(|a| a.data >= cutoff).collect()
}
