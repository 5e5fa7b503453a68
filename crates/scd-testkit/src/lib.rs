//! scd-testkit
//!
//! Shared test support for SCD tables:
//! - fixtures for dates, snapshots and table options
//! - a chronological oracle: the interval set a table must hold after a
//!   given history has been synced, whatever the sync order
//! - invariant checkers over stored intervals
//! - a replay driver syncing a history in a chosen order

mod fixtures;
mod invariants;
mod oracle;

pub use fixtures::*;
pub use invariants::{check_invariants, check_no_adjacent_equal, check_no_overlap};
pub use oracle::{canonical_intervals, History};

use chrono::{DateTime, NaiveDate, Utc};
use scd_reconcile::{MemoryStore, ScdResult, ScdTable, SyncResult, TableOptions};

/// Sync `history` into a fresh in-memory table, dates taken in `order`.
///
/// Every date in `order` must be a key of `history`. All syncs share one
/// `synced_at` stamp so two replays are comparable row for row.
pub fn replay(
    options: &TableOptions,
    history: &History,
    order: &[NaiveDate],
) -> ScdResult<(ScdTable<MemoryStore>, Vec<SyncResult>)> {
    let mut table = ScdTable::in_memory(options.clone());
    let stamp = DateTime::<Utc>::UNIX_EPOCH;
    let mut results = Vec::with_capacity(order.len());
    for date in order {
        let snapshot = history.get(date).cloned().unwrap_or_default();
        results.push(table.sync_at(*date, &snapshot, stamp)?);
    }
    Ok((table, results))
}
