//! Presence oracles.
//!
//! When an absence (or a change) closes a record early, the part of the old
//! record after the close may still hold dates where the key was observed.
//! The oracle answers: what is the first such synced date?
//!
//! Two sources, same answer on a consistent store:
//! - inferred: synced dates that one of the key's records covers;
//! - explicit: the `(key, date)` presence table.

use chrono::NaiveDate;
use scd_schemas::{Boundary, Key, PresenceMode, ScdResult};

use crate::store::SyncView;

pub trait PresenceOracle {
    /// First date `S` with `after < S < before` at which `key` is known to
    /// have been present. Reads pre-mutation state.
    fn first_present_between<V: SyncView + ?Sized>(
        &self,
        view: &V,
        key: &Key,
        after: NaiveDate,
        before: Boundary,
    ) -> ScdResult<Option<NaiveDate>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InferredPresence;

impl PresenceOracle for InferredPresence {
    fn first_present_between<V: SyncView + ?Sized>(
        &self,
        view: &V,
        key: &Key,
        after: NaiveDate,
        before: Boundary,
    ) -> ScdResult<Option<NaiveDate>> {
        let records = view.records_for(key)?;
        Ok(view
            .synced_dates_after(after)?
            .into_iter()
            .take_while(|s| before.is_after(*s))
            .find(|s| records.iter().any(|r| r.covers(*s))))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ExplicitPresence;

impl PresenceOracle for ExplicitPresence {
    fn first_present_between<V: SyncView + ?Sized>(
        &self,
        view: &V,
        key: &Key,
        after: NaiveDate,
        before: Boundary,
    ) -> ScdResult<Option<NaiveDate>> {
        Ok(view
            .presence_dates(key)?
            .into_iter()
            .find(|s| *s > after && before.is_after(*s)))
    }
}

impl PresenceOracle for PresenceMode {
    fn first_present_between<V: SyncView + ?Sized>(
        &self,
        view: &V,
        key: &Key,
        after: NaiveDate,
        before: Boundary,
    ) -> ScdResult<Option<NaiveDate>> {
        match self {
            PresenceMode::Inferred => InferredPresence.first_present_between(view, key, after, before),
            PresenceMode::Explicit => ExplicitPresence.first_present_between(view, key, after, before),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::{RecordStore, StoreTx};
    use scd_schemas::{Attributes, IntervalRecord, SyncLogEntry};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn store() -> MemoryStore {
        // A present on 01 and 05, absent on 03.
        let key = Key::new(["A"]);
        let log = ["2025-01-01", "2025-01-03", "2025-01-05"]
            .iter()
            .map(|s| SyncLogEntry {
                date: d(s),
                synced_at: chrono::Utc::now(),
                row_count: 1,
            })
            .collect();
        let records = vec![
            IntervalRecord::new(key.clone(), Attributes::of(["x"]), d("2025-01-01"), d("2025-01-03")),
            IntervalRecord::new(key.clone(), Attributes::of(["x"]), d("2025-01-05"), Boundary::Open),
        ];
        let presence = vec![(key.clone(), d("2025-01-01")), (key, d("2025-01-05"))];
        MemoryStore::from_parts(records, log, presence).unwrap()
    }

    #[test]
    fn inferred_skips_uncovered_synced_dates() {
        let s = store();
        let got = InferredPresence
            .first_present_between(&s, &Key::new(["A"]), d("2025-01-02"), Boundary::Open)
            .unwrap();
        assert_eq!(got, Some(d("2025-01-05")));
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let s = store();
        for mode in [PresenceMode::Inferred, PresenceMode::Explicit] {
            let got = mode
                .first_present_between(&s, &Key::new(["A"]), d("2025-01-02"), Boundary::Date(d("2025-01-05")))
                .unwrap();
            assert_eq!(got, None, "{mode:?}");
        }
    }

    #[test]
    fn explicit_and_inferred_agree() {
        let s = store();
        let k = Key::new(["A"]);
        for after in ["2024-12-31", "2025-01-01", "2025-01-04", "2025-01-05"] {
            let a = InferredPresence
                .first_present_between(&s, &k, d(after), Boundary::Open)
                .unwrap();
            let b = ExplicitPresence
                .first_present_between(&s, &k, d(after), Boundary::Open)
                .unwrap();
            assert_eq!(a, b, "after {after}");
        }
    }

    #[test]
    fn explicit_reads_presence_rows_only() {
        let mut s = MemoryStore::new();
        let mut tx = s.begin().unwrap();
        tx.replace_presence(d("2025-01-04"), vec![Key::new(["A"])]).unwrap();
        tx.commit().unwrap();
        let got = ExplicitPresence
            .first_present_between(&s, &Key::new(["A"]), d("2025-01-01"), Boundary::Open)
            .unwrap();
        assert_eq!(got, Some(d("2025-01-04")));
        let inferred = InferredPresence
            .first_present_between(&s, &Key::new(["A"]), d("2025-01-01"), Boundary::Open)
            .unwrap();
        assert_eq!(inferred, None);
    }
}
