use chrono::NaiveDate;
use scd_schemas::{ScdResult, SyncLogEntry};

use crate::store::SyncView;

/// Read-only questions about the sync log.
pub struct SyncTracker<'a, V: SyncView + ?Sized> {
    view: &'a V,
}

impl<'a, V: SyncView + ?Sized> SyncTracker<'a, V> {
    pub fn new(view: &'a V) -> Self {
        Self { view }
    }

    /// Ascending.
    pub fn synced_dates(&self) -> ScdResult<Vec<NaiveDate>> {
        self.view.synced_dates()
    }

    pub fn is_synced(&self, date: NaiveDate) -> ScdResult<bool> {
        self.view.is_synced(date)
    }

    pub fn entry(&self, date: NaiveDate) -> ScdResult<Option<SyncLogEntry>> {
        self.view.sync_log_entry(date)
    }

    pub fn earliest_after(&self, date: NaiveDate) -> ScdResult<Option<NaiveDate>> {
        Ok(self.view.synced_dates_after(date)?.first().copied())
    }

    pub fn latest_before(&self, date: NaiveDate) -> ScdResult<Option<NaiveDate>> {
        Ok(self.view.synced_dates_before(date)?.first().copied())
    }

    pub fn last_synced(&self) -> ScdResult<Option<NaiveDate>> {
        Ok(self.view.synced_dates()?.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn neighbours_of_a_date() {
        let log = ["2025-01-02", "2025-01-06", "2025-01-09"]
            .iter()
            .map(|s| SyncLogEntry {
                date: d(s),
                synced_at: chrono::Utc::now(),
                row_count: 3,
            })
            .collect();
        let store = MemoryStore::from_parts(vec![], log, vec![]).unwrap();
        let t = SyncTracker::new(&store);

        assert_eq!(t.earliest_after(d("2025-01-02")).unwrap(), Some(d("2025-01-06")));
        assert_eq!(t.latest_before(d("2025-01-09")).unwrap(), Some(d("2025-01-06")));
        assert_eq!(t.latest_before(d("2025-01-02")).unwrap(), None);
        assert_eq!(t.earliest_after(d("2025-01-09")).unwrap(), None);
        assert_eq!(t.last_synced().unwrap(), Some(d("2025-01-09")));
        assert!(t.is_synced(d("2025-01-06")).unwrap());
        assert!(!t.is_synced(d("2025-01-07")).unwrap());
        assert_eq!(t.entry(d("2025-01-06")).unwrap().map(|e| e.row_count), Some(3));
    }
}
