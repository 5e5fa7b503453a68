use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One row of the sync log. A re-sync of `date` overwrites it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub date: NaiveDate,
    pub synced_at: DateTime<Utc>,
    pub row_count: u64,
}

/// Which reconciliation case a key fell into for one synced date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCase {
    /// Covered with identical attributes.
    Unchanged,
    /// Covered with different attributes: covering record closed, new segment placed.
    Changed,
    /// Not covered; the next record carries the same attributes and absorbs D.
    ExtendedBack,
    /// Not covered; a record with different attributes follows. New segment inserted before it.
    InsertedBeforeNext,
    /// Not covered; a record ending exactly at D carries the same attributes.
    ExtendedForward,
    /// First ever record for the key.
    New,
    /// Not covered, nothing follows, but the key had earlier records.
    Reappeared,
    /// Absent while a record covered D.
    Deleted,
    /// Absent and nothing covered D.
    Absent,
}

impl SyncCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncCase::Unchanged => "unchanged",
            SyncCase::Changed => "changed",
            SyncCase::ExtendedBack => "extended_back",
            SyncCase::InsertedBeforeNext => "inserted_before_next",
            SyncCase::ExtendedForward => "extended_forward",
            SyncCase::New => "new",
            SyncCase::Reappeared => "reappeared",
            SyncCase::Deleted => "deleted",
            SyncCase::Absent => "absent",
        }
    }
}

/// Counters returned by one `sync` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub date: NaiveDate,
    /// Cardinality of the input snapshot.
    pub rows_total: u64,
    pub rows_new: u64,
    /// Covered-but-different plus inserted-before-next.
    pub rows_changed: u64,
    pub rows_deleted: u64,
    pub rows_unchanged: u64,
    pub rows_extended_back: u64,
    pub rows_extended_forward: u64,
    pub rows_reappeared: u64,
    /// Records re-established at a later known-present date after a close.
    pub rows_reopened: u64,
}

impl SyncResult {
    pub fn new(date: NaiveDate, rows_total: u64) -> Self {
        Self {
            date,
            rows_total,
            rows_new: 0,
            rows_changed: 0,
            rows_deleted: 0,
            rows_unchanged: 0,
            rows_extended_back: 0,
            rows_extended_forward: 0,
            rows_reappeared: 0,
            rows_reopened: 0,
        }
    }

    pub fn record(&mut self, case: SyncCase) {
        match case {
            SyncCase::Unchanged => self.rows_unchanged += 1,
            SyncCase::Changed | SyncCase::InsertedBeforeNext => self.rows_changed += 1,
            SyncCase::ExtendedBack => self.rows_extended_back += 1,
            SyncCase::ExtendedForward => self.rows_extended_forward += 1,
            SyncCase::New => self.rows_new += 1,
            SyncCase::Reappeared => self.rows_reappeared += 1,
            SyncCase::Deleted => self.rows_deleted += 1,
            SyncCase::Absent => {}
        }
    }

    pub fn record_reopen(&mut self) {
        self.rows_reopened += 1;
    }

    /// Nothing but unchanged rows: the shape of an idempotent re-sync.
    pub fn is_noop(&self) -> bool {
        self.rows_new == 0
            && self.rows_changed == 0
            && self.rows_deleted == 0
            && self.rows_extended_back == 0
            && self.rows_extended_forward == 0
            && self.rows_reappeared == 0
            && self.rows_reopened == 0
    }
}
