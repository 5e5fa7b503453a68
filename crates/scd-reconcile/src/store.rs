//! Record-store contract.
//!
//! Two logical tables: interval records keyed by `(key, valid_from)`, and
//! the sync log keyed by date. An optional third table holds explicit
//! `(key, date)` presence rows.
//!
//! Reads go through [`SyncView`]. Writes only happen inside a [`StoreTx`]
//! obtained from [`RecordStore::begin`]; dropping a transaction without
//! calling [`StoreTx::commit`] rolls it back.

use chrono::NaiveDate;
use scd_schemas::{
    Attributes, Boundary, IntervalRecord, Key, ScdResult, SyncLogEntry,
};

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub trait SyncView {
    /// All records for `key`, ascending by `valid_from`.
    fn records_for(&self, key: &Key) -> ScdResult<Vec<IntervalRecord>>;

    /// Every record whose `[valid_from, valid_to)` contains `date`.
    fn records_covering(&self, date: NaiveDate) -> ScdResult<Vec<IntervalRecord>>;

    /// Every record, ordered by `(key, valid_from)`.
    fn all_records(&self) -> ScdResult<Vec<IntervalRecord>>;

    /// Ascending.
    fn sync_log(&self) -> ScdResult<Vec<SyncLogEntry>>;

    fn sync_log_entry(&self, date: NaiveDate) -> ScdResult<Option<SyncLogEntry>>;

    /// Dates on which `key` was recorded present (explicit presence table).
    /// Ascending. Empty when the store does not track presence.
    fn presence_dates(&self, key: &Key) -> ScdResult<Vec<NaiveDate>>;

    fn synced_dates(&self) -> ScdResult<Vec<NaiveDate>> {
        Ok(self.sync_log()?.into_iter().map(|e| e.date).collect())
    }

    /// Ascending.
    fn synced_dates_after(&self, date: NaiveDate) -> ScdResult<Vec<NaiveDate>> {
        Ok(self
            .synced_dates()?
            .into_iter()
            .filter(|d| *d > date)
            .collect())
    }

    /// Descending.
    fn synced_dates_before(&self, date: NaiveDate) -> ScdResult<Vec<NaiveDate>> {
        let mut out: Vec<NaiveDate> = self
            .synced_dates()?
            .into_iter()
            .filter(|d| *d < date)
            .collect();
        out.reverse();
        Ok(out)
    }

    fn is_synced(&self, date: NaiveDate) -> ScdResult<bool> {
        Ok(self.sync_log_entry(date)?.is_some())
    }

    fn keys_covering(&self, date: NaiveDate) -> ScdResult<Vec<Key>> {
        Ok(self
            .records_covering(date)?
            .into_iter()
            .map(|r| r.key)
            .collect())
    }

    fn record_count(&self) -> ScdResult<usize> {
        Ok(self.all_records()?.len())
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

pub trait StoreTx: SyncView {
    fn insert(&mut self, record: IntervalRecord) -> ScdResult<()>;

    /// Shrink a record so it ends at `valid_to`.
    fn close_at(&mut self, key: &Key, valid_from: NaiveDate, valid_to: NaiveDate)
        -> ScdResult<()>;

    /// Move a record's start earlier. The row identity changes with it.
    fn extend_backward(
        &mut self,
        key: &Key,
        valid_from: NaiveDate,
        new_valid_from: NaiveDate,
    ) -> ScdResult<()>;

    /// Move a record's end later (possibly to open).
    fn extend_forward(&mut self, key: &Key, valid_from: NaiveDate, valid_to: Boundary)
        -> ScdResult<()>;

    fn delete(&mut self, key: &Key, valid_from: NaiveDate) -> ScdResult<()>;

    /// Upsert: a re-sync of the same date overwrites the entry.
    fn record_sync_log(&mut self, entry: SyncLogEntry) -> ScdResult<()>;

    /// Replace the presence rows of `date` with `keys`.
    fn replace_presence(&mut self, date: NaiveDate, keys: Vec<Key>) -> ScdResult<()>;

    fn commit(self) -> ScdResult<()>;
}

pub trait RecordStore: SyncView {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    fn begin(&mut self) -> ScdResult<Self::Tx<'_>>;
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// One interval-table write, as planned by the engine.
///
/// Planned mutations are applied in order; the order never creates a
/// transient overlap or a duplicate `(key, valid_from)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Insert(IntervalRecord),
    CloseAt {
        key: Key,
        valid_from: NaiveDate,
        valid_to: NaiveDate,
    },
    ExtendBackward {
        key: Key,
        valid_from: NaiveDate,
        new_valid_from: NaiveDate,
    },
    ExtendForward {
        key: Key,
        valid_from: NaiveDate,
        valid_to: Boundary,
    },
    Delete {
        key: Key,
        valid_from: NaiveDate,
    },
}

impl Mutation {
    pub fn insert(key: Key, attributes: Attributes, valid_from: NaiveDate, valid_to: Boundary) -> Self {
        Mutation::Insert(IntervalRecord::new(key, attributes, valid_from, valid_to))
    }

    pub fn key(&self) -> &Key {
        match self {
            Mutation::Insert(r) => &r.key,
            Mutation::CloseAt { key, .. }
            | Mutation::ExtendBackward { key, .. }
            | Mutation::ExtendForward { key, .. }
            | Mutation::Delete { key, .. } => key,
        }
    }

    pub fn apply<T: StoreTx + ?Sized>(&self, tx: &mut T) -> ScdResult<()> {
        match self {
            Mutation::Insert(r) => tx.insert(r.clone()),
            Mutation::CloseAt {
                key,
                valid_from,
                valid_to,
            } => tx.close_at(key, *valid_from, *valid_to),
            Mutation::ExtendBackward {
                key,
                valid_from,
                new_valid_from,
            } => tx.extend_backward(key, *valid_from, *new_valid_from),
            Mutation::ExtendForward {
                key,
                valid_from,
                valid_to,
            } => tx.extend_forward(key, *valid_from, *valid_to),
            Mutation::Delete { key, valid_from } => tx.delete(key, *valid_from),
        }
    }
}
