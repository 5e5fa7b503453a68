//! In-memory record store.
//!
//! Used by tests, by the property suites, and as the staging area the
//! Postgres store loads relevant rows into before planning. Enforces the
//! same constraints a relational store would: unique `(key, valid_from)`,
//! no overlapping intervals per key, no empty intervals.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use scd_schemas::{Boundary, IntervalRecord, Key, ScdError, ScdResult, StoreError, SyncLogEntry};

use crate::store::{RecordStore, StoreTx, SyncView};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct MemoryState {
    records: BTreeMap<(Key, NaiveDate), IntervalRecord>,
    sync_log: BTreeMap<NaiveDate, SyncLogEntry>,
    presence: BTreeMap<NaiveDate, BTreeSet<Key>>,
}

fn constraint(key: &Key, valid_from: NaiveDate, reason: impl Into<String>) -> ScdError {
    StoreError::Constraint {
        key: key.clone(),
        valid_from,
        reason: reason.into(),
    }
    .into()
}

fn not_found(key: &Key, valid_from: NaiveDate) -> ScdError {
    StoreError::NotFound {
        key: key.clone(),
        valid_from,
    }
    .into()
}

impl MemoryState {
    fn key_range(&self, key: &Key) -> impl Iterator<Item = &IntervalRecord> {
        self.records
            .range((key.clone(), NaiveDate::MIN)..=(key.clone(), NaiveDate::MAX))
            .map(|(_, r)| r)
    }

    /// `candidate` must not overlap any record of its key other than the one
    /// starting at `ignore`.
    fn check_no_overlap(&self, candidate: &IntervalRecord, ignore: Option<NaiveDate>) -> ScdResult<()> {
        if candidate.is_empty() {
            return Err(constraint(&candidate.key, candidate.valid_from, "empty interval"));
        }
        let clash = self
            .key_range(&candidate.key)
            .filter(|r| Some(r.valid_from) != ignore)
            .find(|r| r.overlaps(candidate));
        match clash {
            Some(r) => Err(constraint(
                &candidate.key,
                candidate.valid_from,
                format!("overlaps record starting {} ending {}", r.valid_from, r.valid_to),
            )),
            None => Ok(()),
        }
    }

    fn get(&self, key: &Key, valid_from: NaiveDate) -> ScdResult<IntervalRecord> {
        self.records
            .get(&(key.clone(), valid_from))
            .cloned()
            .ok_or_else(|| not_found(key, valid_from))
    }

    fn insert(&mut self, record: IntervalRecord) -> ScdResult<()> {
        let pk = (record.key.clone(), record.valid_from);
        if self.records.contains_key(&pk) {
            return Err(constraint(&record.key, record.valid_from, "duplicate (key, valid_from)"));
        }
        self.check_no_overlap(&record, None)?;
        self.records.insert(pk, record);
        Ok(())
    }

    fn close_at(&mut self, key: &Key, valid_from: NaiveDate, valid_to: NaiveDate) -> ScdResult<()> {
        let mut rec = self.get(key, valid_from)?;
        if Boundary::Date(valid_to) >= rec.valid_to {
            return Err(constraint(key, valid_from, format!("close at {valid_to} does not shrink")));
        }
        rec.valid_to = Boundary::Date(valid_to);
        if rec.is_empty() {
            return Err(constraint(key, valid_from, "close leaves an empty interval"));
        }
        self.records.insert((key.clone(), valid_from), rec);
        Ok(())
    }

    fn extend_backward(&mut self, key: &Key, valid_from: NaiveDate, new_valid_from: NaiveDate) -> ScdResult<()> {
        let mut rec = self.get(key, valid_from)?;
        if new_valid_from >= valid_from {
            return Err(constraint(key, valid_from, format!("{new_valid_from} is not earlier")));
        }
        rec.valid_from = new_valid_from;
        self.check_no_overlap(&rec, Some(valid_from))?;
        self.records.remove(&(key.clone(), valid_from));
        self.records.insert((key.clone(), new_valid_from), rec);
        Ok(())
    }

    fn extend_forward(&mut self, key: &Key, valid_from: NaiveDate, valid_to: Boundary) -> ScdResult<()> {
        let mut rec = self.get(key, valid_from)?;
        if valid_to <= rec.valid_to {
            return Err(constraint(key, valid_from, format!("{valid_to} is not later")));
        }
        rec.valid_to = valid_to;
        self.check_no_overlap(&rec, Some(valid_from))?;
        self.records.insert((key.clone(), valid_from), rec);
        Ok(())
    }

    fn delete(&mut self, key: &Key, valid_from: NaiveDate) -> ScdResult<()> {
        self.records
            .remove(&(key.clone(), valid_from))
            .map(|_| ())
            .ok_or_else(|| not_found(key, valid_from))
    }
}

impl SyncView for MemoryState {
    fn records_for(&self, key: &Key) -> ScdResult<Vec<IntervalRecord>> {
        Ok(self.key_range(key).cloned().collect())
    }

    fn records_covering(&self, date: NaiveDate) -> ScdResult<Vec<IntervalRecord>> {
        Ok(self
            .records
            .values()
            .filter(|r| r.covers(date))
            .cloned()
            .collect())
    }

    fn all_records(&self) -> ScdResult<Vec<IntervalRecord>> {
        Ok(self.records.values().cloned().collect())
    }

    fn sync_log(&self) -> ScdResult<Vec<SyncLogEntry>> {
        Ok(self.sync_log.values().cloned().collect())
    }

    fn sync_log_entry(&self, date: NaiveDate) -> ScdResult<Option<SyncLogEntry>> {
        Ok(self.sync_log.get(&date).cloned())
    }

    fn presence_dates(&self, key: &Key) -> ScdResult<Vec<NaiveDate>> {
        Ok(self
            .presence
            .iter()
            .filter(|(_, keys)| keys.contains(key))
            .map(|(d, _)| *d)
            .collect())
    }

    fn synced_dates_after(&self, date: NaiveDate) -> ScdResult<Vec<NaiveDate>> {
        Ok(self
            .sync_log
            .range(date.succ_opt().unwrap_or(NaiveDate::MAX)..)
            .map(|(d, _)| *d)
            .filter(|d| *d > date)
            .collect())
    }

    fn record_count(&self) -> ScdResult<usize> {
        Ok(self.records.len())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: MemoryState,
    fail_after: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from rows read elsewhere. Every record goes through the
    /// same constraint checks as a transactional insert.
    pub fn from_parts(
        records: Vec<IntervalRecord>,
        sync_log: Vec<SyncLogEntry>,
        presence: Vec<(Key, NaiveDate)>,
    ) -> ScdResult<Self> {
        let mut state = MemoryState::default();
        for r in records {
            state.insert(r)?;
        }
        for e in sync_log {
            state.sync_log.insert(e.date, e);
        }
        for (key, date) in presence {
            state.presence.entry(date).or_default().insert(key);
        }
        Ok(Self {
            state,
            fail_after: None,
        })
    }

    /// Every transaction fails on its `n`-th write (0-based) with
    /// [`StoreError::Injected`]. For rollback tests.
    pub fn fail_writes_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    pub fn clear_fault(&mut self) {
        self.fail_after = None;
    }

    pub fn clear(&mut self) {
        self.state = MemoryState::default();
    }
}

impl SyncView for MemoryStore {
    fn records_for(&self, key: &Key) -> ScdResult<Vec<IntervalRecord>> {
        self.state.records_for(key)
    }

    fn records_covering(&self, date: NaiveDate) -> ScdResult<Vec<IntervalRecord>> {
        self.state.records_covering(date)
    }

    fn all_records(&self) -> ScdResult<Vec<IntervalRecord>> {
        self.state.all_records()
    }

    fn sync_log(&self) -> ScdResult<Vec<SyncLogEntry>> {
        self.state.sync_log()
    }

    fn sync_log_entry(&self, date: NaiveDate) -> ScdResult<Option<SyncLogEntry>> {
        self.state.sync_log_entry(date)
    }

    fn presence_dates(&self, key: &Key) -> ScdResult<Vec<NaiveDate>> {
        self.state.presence_dates(key)
    }

    fn synced_dates_after(&self, date: NaiveDate) -> ScdResult<Vec<NaiveDate>> {
        self.state.synced_dates_after(date)
    }

    fn record_count(&self) -> ScdResult<usize> {
        self.state.record_count()
    }
}

impl RecordStore for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&mut self) -> ScdResult<MemoryTx<'_>> {
        let work = self.state.clone();
        Ok(MemoryTx {
            store: self,
            work,
            writes: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryTx
// ---------------------------------------------------------------------------

/// Copy-on-begin transaction. Reads see the transaction's own writes;
/// the store only changes on [`StoreTx::commit`].
pub struct MemoryTx<'a> {
    store: &'a mut MemoryStore,
    work: MemoryState,
    writes: usize,
}

impl MemoryTx<'_> {
    fn tick(&mut self) -> ScdResult<()> {
        if self.store.fail_after == Some(self.writes) {
            return Err(StoreError::Injected { after: self.writes }.into());
        }
        self.writes += 1;
        Ok(())
    }
}

impl SyncView for MemoryTx<'_> {
    fn records_for(&self, key: &Key) -> ScdResult<Vec<IntervalRecord>> {
        self.work.records_for(key)
    }

    fn records_covering(&self, date: NaiveDate) -> ScdResult<Vec<IntervalRecord>> {
        self.work.records_covering(date)
    }

    fn all_records(&self) -> ScdResult<Vec<IntervalRecord>> {
        self.work.all_records()
    }

    fn sync_log(&self) -> ScdResult<Vec<SyncLogEntry>> {
        self.work.sync_log()
    }

    fn sync_log_entry(&self, date: NaiveDate) -> ScdResult<Option<SyncLogEntry>> {
        self.work.sync_log_entry(date)
    }

    fn presence_dates(&self, key: &Key) -> ScdResult<Vec<NaiveDate>> {
        self.work.presence_dates(key)
    }

    fn synced_dates_after(&self, date: NaiveDate) -> ScdResult<Vec<NaiveDate>> {
        self.work.synced_dates_after(date)
    }

    fn record_count(&self) -> ScdResult<usize> {
        self.work.record_count()
    }
}

impl StoreTx for MemoryTx<'_> {
    fn insert(&mut self, record: IntervalRecord) -> ScdResult<()> {
        self.tick()?;
        self.work.insert(record)
    }

    fn close_at(&mut self, key: &Key, valid_from: NaiveDate, valid_to: NaiveDate) -> ScdResult<()> {
        self.tick()?;
        self.work.close_at(key, valid_from, valid_to)
    }

    fn extend_backward(&mut self, key: &Key, valid_from: NaiveDate, new_valid_from: NaiveDate) -> ScdResult<()> {
        self.tick()?;
        self.work.extend_backward(key, valid_from, new_valid_from)
    }

    fn extend_forward(&mut self, key: &Key, valid_from: NaiveDate, valid_to: Boundary) -> ScdResult<()> {
        self.tick()?;
        self.work.extend_forward(key, valid_from, valid_to)
    }

    fn delete(&mut self, key: &Key, valid_from: NaiveDate) -> ScdResult<()> {
        self.tick()?;
        self.work.delete(key, valid_from)
    }

    fn record_sync_log(&mut self, entry: SyncLogEntry) -> ScdResult<()> {
        self.tick()?;
        self.work.sync_log.insert(entry.date, entry);
        Ok(())
    }

    fn replace_presence(&mut self, date: NaiveDate, keys: Vec<Key>) -> ScdResult<()> {
        self.tick()?;
        self.work.presence.insert(date, keys.into_iter().collect());
        Ok(())
    }

    fn commit(self) -> ScdResult<()> {
        let MemoryTx { store, work, .. } = self;
        store.state = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scd_schemas::Attributes;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn rec(from: &str, to: Option<&str>, v: &str) -> IntervalRecord {
        IntervalRecord::new(
            Key::new(["A"]),
            Attributes::of([v]),
            d(from),
            to.map(d),
        )
    }

    #[test]
    fn committed_writes_are_visible() {
        let mut store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(rec("2025-01-01", None, "x")).unwrap();
        assert_eq!(tx.record_count().unwrap(), 1);
        tx.commit().unwrap();
        assert_eq!(store.record_count().unwrap(), 1);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut store = MemoryStore::new();
        {
            let mut tx = store.begin().unwrap();
            tx.insert(rec("2025-01-01", None, "x")).unwrap();
        }
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn overlap_is_a_constraint_violation() {
        let mut store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(rec("2025-01-01", Some("2025-01-05"), "x")).unwrap();
        let err = tx.insert(rec("2025-01-03", None, "y")).unwrap_err();
        assert!(matches!(err, ScdError::Store(StoreError::Constraint { .. })));
        tx.insert(rec("2025-01-05", None, "y")).unwrap();
    }

    #[test]
    fn extend_backward_rekeys_row() {
        let mut store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(rec("2025-01-05", None, "x")).unwrap();
        tx.extend_backward(&Key::new(["A"]), d("2025-01-05"), d("2025-01-01"))
            .unwrap();
        tx.commit().unwrap();
        let rows = store.records_for(&Key::new(["A"])).unwrap();
        assert_eq!(rows, vec![rec("2025-01-01", None, "x")]);
    }

    #[test]
    fn close_must_shrink_and_stay_non_empty() {
        let mut store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert(rec("2025-01-01", Some("2025-01-05"), "x")).unwrap();
        let k = Key::new(["A"]);
        assert!(tx.close_at(&k, d("2025-01-01"), d("2025-01-07")).is_err());
        assert!(tx.close_at(&k, d("2025-01-01"), d("2025-01-01")).is_err());
        tx.close_at(&k, d("2025-01-01"), d("2025-01-03")).unwrap();
        assert!(matches!(
            tx.delete(&k, d("2025-01-02")),
            Err(ScdError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn injected_fault_fires_on_nth_write() {
        let mut store = MemoryStore::new();
        store.fail_writes_after(1);
        let mut tx = store.begin().unwrap();
        tx.insert(rec("2025-01-01", Some("2025-01-02"), "x")).unwrap();
        let err = tx.insert(rec("2025-01-03", None, "y")).unwrap_err();
        assert_eq!(err, ScdError::Store(StoreError::Injected { after: 1 }));
    }

    #[test]
    fn synced_dates_after_is_strict_and_ascending() {
        let mut store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        for day in ["2025-01-05", "2025-01-01", "2025-01-03"] {
            tx.record_sync_log(SyncLogEntry {
                date: d(day),
                synced_at: chrono::Utc::now(),
                row_count: 0,
            })
            .unwrap();
        }
        tx.commit().unwrap();
        assert_eq!(
            store.synced_dates_after(d("2025-01-01")).unwrap(),
            vec![d("2025-01-03"), d("2025-01-05")]
        );
        assert_eq!(
            store.synced_dates_before(d("2025-01-05")).unwrap(),
            vec![d("2025-01-03"), d("2025-01-01")]
        );
    }
}
