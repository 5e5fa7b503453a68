//! Temporal reconciliation engine.
//!
//! For one synced date `D` and one snapshot, every key that is either in the
//! snapshot or has a record covering `D` falls into exactly one case:
//!
//! | observed at D | covering record | action |
//! |---|---|---|
//! | attrs `a` | same attrs | nothing |
//! | attrs `a` | different | close covering at D, reopen its tail, place `[D, end)` |
//! | attrs `a` | none | place `[D, end)` before the next record |
//! | absent | yes | close covering at D, reopen its tail |
//! | absent | none | nothing |
//!
//! "Place" merges the new segment with a neighbour carrying equal
//! attributes: a record ending at D is extended forward, a record starting at
//! `end` is extended backward, both at once are bridged into one row.
//!
//! `end` is capped by the resolver's successor of D (next synced date, or
//! next calendar date), so coverage is never asserted for a date nobody
//! observed. "Reopen" re-establishes the closed record's attributes from the
//! first later date where the key is known present.
//!
//! Planning is pure over a [`SyncView`]; applying is one transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use scd_calendar::{BoundaryResolver, Resolver};
use scd_schemas::{
    Attributes, Boundary, IntervalRecord, Key, PresenceMode, ScdError, ScdResult, Snapshot,
    StoreError, SyncCase, SyncLogEntry, SyncResult, TableSchema,
};
use tracing::{debug, info};

use crate::presence::PresenceOracle;
use crate::store::{Mutation, RecordStore, StoreTx, SyncView};

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything one `sync` call will write, computed before any write happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncPlan {
    pub date: NaiveDate,
    pub mutations: Vec<Mutation>,
    pub result: SyncResult,
    /// Keys to record as present on `date` (explicit presence mode only).
    pub presence: Option<Vec<Key>>,
}

/// Per-date context shared by every key of one plan.
struct DateContext {
    date: NaiveDate,
    /// Kept as a result: in calendar mode the last calendar date has no
    /// successor, which is only an error if some key needs one.
    successor: ScdResult<Boundary>,
}

impl DateContext {
    fn successor(&self) -> ScdResult<Boundary> {
        self.successor.clone()
    }
}

#[derive(Clone, Debug)]
pub struct ReconciliationEngine {
    schema: TableSchema,
    resolver: Resolver,
    presence: PresenceMode,
}

impl ReconciliationEngine {
    pub fn new(schema: TableSchema, resolver: Resolver, presence: PresenceMode) -> Self {
        Self {
            schema,
            resolver,
            presence,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn presence_mode(&self) -> PresenceMode {
        self.presence
    }

    /// Compute the mutations for syncing `snapshot` at `date` against the
    /// state visible through `view`. Reads only.
    pub fn plan<V: SyncView + ?Sized>(
        &self,
        view: &V,
        date: NaiveDate,
        snapshot: &Snapshot,
    ) -> ScdResult<SyncPlan> {
        self.resolver.check_sync_date(date)?;
        for (key, attrs) in snapshot.iter() {
            self.schema.check_row(key, attrs)?;
        }

        let next_synced = view.synced_dates_after(date)?.first().copied();
        let ctx = DateContext {
            date,
            successor: self.resolver.successor(date, next_synced),
        };

        let mut keys: BTreeSet<Key> = snapshot.keys().cloned().collect();
        keys.extend(view.keys_covering(date)?);

        let mut result = SyncResult::new(date, snapshot.len() as u64);
        let mut mutations = Vec::new();

        for key in keys {
            let mut ledger = KeyLedger::new(key.clone(), view.records_for(&key)?);
            let outcome = self.reconcile_key(view, &ctx, &mut ledger, snapshot.get(&key))?;
            debug!(
                key = %key,
                date = %date,
                case = outcome.case.as_str(),
                reopened = outcome.reopened,
                writes = ledger.mutations.len(),
                "reconciled key"
            );
            result.record(outcome.case);
            if outcome.reopened {
                result.record_reopen();
            }
            mutations.append(&mut ledger.mutations);
        }

        let presence = match self.presence {
            PresenceMode::Explicit => Some(snapshot.keys().cloned().collect()),
            PresenceMode::Inferred => None,
        };

        Ok(SyncPlan {
            date,
            mutations,
            result,
            presence,
        })
    }

    /// Plan and apply inside one transaction on `store`.
    ///
    /// Any error (planning or store) drops the transaction uncommitted, so
    /// the store is left exactly as before the call.
    pub fn sync<S: RecordStore>(
        &self,
        store: &mut S,
        date: NaiveDate,
        snapshot: &Snapshot,
        synced_at: DateTime<Utc>,
    ) -> ScdResult<SyncResult> {
        let mut tx = store.begin()?;
        let plan = self.plan(&tx, date, snapshot)?;
        apply_plan(&mut tx, &plan, synced_at)?;
        tx.commit()?;

        let r = &plan.result;
        info!(
            date = %r.date,
            rows_total = r.rows_total,
            rows_new = r.rows_new,
            rows_changed = r.rows_changed,
            rows_deleted = r.rows_deleted,
            rows_unchanged = r.rows_unchanged,
            rows_extended_back = r.rows_extended_back,
            rows_extended_forward = r.rows_extended_forward,
            rows_reappeared = r.rows_reappeared,
            rows_reopened = r.rows_reopened,
            "sync committed"
        );
        Ok(plan.result)
    }

    fn reconcile_key<V: SyncView + ?Sized>(
        &self,
        view: &V,
        ctx: &DateContext,
        ledger: &mut KeyLedger,
        observed: Option<&Attributes>,
    ) -> ScdResult<KeyOutcome> {
        let date = ctx.date;
        let covering = ledger.covering(date);

        let outcome = match (observed, covering) {
            (Some(attrs), Some(cov)) if cov.attributes == *attrs => KeyOutcome::plain(SyncCase::Unchanged),

            (Some(attrs), Some(cov)) => {
                let reopen_at = self.release(view, ledger, &cov, date)?;
                let mut end = ctx.successor()?.min(cov.valid_to);
                if let Some(r) = reopen_at {
                    end = end.min(Boundary::Date(r));
                }
                ledger.place_segment(date, end, attrs)?;
                KeyOutcome {
                    case: SyncCase::Changed,
                    reopened: reopen_at.is_some(),
                }
            }

            (Some(attrs), None) => {
                let next = ledger.next_after(date);
                let mut end = ctx.successor()?;
                if let Some(n) = &next {
                    end = end.min(Boundary::Date(n.valid_from));
                }
                let case = match ledger.place_segment(date, end, attrs)? {
                    Placement::ExtendedBack | Placement::Bridged => SyncCase::ExtendedBack,
                    Placement::ExtendedForward => SyncCase::ExtendedForward,
                    Placement::Inserted => match next {
                        Some(n) if n.attributes != *attrs => SyncCase::InsertedBeforeNext,
                        _ if ledger.has_earlier(date) => SyncCase::Reappeared,
                        _ => SyncCase::New,
                    },
                };
                KeyOutcome::plain(case)
            }

            (None, Some(cov)) => {
                let reopen_at = self.release(view, ledger, &cov, date)?;
                KeyOutcome {
                    case: SyncCase::Deleted,
                    reopened: reopen_at.is_some(),
                }
            }

            (None, None) => KeyOutcome::plain(SyncCase::Absent),
        };
        Ok(outcome)
    }

    /// Stop `cov` at `date` and, if the key is known present somewhere in
    /// the part cut off, reinstate `cov`'s attributes from there on.
    fn release<V: SyncView + ?Sized>(
        &self,
        view: &V,
        ledger: &mut KeyLedger,
        cov: &IntervalRecord,
        date: NaiveDate,
    ) -> ScdResult<Option<NaiveDate>> {
        let reopen_at = self
            .presence
            .first_present_between(view, &cov.key, date, cov.valid_to)?;
        ledger.close_at(cov.valid_from, date)?;
        if let Some(r) = reopen_at {
            ledger.insert(cov.attributes.clone(), r, cov.valid_to)?;
        }
        Ok(reopen_at)
    }
}

/// Write a plan's mutations, its sync-log entry and (if any) its presence rows.
pub fn apply_plan<T: StoreTx + ?Sized>(
    tx: &mut T,
    plan: &SyncPlan,
    synced_at: DateTime<Utc>,
) -> ScdResult<()> {
    for m in &plan.mutations {
        m.apply(tx)?;
    }
    tx.record_sync_log(SyncLogEntry {
        date: plan.date,
        synced_at,
        row_count: plan.result.rows_total,
    })?;
    if let Some(keys) = &plan.presence {
        tx.replace_presence(plan.date, keys.clone())?;
    }
    Ok(())
}

struct KeyOutcome {
    case: SyncCase,
    reopened: bool,
}

impl KeyOutcome {
    fn plain(case: SyncCase) -> Self {
        Self {
            case,
            reopened: false,
        }
    }
}

// ---------------------------------------------------------------------------
// KeyLedger: one key's records, mutated locally while mutations are planned
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    Inserted,
    ExtendedBack,
    ExtendedForward,
    Bridged,
}

struct KeyLedger {
    key: Key,
    /// Ascending by `valid_from`.
    records: Vec<IntervalRecord>,
    mutations: Vec<Mutation>,
}

impl KeyLedger {
    fn new(key: Key, mut records: Vec<IntervalRecord>) -> Self {
        records.sort_by_key(|r| r.valid_from);
        Self {
            key,
            records,
            mutations: Vec::new(),
        }
    }

    fn covering(&self, date: NaiveDate) -> Option<IntervalRecord> {
        self.records.iter().find(|r| r.covers(date)).cloned()
    }

    fn next_after(&self, date: NaiveDate) -> Option<IntervalRecord> {
        self.records.iter().find(|r| r.valid_from > date).cloned()
    }

    fn has_earlier(&self, date: NaiveDate) -> bool {
        self.records.iter().any(|r| r.valid_from < date)
    }

    fn position(&self, valid_from: NaiveDate) -> ScdResult<usize> {
        self.records
            .iter()
            .position(|r| r.valid_from == valid_from)
            .ok_or_else(|| {
                ScdError::Store(StoreError::NotFound {
                    key: self.key.clone(),
                    valid_from,
                })
            })
    }

    fn insert(&mut self, attributes: Attributes, valid_from: NaiveDate, valid_to: Boundary) -> ScdResult<()> {
        let rec = IntervalRecord::new(self.key.clone(), attributes, valid_from, valid_to);
        if rec.is_empty() || self.records.iter().any(|r| r.overlaps(&rec)) {
            return Err(ScdError::Store(StoreError::Constraint {
                key: self.key.clone(),
                valid_from,
                reason: format!("planned insert [{valid_from}, {valid_to}) overlaps or is empty"),
            }));
        }
        self.mutations.push(Mutation::Insert(rec.clone()));
        self.records.push(rec);
        self.records.sort_by_key(|r| r.valid_from);
        Ok(())
    }

    /// Closing at the record's own start deletes it.
    fn close_at(&mut self, valid_from: NaiveDate, valid_to: NaiveDate) -> ScdResult<()> {
        if valid_to == valid_from {
            return self.delete(valid_from);
        }
        let i = self.position(valid_from)?;
        self.records[i].valid_to = Boundary::Date(valid_to);
        self.mutations.push(Mutation::CloseAt {
            key: self.key.clone(),
            valid_from,
            valid_to,
        });
        Ok(())
    }

    fn delete(&mut self, valid_from: NaiveDate) -> ScdResult<()> {
        let i = self.position(valid_from)?;
        self.records.remove(i);
        self.mutations.push(Mutation::Delete {
            key: self.key.clone(),
            valid_from,
        });
        Ok(())
    }

    fn extend_backward(&mut self, valid_from: NaiveDate, new_valid_from: NaiveDate) -> ScdResult<()> {
        let i = self.position(valid_from)?;
        self.records[i].valid_from = new_valid_from;
        self.records.sort_by_key(|r| r.valid_from);
        self.mutations.push(Mutation::ExtendBackward {
            key: self.key.clone(),
            valid_from,
            new_valid_from,
        });
        Ok(())
    }

    fn extend_forward(&mut self, valid_from: NaiveDate, valid_to: Boundary) -> ScdResult<()> {
        let i = self.position(valid_from)?;
        self.records[i].valid_to = valid_to;
        self.mutations.push(Mutation::ExtendForward {
            key: self.key.clone(),
            valid_from,
            valid_to,
        });
        Ok(())
    }

    /// Cover `[date, end)` with `attrs`, merging into equal-attribute
    /// neighbours instead of adding a row where possible.
    fn place_segment(&mut self, date: NaiveDate, end: Boundary, attrs: &Attributes) -> ScdResult<Placement> {
        let prev = self
            .records
            .iter()
            .find(|r| r.valid_to == Boundary::Date(date) && r.attributes == *attrs)
            .map(|r| r.valid_from);
        let next = match end {
            Boundary::Date(e) => self
                .records
                .iter()
                .find(|r| r.valid_from == e && r.attributes == *attrs)
                .map(|r| (r.valid_from, r.valid_to)),
            Boundary::Open => None,
        };

        match (prev, next) {
            (Some(p), Some((n_from, n_to))) => {
                self.delete(n_from)?;
                self.extend_forward(p, n_to)?;
                Ok(Placement::Bridged)
            }
            (Some(p), None) => {
                self.extend_forward(p, end)?;
                Ok(Placement::ExtendedForward)
            }
            (None, Some((n_from, _))) => {
                self.extend_backward(n_from, date)?;
                Ok(Placement::ExtendedBack)
            }
            (None, None) => {
                self.insert(attrs.clone(), date, end)?;
                Ok(Placement::Inserted)
            }
        }
    }
}
