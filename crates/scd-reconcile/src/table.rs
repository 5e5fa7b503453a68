use chrono::{DateTime, NaiveDate, Utc};
use scd_calendar::{BusinessCalendar, Resolver};
use scd_canonical::{canonicalize, Batch};
use scd_schemas::{
    IntervalRecord, PresenceMode, ScdResult, Snapshot, SnapshotRow, SyncResult, TableSchema,
};

use crate::engine::{ReconciliationEngine, SyncPlan};
use crate::memory::MemoryStore;
use crate::reconstruct::SnapshotReconstructor;
use crate::store::RecordStore;
use crate::tracker::SyncTracker;

/// How one table is reconciled and read.
#[derive(Clone, Debug)]
pub struct TableOptions {
    pub schema: TableSchema,
    /// `Some` selects business-calendar mode.
    pub calendar: Option<BusinessCalendar>,
    pub presence: PresenceMode,
    pub allow_unsynced: bool,
}

impl TableOptions {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            calendar: None,
            presence: PresenceMode::Inferred,
            allow_unsynced: false,
        }
    }

    pub fn with_calendar(mut self, calendar: BusinessCalendar) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn with_presence(mut self, presence: PresenceMode) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_allow_unsynced(mut self, allow: bool) -> Self {
        self.allow_unsynced = allow;
        self
    }

    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            self.schema.clone(),
            Resolver::from_calendar(self.calendar.clone()),
            self.presence,
        )
    }

    pub fn reader(&self) -> SnapshotReconstructor {
        SnapshotReconstructor::new(self.allow_unsynced)
    }
}

/// One SCD table over an exclusively owned store.
///
/// `&mut self` on writes is the writer lock: a table cannot be synced from
/// two places at once.
pub struct ScdTable<S: RecordStore> {
    store: S,
    engine: ReconciliationEngine,
    reader: SnapshotReconstructor,
}

impl ScdTable<MemoryStore> {
    pub fn in_memory(options: TableOptions) -> Self {
        Self::new(MemoryStore::new(), options)
    }
}

impl<S: RecordStore> ScdTable<S> {
    pub fn new(store: S, options: TableOptions) -> Self {
        Self {
            engine: options.engine(),
            reader: options.reader(),
            store,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        self.engine.schema()
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn sync(&mut self, date: NaiveDate, snapshot: &Snapshot) -> ScdResult<SyncResult> {
        self.sync_at(date, snapshot, Utc::now())
    }

    pub fn sync_at(
        &mut self,
        date: NaiveDate,
        snapshot: &Snapshot,
        synced_at: DateTime<Utc>,
    ) -> ScdResult<SyncResult> {
        self.engine.sync(&mut self.store, date, snapshot, synced_at)
    }

    /// Canonicalize a raw batch against this table's schema, then sync it.
    pub fn sync_batch(&mut self, date: NaiveDate, batch: &Batch) -> ScdResult<SyncResult> {
        let snapshot = canonicalize(batch, self.engine.schema())?;
        self.sync(date, &snapshot)
    }

    /// What a sync would do, without doing it.
    pub fn plan(&self, date: NaiveDate, snapshot: &Snapshot) -> ScdResult<SyncPlan> {
        self.engine.plan(&self.store, date, snapshot)
    }

    pub fn get(&self, date: NaiveDate) -> ScdResult<Vec<SnapshotRow>> {
        self.reader.get(&self.store, date)
    }

    pub fn synced_dates(&self) -> ScdResult<Vec<NaiveDate>> {
        self.store.synced_dates()
    }

    pub fn tracker(&self) -> SyncTracker<'_, S> {
        SyncTracker::new(&self.store)
    }

    pub fn record_count(&self) -> ScdResult<usize> {
        self.store.record_count()
    }

    /// All interval rows, ordered by `(key, valid_from)`.
    pub fn records(&self) -> ScdResult<Vec<IntervalRecord>> {
        self.store.all_records()
    }
}
