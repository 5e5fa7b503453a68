use chrono::NaiveDate;
use scd_schemas::{ScdError, ScdResult, SnapshotRow};

use crate::store::SyncView;

/// Rebuilds the snapshot of a date from interval records.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotReconstructor {
    allow_unsynced: bool,
}

impl SnapshotReconstructor {
    /// Reads of never-synced dates fail with `NotSynced`.
    pub fn strict() -> Self {
        Self {
            allow_unsynced: false,
        }
    }

    /// Reads of never-synced dates return whatever coverage happens to exist.
    pub fn permissive() -> Self {
        Self {
            allow_unsynced: true,
        }
    }

    pub fn new(allow_unsynced: bool) -> Self {
        Self { allow_unsynced }
    }

    pub fn allows_unsynced(&self) -> bool {
        self.allow_unsynced
    }

    /// One row per key covering `date`, ordered by key.
    pub fn get<V: SyncView + ?Sized>(&self, view: &V, date: NaiveDate) -> ScdResult<Vec<SnapshotRow>> {
        if !self.allow_unsynced && !view.is_synced(date)? {
            return Err(ScdError::NotSynced { date });
        }
        let mut rows: Vec<SnapshotRow> = view
            .records_covering(date)?
            .into_iter()
            .map(|r| SnapshotRow {
                key: r.key,
                attributes: r.attributes,
            })
            .collect();
        rows.sort();
        Ok(rows)
    }
}
