//! Scenario: a store failure mid-sync rolls back every write of that call,
//! including the sync-log entry. Validation failures never start writing.

use chrono::NaiveDate;
use scd_reconcile::*;

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn snap(rows: &[(&str, &str)]) -> Snapshot {
    Snapshot::from_rows(
        rows.iter()
            .map(|(k, v)| (Key::new([*k]), Attributes::of([*v]))),
    )
    .unwrap()
}

fn seeded() -> ScdTable<MemoryStore> {
    let mut t = ScdTable::in_memory(TableOptions::new(TableSchema::new("t", ["id"], ["v"])));
    t.sync(d("2025-03-03"), &snap(&[("A", "1"), ("B", "1")])).unwrap();
    t.sync(d("2025-03-07"), &snap(&[("A", "1"), ("B", "1")])).unwrap();
    t
}

#[test]
fn injected_failure_rolls_back_all_writes() {
    let mut t = seeded();
    let before = t.records().unwrap();
    let log_before = t.store().sync_log().unwrap();

    // A changes, B disappears, C is new: six interval writes plus the log.
    t.store_mut().fail_writes_after(2);
    let err = t
        .sync(d("2025-03-05"), &snap(&[("A", "2"), ("C", "1")]))
        .unwrap_err();
    assert_eq!(err, ScdError::Store(StoreError::Injected { after: 2 }));

    assert_eq!(t.records().unwrap(), before);
    assert_eq!(t.store().sync_log().unwrap(), log_before);
    assert!(!t.tracker().is_synced(d("2025-03-05")).unwrap());

    // Same call succeeds once the fault is cleared.
    t.store_mut().clear_fault();
    let r = t
        .sync(d("2025-03-05"), &snap(&[("A", "2"), ("C", "1")]))
        .unwrap();
    assert_eq!(r.rows_changed, 1);
    assert_eq!(r.rows_deleted, 1);
    assert_eq!(r.rows_new, 1);
    assert_eq!(r.rows_reopened, 2);
}

#[test]
fn failure_on_sync_log_write_still_rolls_back_records() {
    let mut t = seeded();
    let before = t.records().unwrap();

    // One mutation (close B) + one reopen, then the log write fails.
    let plan = t.plan(d("2025-03-05"), &snap(&[("A", "1")])).unwrap();
    assert_eq!(plan.mutations.len(), 2);
    t.store_mut().fail_writes_after(plan.mutations.len());

    let err = t.sync(d("2025-03-05"), &snap(&[("A", "1")])).unwrap_err();
    assert!(matches!(err, ScdError::Store(StoreError::Injected { .. })));
    assert_eq!(t.records().unwrap(), before);
}

#[test]
fn duplicate_keys_never_reach_the_engine() {
    let mut t = seeded();
    let batch = Batch::from_csv_str("id,v\nA,1\nA,2\n").unwrap();
    let err = t.sync_batch(d("2025-03-05"), &batch).unwrap_err();
    assert!(matches!(err, ScdError::DuplicateKey { .. }));
    assert!(!t.tracker().is_synced(d("2025-03-05")).unwrap());
}

#[test]
fn missing_columns_never_reach_the_engine() {
    let mut t = seeded();
    let batch = Batch::from_csv_str("id,other\nA,1\n").unwrap();
    let err = t.sync_batch(d("2025-03-05"), &batch).unwrap_err();
    assert!(matches!(err, ScdError::Schema(SchemaError::MissingColumns { .. })));
    assert_eq!(t.synced_dates().unwrap().len(), 2);
}
