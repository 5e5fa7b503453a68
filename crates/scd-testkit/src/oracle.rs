//! Chronological oracle.
//!
//! Walk the synced dates in ascending order. A key observed at `d` with
//! attributes `a` owns `[d, successor(d))`; consecutive segments with equal
//! attributes that touch are one interval. `successor` is the next synced
//! date (open after the last one) or, with a calendar, the next calendar
//! date.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use scd_reconcile::{
    Attributes, Boundary, BusinessCalendar, IntervalRecord, Key, ScdResult, Snapshot,
};

/// Observed snapshot per synced date.
pub type History = BTreeMap<NaiveDate, Snapshot>;

/// Ordered by `(key, valid_from)`, like [`scd_reconcile::ScdTable::records`].
pub fn canonical_intervals(
    history: &History,
    calendar: Option<&BusinessCalendar>,
) -> ScdResult<Vec<IntervalRecord>> {
    let dates: Vec<NaiveDate> = history.keys().copied().collect();

    let mut by_key: BTreeMap<Key, Vec<IntervalRecord>> = BTreeMap::new();
    for (i, d) in dates.iter().enumerate() {
        let end = match calendar {
            Some(cal) => Boundary::Date(cal.next_after(*d)?),
            None => Boundary::from(dates.get(i + 1).copied()),
        };
        for (key, attrs) in history[d].iter() {
            push_segment(by_key.entry(key.clone()).or_default(), key, attrs, *d, end);
        }
    }
    Ok(by_key.into_values().flatten().collect())
}

fn push_segment(
    out: &mut Vec<IntervalRecord>,
    key: &Key,
    attrs: &Attributes,
    from: NaiveDate,
    end: Boundary,
) {
    if let Some(last) = out.last_mut() {
        if last.valid_to == Boundary::Date(from) && last.attributes == *attrs {
            last.valid_to = end;
            return;
        }
    }
    out.push(IntervalRecord::new(key.clone(), attrs.clone(), from, end));
}
