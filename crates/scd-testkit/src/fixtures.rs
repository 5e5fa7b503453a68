use chrono::{Datelike, Duration, NaiveDate, Weekday};
use scd_reconcile::{Attributes, BusinessCalendar, Key, Snapshot, TableOptions, TableSchema};

/// `YYYY-MM-DD`. Panics on bad input; fixtures only.
pub fn date(s: &str) -> NaiveDate {
    match s.parse() {
        Ok(d) => d,
        Err(e) => panic!("bad fixture date {s:?}: {e}"),
    }
}

/// `n` days after 2025-12-01.
pub fn day(n: u32) -> NaiveDate {
    date("2025-12-01") + Duration::days(i64::from(n))
}

/// Single key column `id`, single value column `attr`.
pub fn id_attr_schema(name: &str) -> TableSchema {
    TableSchema::new(name, ["id"], ["attr"])
}

pub fn id_attr_options(name: &str) -> TableOptions {
    TableOptions::new(id_attr_schema(name))
}

/// `(id, attr)` pairs for [`id_attr_schema`].
pub fn snapshot(rows: &[(&str, &str)]) -> Snapshot {
    let rows = rows
        .iter()
        .map(|(k, v)| (Key::new([*k]), Attributes::of([*v])));
    match Snapshot::from_rows(rows) {
        Ok(s) => s,
        Err(e) => panic!("bad fixture snapshot: {e}"),
    }
}

/// The first `n` Monday to Friday dates starting at `start`.
pub fn weekday_calendar(start: NaiveDate, n: usize) -> BusinessCalendar {
    let dates: Vec<NaiveDate> = start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(n)
        .collect();
    match BusinessCalendar::new(dates) {
        Ok(c) => c,
        Err(e) => panic!("bad fixture calendar: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_calendar_skips_weekends() {
        let cal = weekday_calendar(date("2025-12-05"), 3);
        assert_eq!(
            cal.dates(),
            &[date("2025-12-05"), date("2025-12-08"), date("2025-12-09")]
        );
    }

    #[test]
    fn day_offsets() {
        assert_eq!(day(0), date("2025-12-01"));
        assert_eq!(day(31), date("2026-01-01"));
    }
}
