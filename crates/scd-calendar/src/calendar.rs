//! Business calendar
//!
//! Deterministic, pure logic. No IO, no wall-clock.
//!
//! [`BusinessCalendar`] is a strictly ascending list of valid dates. In
//! business-calendar mode every synced date must be one of them, and every
//! record boundary resolves to "the next calendar date after the last date
//! known to be covered".

use chrono::{Datelike, NaiveDate, Weekday};
use scd_schemas::{ScdError, ScdResult};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// BusinessCalendar
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusinessCalendar {
    dates: Vec<NaiveDate>,
    index: HashMap<NaiveDate, usize>,
}

impl BusinessCalendar {
    /// Dates must be strictly ascending (sorted, no duplicates).
    pub fn new(dates: Vec<NaiveDate>) -> ScdResult<Self> {
        if dates.is_empty() {
            return Err(ScdError::Config("calendar has no dates".to_string()));
        }
        for pair in dates.windows(2) {
            if pair[0] >= pair[1] {
                return Err(ScdError::Config(format!(
                    "calendar dates must be strictly ascending: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        let index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Ok(Self { dates, index })
    }

    /// One `YYYY-MM-DD` per line. Blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> ScdResult<Self> {
        let mut dates = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let d = NaiveDate::parse_from_str(line, "%Y-%m-%d").map_err(|e| {
                ScdError::Config(format!("calendar line {}: {line:?}: {e}", lineno + 1))
            })?;
            dates.push(d);
        }
        Self::new(dates)
    }

    /// NYSE trading days in `[from, to]`: weekdays minus the holiday table.
    pub fn nyse(from: NaiveDate, to: NaiveDate) -> ScdResult<Self> {
        if from > to {
            return Err(ScdError::Config(format!(
                "nyse calendar range is empty: {from} > {to}"
            )));
        }
        let dates = from
            .iter_days()
            .take_while(|d| *d <= to)
            .filter(|d| is_nyse_trading_day(*d))
            .collect();
        Self::new(dates)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.index.contains_key(&date)
    }

    /// Fails with `CalendarGap` if `date` is not a calendar date.
    pub fn require(&self, date: NaiveDate) -> ScdResult<()> {
        if self.contains(date) {
            Ok(())
        } else {
            Err(ScdError::CalendarGap {
                date,
                reason: "date is not in the business calendar".to_string(),
            })
        }
    }

    /// The calendar date immediately after `date`.
    ///
    /// `date` must itself be a calendar date, and must not be the last one.
    pub fn next_after(&self, date: NaiveDate) -> ScdResult<NaiveDate> {
        let i = *self.index.get(&date).ok_or_else(|| ScdError::CalendarGap {
            date,
            reason: "date is not in the business calendar".to_string(),
        })?;
        self.dates
            .get(i + 1)
            .copied()
            .ok_or_else(|| ScdError::CalendarGap {
                date,
                reason: "no calendar date after the last one".to_string(),
            })
    }

    pub fn first(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }
}

// ---------------------------------------------------------------------------
// NYSE trading days 2023–2026
// ---------------------------------------------------------------------------

pub fn is_nyse_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_nyse_holiday(date)
}

/// Observed NYSE full-day closures. Dates outside 2023–2026 are treated as
/// plain weekdays.
fn is_nyse_holiday(date: NaiveDate) -> bool {
    const HOLIDAYS: &[(i32, u32, u32)] = &[
        // 2023
        (2023, 1, 2),
        (2023, 1, 16),
        (2023, 2, 20),
        (2023, 4, 7),
        (2023, 5, 29),
        (2023, 6, 19),
        (2023, 7, 4),
        (2023, 9, 4),
        (2023, 11, 23),
        (2023, 12, 25),
        // 2024
        (2024, 1, 1),
        (2024, 1, 15),
        (2024, 2, 19),
        (2024, 3, 29),
        (2024, 5, 27),
        (2024, 6, 19),
        (2024, 7, 4),
        (2024, 9, 2),
        (2024, 11, 28),
        (2024, 12, 25),
        // 2025
        (2025, 1, 1),
        (2025, 1, 9), // national day of mourning
        (2025, 1, 20),
        (2025, 2, 17),
        (2025, 4, 18),
        (2025, 5, 26),
        (2025, 6, 19),
        (2025, 7, 4),
        (2025, 9, 1),
        (2025, 11, 27),
        (2025, 12, 25),
        // 2026
        (2026, 1, 1),
        (2026, 1, 19),
        (2026, 2, 16),
        (2026, 4, 3),
        (2026, 5, 25),
        (2026, 6, 19),
        (2026, 7, 3), // July 4 is a Saturday
        (2026, 9, 7),
        (2026, 11, 26),
        (2026, 12, 25),
    ];
    HOLIDAYS.contains(&(date.year(), date.month(), date.day()))
}
