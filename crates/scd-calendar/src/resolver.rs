//! Boundary resolution strategy.
//!
//! The engine never decides on its own where a freshly placed segment ends.
//! It asks a [`BoundaryResolver`], which either answers "up to the next
//! synced date, or open" or "up to the next business date".

use chrono::NaiveDate;
use scd_schemas::{Boundary, CoverageMode, ScdResult};

use crate::BusinessCalendar;

pub trait BoundaryResolver: Send + Sync {
    fn mode(&self) -> CoverageMode;

    /// Reject a date that may not be synced at all.
    fn check_sync_date(&self, date: NaiveDate) -> ScdResult<()>;

    /// Exclusive end of coverage for a key observed at `date` and not yet
    /// known to continue. `next_synced` is the earliest synced date after
    /// `date`, if any.
    fn successor(&self, date: NaiveDate, next_synced: Option<NaiveDate>) -> ScdResult<Boundary>;
}

/// NULL `valid_to` allowed. Coverage runs to the next synced date, or stays open.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenEnded;

impl BoundaryResolver for OpenEnded {
    fn mode(&self) -> CoverageMode {
        CoverageMode::OpenEnded
    }

    fn check_sync_date(&self, _date: NaiveDate) -> ScdResult<()> {
        Ok(())
    }

    fn successor(&self, _date: NaiveDate, next_synced: Option<NaiveDate>) -> ScdResult<Boundary> {
        Ok(next_synced.into())
    }
}

/// Every boundary is a concrete calendar date.
#[derive(Clone, Debug)]
pub struct CalendarBoundary {
    calendar: BusinessCalendar,
}

impl CalendarBoundary {
    pub fn new(calendar: BusinessCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }
}

impl BoundaryResolver for CalendarBoundary {
    fn mode(&self) -> CoverageMode {
        CoverageMode::BusinessCalendar
    }

    fn check_sync_date(&self, date: NaiveDate) -> ScdResult<()> {
        self.calendar.require(date)
    }

    fn successor(&self, date: NaiveDate, _next_synced: Option<NaiveDate>) -> ScdResult<Boundary> {
        self.calendar.next_after(date).map(Boundary::Date)
    }
}

/// Runtime-selected resolver, built from configuration.
#[derive(Clone, Debug)]
pub enum Resolver {
    Open(OpenEnded),
    Calendar(CalendarBoundary),
}

impl Resolver {
    pub fn open() -> Self {
        Resolver::Open(OpenEnded)
    }

    pub fn calendar(calendar: BusinessCalendar) -> Self {
        Resolver::Calendar(CalendarBoundary::new(calendar))
    }

    /// `Some` enables business-calendar mode.
    pub fn from_calendar(calendar: Option<BusinessCalendar>) -> Self {
        match calendar {
            Some(c) => Self::calendar(c),
            None => Self::open(),
        }
    }

    fn inner(&self) -> &dyn BoundaryResolver {
        match self {
            Resolver::Open(r) => r,
            Resolver::Calendar(r) => r,
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::open()
    }
}

impl BoundaryResolver for Resolver {
    fn mode(&self) -> CoverageMode {
        self.inner().mode()
    }

    fn check_sync_date(&self, date: NaiveDate) -> ScdResult<()> {
        self.inner().check_sync_date(date)
    }

    fn successor(&self, date: NaiveDate, next_synced: Option<NaiveDate>) -> ScdResult<Boundary> {
        self.inner().successor(date, next_synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scd_schemas::ScdError;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn open_ended_uses_next_synced_date() {
        let r = Resolver::open();
        assert_eq!(
            r.successor(d("2025-12-01"), Some(d("2025-12-05"))).unwrap(),
            Boundary::Date(d("2025-12-05"))
        );
        assert_eq!(r.successor(d("2025-12-01"), None).unwrap(), Boundary::Open);
        assert_eq!(r.mode(), CoverageMode::OpenEnded);
    }

    #[test]
    fn calendar_ignores_synced_dates() {
        let cal = BusinessCalendar::new(vec![d("2025-12-01"), d("2025-12-02"), d("2025-12-03")]).unwrap();
        let r = Resolver::calendar(cal);
        assert_eq!(
            r.successor(d("2025-12-01"), Some(d("2025-12-03"))).unwrap(),
            Boundary::Date(d("2025-12-02"))
        );
        assert_eq!(r.mode(), CoverageMode::BusinessCalendar);
    }

    #[test]
    fn calendar_rejects_foreign_dates() {
        let cal = BusinessCalendar::new(vec![d("2025-12-01"), d("2025-12-02")]).unwrap();
        let r = Resolver::from_calendar(Some(cal));
        assert!(matches!(
            r.check_sync_date(d("2025-12-06")),
            Err(ScdError::CalendarGap { .. })
        ));
        assert!(matches!(
            r.successor(d("2025-12-02"), None),
            Err(ScdError::CalendarGap { .. })
        ));
    }
}
