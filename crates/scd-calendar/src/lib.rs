//! scd-calendar
//!
//! Business calendar and the boundary-resolver strategy injected into the
//! reconciliation engine. Deterministic, pure logic. No IO.

mod calendar;
mod resolver;

pub use calendar::{is_nyse_trading_day, BusinessCalendar};
pub use resolver::{BoundaryResolver, CalendarBoundary, OpenEnded, Resolver};
