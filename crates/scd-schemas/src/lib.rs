//! scd-schemas
//!
//! Shared data model for slowly-changing-dimension (type 2) tables:
//! entity keys, attribute tuples, interval rows, sync-log entries, sync
//! results and the error taxonomy every other crate speaks.
//!
//! Pure types. No IO, no wall-clock.

mod error;
mod sync;
mod types;

pub use error::*;
pub use sync::*;
pub use types::*;
