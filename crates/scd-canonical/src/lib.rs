//! scd-canonical
//!
//! Converts heterogeneous tabular input (CSV, JSON records) into a canonical
//! [`scd_schemas::Snapshot`]: one `(key, attributes)` row per entity.
//!
//! Pure. The only IO is reading from a caller-supplied `Read`.

mod batch;
mod canonicalize;

pub use batch::Batch;
pub use canonicalize::{canonicalize, normalize_column_name, resolve_columns};
