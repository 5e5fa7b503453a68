//! scd-reconcile
//!
//! Interval reconciliation for SCD type 2 tables:
//! - record-store contract and an in-memory store
//! - presence oracles (inferred from coverage, or explicit)
//! - the reconciliation engine (plan, then apply in one transaction)
//! - snapshot reconstruction and sync-log queries
//! - [`ScdTable`], the facade tying them together
//!
//! Deterministic. The only clock read is `ScdTable::sync` stamping
//! `synced_at`.

mod engine;
mod memory;
mod presence;
mod reconstruct;
mod store;
mod table;
mod tracker;

pub use engine::{apply_plan, ReconciliationEngine, SyncPlan};
pub use memory::{MemoryStore, MemoryTx};
pub use presence::{ExplicitPresence, InferredPresence, PresenceOracle};
pub use reconstruct::SnapshotReconstructor;
pub use store::{Mutation, RecordStore, StoreTx, SyncView};
pub use table::{ScdTable, TableOptions};
pub use tracker::SyncTracker;

pub use scd_calendar::{BoundaryResolver, BusinessCalendar, Resolver};
pub use scd_canonical::{canonicalize, Batch};
pub use scd_schemas::*;
