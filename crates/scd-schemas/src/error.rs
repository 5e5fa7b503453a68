//! Error taxonomy for sync / reconstruction calls.
//!
//! Every error is local to one call. Nothing here implies global state was
//! touched: a failed `sync` leaves the store exactly as it was.

use chrono::NaiveDate;
use thiserror::Error;

use crate::Key;

/// Declared columns do not line up with an input batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing declared columns: {missing:?}")]
    MissingColumns { missing: Vec<String> },

    #[error("declared column {column} matches several input columns: {candidates:?}")]
    AmbiguousColumn {
        column: String,
        candidates: Vec<String>,
    },

    #[error("row {row} has {got} cells, header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("input is not a table: {reason}")]
    NotTabular { reason: String },
}

/// Record-store failures. Any of these aborts the enclosing transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("constraint violated for key {key} at {valid_from}: {reason}")]
    Constraint {
        key: Key,
        valid_from: NaiveDate,
        reason: String,
    },

    #[error("no record for key {key} starting at {valid_from}")]
    NotFound { key: Key, valid_from: NaiveDate },

    #[error("store io failed: {reason}")]
    Io { reason: String },

    #[error("injected write failure after {after} writes")]
    Injected { after: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScdError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("null key column {column} at row {row}")]
    NullKey { column: String, row: usize },

    #[error("duplicate key {key} at rows {first_row} and {row}")]
    DuplicateKey {
        key: Key,
        first_row: usize,
        row: usize,
    },

    #[error("{what} arity mismatch: expected {expected}, got {got}")]
    Arity {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("calendar gap at {date}: {reason}")]
    CalendarGap { date: NaiveDate, reason: String },

    #[error("date {date} was never synced")]
    NotSynced { date: NaiveDate },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type ScdResult<T> = Result<T, ScdError>;
