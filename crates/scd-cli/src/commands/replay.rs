//! `scd replay`: sync a sequence of dated snapshot files into an in-memory
//! table and print the resulting intervals.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use scd_config::UnusedKeyPolicy;
use scd_reconcile::ScdTable;

use super::{load_table, parse_date, print_record, print_sync_result, read_batch, write_rows_csv};
use crate::InputFormat;

/// `DATE=PATH`.
pub fn parse_sync_arg(arg: &str) -> Result<(NaiveDate, String)> {
    let (date, path) = arg
        .split_once('=')
        .with_context(|| format!("invalid --sync '{arg}', expected DATE=PATH"))?;
    if path.trim().is_empty() {
        anyhow::bail!("invalid --sync '{arg}': empty path");
    }
    Ok((parse_date(date)?, path.trim().to_string()))
}

pub fn replay(
    config_paths: &[String],
    syncs: &[String],
    format: Option<InputFormat>,
    get: Option<&str>,
) -> Result<()> {
    let t = load_table(config_paths, UnusedKeyPolicy::Warn)?;
    let steps = syncs
        .iter()
        .map(|s| parse_sync_arg(s))
        .collect::<Result<Vec<_>>>()?;
    let get = get.map(parse_date).transpose()?;

    let mut table = ScdTable::in_memory(t.options.clone());
    // One fixed stamp so repeated replays print identical output.
    let stamp = DateTime::<Utc>::UNIX_EPOCH;

    for (date, path) in &steps {
        let batch = read_batch(path, format)?;
        let snapshot = scd_reconcile::canonicalize(&batch, table.schema())
            .with_context(|| format!("canonicalize failed: {path}"))?;
        let r = table
            .sync_at(*date, &snapshot, stamp)
            .with_context(|| format!("sync {date} failed"))?;
        print_sync_result(&r);
    }

    let records = table.records()?;
    println!("records={}", records.len());
    for r in &records {
        print_record(r);
    }

    if let Some(date) = get {
        let rows = table.get(date)?;
        write_rows_csv(&t.options, &rows)?;
    }
    Ok(())
}
