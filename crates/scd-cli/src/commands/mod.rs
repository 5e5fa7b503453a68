//! Command handler modules for scd-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod replay;
pub mod table;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use scd_config::{report_unused_keys, LoadedConfig, TableConfig, UnusedKeyPolicy};
use scd_reconcile::{
    Batch, IntervalRecord, PresenceMode, SnapshotRow, SyncResult, TableOptions,
};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::InputFormat;

pub struct LoadedTable {
    pub loaded: LoadedConfig,
    pub options: TableOptions,
}

/// Load layered config into table options. A relative `calendar.file`
/// resolves against the directory of the first config path.
pub fn load_table(config_paths: &[String], unused: UnusedKeyPolicy) -> Result<LoadedTable> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = scd_config::load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, unused)?;
    for p in &report.unused_leaf_pointers {
        warn!(pointer = %p, "config key is not read by anything");
    }

    let config = TableConfig::from_json(&loaded.config_json)?;
    let base_dir = config_paths
        .first()
        .and_then(|p| Path::new(p).parent())
        .unwrap_or_else(|| Path::new("."));
    let options = config.options(base_dir)?;
    Ok(LoadedTable { loaded, options })
}

/// Execute `scd check`.
pub fn check(config_paths: &[String], fail_unused: bool) -> Result<()> {
    let policy = if fail_unused {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let t = load_table(config_paths, policy)?;
    let schema = &t.options.schema;

    println!("config_ok=true config_hash={}", t.loaded.config_hash);
    println!("table={}", schema.name);
    println!("keys={}", schema.keys.join(","));
    println!("values={}", schema.values.join(","));
    match &t.options.calendar {
        Some(cal) => println!(
            "mode=business_calendar calendar_dates={} first={} last={}",
            cal.len(),
            cal.first(),
            cal.last()
        ),
        None => println!("mode=open_ended"),
    }
    let presence = match t.options.presence {
        PresenceMode::Inferred => "inferred",
        PresenceMode::Explicit => "explicit",
    };
    println!("presence={presence}");
    println!("allow_unsynced={}", t.options.allow_unsynced);
    Ok(())
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    s.trim()
        .parse::<NaiveDate>()
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

/// Read a CSV or JSON records file into a raw batch.
pub fn read_batch(path: &str, format: Option<InputFormat>) -> Result<Batch> {
    let format = format.unwrap_or_else(|| {
        let is_json = Path::new(path)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            InputFormat::Json
        } else {
            InputFormat::Csv
        }
    });
    let raw = fs::read_to_string(path).with_context(|| format!("read input failed: {path}"))?;
    // Strip UTF-8 BOM if present.
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
    let batch = match format {
        InputFormat::Csv => Batch::from_csv_str(raw),
        InputFormat::Json => Batch::from_json_str(raw),
    }
    .with_context(|| format!("parse input failed: {path}"))?;
    Ok(batch)
}

pub fn print_sync_result(r: &SyncResult) {
    println!(
        "synced date={} rows_total={} rows_new={} rows_changed={} rows_deleted={} rows_unchanged={} rows_extended_back={} rows_extended_forward={} rows_reappeared={} rows_reopened={}",
        r.date,
        r.rows_total,
        r.rows_new,
        r.rows_changed,
        r.rows_deleted,
        r.rows_unchanged,
        r.rows_extended_back,
        r.rows_extended_forward,
        r.rows_reappeared,
        r.rows_reopened
    );
}

fn format_values(values: &[Option<String>]) -> String {
    values
        .iter()
        .map(|v| v.as_deref().unwrap_or("NULL"))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn print_record(r: &IntervalRecord) {
    println!(
        "record key={} valid_from={} valid_to={} attrs={}",
        r.key,
        r.valid_from,
        r.valid_to,
        format_values(r.attributes.values())
    );
}

/// Header is the declared key columns then value columns; NULL is an empty cell.
pub fn write_rows_csv(options: &TableOptions, rows: &[SnapshotRow]) -> Result<()> {
    let mut w = csv::Writer::from_writer(std::io::stdout());
    w.write_record(options.schema.all_columns())
        .context("write csv header failed")?;
    for row in rows {
        let cells = row
            .key
            .parts()
            .iter()
            .map(String::as_str)
            .chain(row.attributes.values().iter().map(|v| v.as_deref().unwrap_or("")));
        w.write_record(cells).context("write csv row failed")?;
    }
    w.flush().context("flush csv failed")?;
    Ok(())
}
