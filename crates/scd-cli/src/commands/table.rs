//! Postgres-backed table commands: `sync`, `get`, `dates`, `db status`,
//! `db init`.

use anyhow::{Context, Result};
use chrono::Utc;
use scd_config::UnusedKeyPolicy;
use scd_db::{PgPool, PgTable};

use super::{load_table, parse_date, print_sync_result, read_batch, write_rows_csv, LoadedTable};
use crate::InputFormat;

async fn open(config_paths: &[String]) -> Result<(LoadedTable, PgTable, PgPool)> {
    let t = load_table(config_paths, UnusedKeyPolicy::Warn)?;
    let table = PgTable::new(&t.options)?;
    let pool = scd_db::connect_from_env().await?;
    Ok((t, table, pool))
}

/// Execute `scd sync`: canonicalize one input file and sync it at `date`.
pub async fn sync(
    config_paths: &[String],
    date: &str,
    input: &str,
    format: Option<InputFormat>,
) -> Result<()> {
    let date = parse_date(date)?;
    // Parse before connecting: bad input never touches the database.
    let t = load_table(config_paths, UnusedKeyPolicy::Warn)?;
    let batch = read_batch(input, format)?;
    let snapshot = scd_reconcile::canonicalize(&batch, &t.options.schema)
        .with_context(|| format!("canonicalize failed: {input}"))?;

    let table = PgTable::new(&t.options)?;
    let pool = scd_db::connect_from_env().await?;
    let r = table
        .sync(&pool, date, &snapshot, Utc::now())
        .await
        .with_context(|| format!("sync {date} failed for table {}", t.options.schema.name))?;

    print_sync_result(&r);
    println!("config_hash={}", t.loaded.config_hash);
    Ok(())
}

/// Execute `scd get`.
pub async fn get(config_paths: &[String], date: &str) -> Result<()> {
    let date = parse_date(date)?;
    let (t, table, pool) = open(config_paths).await?;
    let rows = table.get(&pool, date).await?;
    write_rows_csv(&t.options, &rows)
}

/// Execute `scd dates`.
pub async fn dates(config_paths: &[String]) -> Result<()> {
    let (_t, table, pool) = open(config_paths).await?;
    let log = table.sync_log(&pool).await?;
    for e in &log {
        println!(
            "date={} synced_at={} row_count={}",
            e.date,
            e.synced_at.to_rfc3339(),
            e.row_count
        );
    }
    println!("synced_dates={}", log.len());
    Ok(())
}

/// Execute `scd db status`.
pub async fn status(config_paths: &[String]) -> Result<()> {
    let (_t, table, pool) = open(config_paths).await?;
    let s = table.status(&pool).await?;
    println!(
        "db_ok={} has_table={} has_sync_log={} has_presence={}",
        s.ok, s.has_table, s.has_sync_log, s.has_presence
    );
    if s.has_table {
        println!("records={}", table.record_count(&pool).await?);
    }
    Ok(())
}

/// Execute `scd db init`.
pub async fn init(config_paths: &[String]) -> Result<()> {
    let (t, table, pool) = open(config_paths).await?;
    table.init(&pool).await?;
    println!(
        "initialized=true table={} sync_log={} strict={}",
        table.sql().table(),
        table.sql().sync_log_table(),
        t.options.calendar.is_some()
    );
    Ok(())
}
