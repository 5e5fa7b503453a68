//! scd-db
//!
//! PostgreSQL persistence for SCD tables. A sync runs as one Postgres
//! transaction:
//!
//! 1. take `pg_advisory_xact_lock` on the table name (single writer)
//! 2. load the working set (records and presence rows of every key in the
//!    snapshot or covering the date, plus the sync log) into a
//!    [`MemoryStore`]
//! 3. plan with the same [`ReconciliationEngine`] the in-memory table uses
//! 4. replay the planned mutations as SQL, upsert the sync log, replace
//!    presence rows
//! 5. commit
//!
//! Any error drops the transaction, which rolls it back.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use scd_reconcile::{
    Attributes, Boundary, IntervalRecord, Key, MemoryStore, Mutation, PresenceMode,
    ReconciliationEngine, ScdError, Snapshot, SnapshotRow, SyncLogEntry, SyncPlan, SyncResult,
    TableOptions,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use tracing::{debug, info};

mod sql;

pub use sql::{validate_identifier, TableSql};
pub use sqlx::PgPool;

pub const ENV_DB_URL: &str = "SCD_DATABASE_URL";

/// Connect to Postgres using SCD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_table: bool,
    pub has_sync_log: bool,
    pub has_presence: bool,
}

/// An SCD table stored in Postgres.
#[derive(Debug, Clone)]
pub struct PgTable {
    sql: TableSql,
    engine: ReconciliationEngine,
    strict: bool,
    allow_unsynced: bool,
}

impl PgTable {
    pub fn new(options: &TableOptions) -> Result<Self> {
        Ok(Self {
            sql: TableSql::new(&options.schema)?,
            engine: options.engine(),
            strict: options.calendar.is_some(),
            allow_unsynced: options.allow_unsynced,
        })
    }

    pub fn sql(&self) -> &TableSql {
        &self.sql
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    fn explicit_presence(&self) -> bool {
        self.engine.presence_mode() == PresenceMode::Explicit
    }

    /// Create the interval table, its sync log and (explicit presence mode)
    /// its presence table. Idempotent.
    pub async fn init(&self, pool: &PgPool) -> Result<()> {
        let mut stmts = vec![self.sql.create_records(self.strict), self.sql.create_sync_log()];
        if self.explicit_presence() {
            stmts.push(self.sql.create_presence());
        }
        for stmt in stmts {
            sqlx::query(&stmt)
                .execute(pool)
                .await
                .with_context(|| format!("init failed for table {}", self.sql.table()))?;
        }
        Ok(())
    }

    /// Connectivity plus which of this table's relations exist.
    pub async fn status(&self, pool: &PgPool) -> Result<DbStatus> {
        let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
            .fetch_one(pool)
            .await
            .context("status connectivity query failed")?;

        Ok(DbStatus {
            ok: one == 1,
            has_table: table_exists(pool, self.sql.table()).await?,
            has_sync_log: table_exists(pool, &self.sql.sync_log_table()).await?,
            has_presence: table_exists(pool, &self.sql.presence_table()).await?,
        })
    }

    pub async fn sync(
        &self,
        pool: &PgPool,
        date: NaiveDate,
        snapshot: &Snapshot,
        synced_at: DateTime<Utc>,
    ) -> Result<SyncResult> {
        let mut tx = pool.begin().await.context("sync: begin failed")?;

        sqlx::query(self.sql.advisory_lock())
            .bind(self.sql.table())
            .execute(&mut *tx)
            .await
            .context("sync: advisory lock failed")?;

        let working = self.load_working_set(&mut tx, date, snapshot).await?;
        let plan = self.engine.plan(&working, date, snapshot)?;
        self.apply(&mut tx, &plan, synced_at).await?;

        tx.commit().await.context("sync: commit failed")?;

        let r = &plan.result;
        info!(
            table = self.sql.table(),
            date = %r.date,
            writes = plan.mutations.len(),
            rows_total = r.rows_total,
            rows_new = r.rows_new,
            rows_changed = r.rows_changed,
            rows_deleted = r.rows_deleted,
            rows_unchanged = r.rows_unchanged,
            rows_reopened = r.rows_reopened,
            "sync committed"
        );
        Ok(plan.result)
    }

    async fn load_working_set(
        &self,
        conn: &mut PgConnection,
        date: NaiveDate,
        snapshot: &Snapshot,
    ) -> Result<MemoryStore> {
        let arrays = key_columns(self.sql.key_arity(), snapshot.keys());

        let stmt = self.sql.select_affected_records();
        let mut q = sqlx::query(&stmt);
        for a in &arrays {
            q = q.bind(a.clone());
        }
        let rows = q
            .bind(date)
            .fetch_all(&mut *conn)
            .await
            .context("sync: load records failed")?;
        let records = rows
            .iter()
            .map(|row| self.decode_record(row))
            .collect::<Result<Vec<_>>>()?;

        let sync_log = self.fetch_sync_log(&mut *conn).await?;

        let mut presence = Vec::new();
        if self.explicit_presence() {
            let stmt = self.sql.select_affected_presence();
            let mut q = sqlx::query(&stmt);
            for a in &arrays {
                q = q.bind(a.clone());
            }
            let rows = q
                .bind(date)
                .fetch_all(&mut *conn)
                .await
                .context("sync: load presence failed")?;
            for row in &rows {
                let key = self.decode_key(row)?;
                let as_of: NaiveDate = row.try_get(self.sql.key_arity())?;
                presence.push((key, as_of));
            }
        }

        debug!(
            table = self.sql.table(),
            date = %date,
            records = records.len(),
            synced_dates = sync_log.len(),
            presence_rows = presence.len(),
            "loaded working set"
        );
        Ok(MemoryStore::from_parts(records, sync_log, presence)?)
    }

    async fn apply(&self, conn: &mut PgConnection, plan: &SyncPlan, synced_at: DateTime<Utc>) -> Result<()> {
        for m in &plan.mutations {
            self.apply_mutation(&mut *conn, m).await?;
        }

        let row_count = i64::try_from(plan.result.rows_total).context("row_count out of range")?;
        sqlx::query(&self.sql.upsert_sync_log())
            .bind(plan.date)
            .bind(synced_at)
            .bind(row_count)
            .execute(&mut *conn)
            .await
            .context("sync: sync log upsert failed")?;

        if let Some(keys) = &plan.presence {
            sqlx::query(&self.sql.delete_presence_for_date())
                .bind(plan.date)
                .execute(&mut *conn)
                .await
                .context("sync: presence delete failed")?;
            let stmt = self.sql.insert_presence();
            let mut q = sqlx::query(&stmt).bind(plan.date);
            for a in key_columns(self.sql.key_arity(), keys.iter()) {
                q = q.bind(a);
            }
            q.execute(&mut *conn)
                .await
                .context("sync: presence insert failed")?;
        }
        Ok(())
    }

    async fn apply_mutation(&self, conn: &mut PgConnection, m: &Mutation) -> Result<()> {
        let affected = match m {
            Mutation::Insert(r) => {
                let stmt = self.sql.insert_record();
                let mut q = sqlx::query(&stmt);
                for k in r.key.parts() {
                    q = q.bind(k.clone());
                }
                for v in r.attributes.values() {
                    q = q.bind(v.clone());
                }
                q.bind(r.valid_from)
                    .bind(r.valid_to.as_date())
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| write_error(e, m))?
                    .rows_affected()
            }
            Mutation::CloseAt {
                key,
                valid_from,
                valid_to,
            } => {
                let stmt = self.sql.close_at();
                self.update_one(&mut *conn, &stmt, Some(*valid_to), key, *valid_from, m)
                    .await?
            }
            Mutation::ExtendForward {
                key,
                valid_from,
                valid_to,
            } => {
                let stmt = self.sql.extend_forward();
                self.update_one(&mut *conn, &stmt, valid_to.as_date(), key, *valid_from, m)
                    .await?
            }
            Mutation::ExtendBackward {
                key,
                valid_from,
                new_valid_from,
            } => {
                let stmt = self.sql.extend_backward();
                self.update_one(&mut *conn, &stmt, Some(*new_valid_from), key, *valid_from, m)
                    .await?
            }
            Mutation::Delete { key, valid_from } => {
                let stmt = self.sql.delete_record();
                let mut q = sqlx::query(&stmt);
                for k in key.parts() {
                    q = q.bind(k.clone());
                }
                q.bind(*valid_from)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| write_error(e, m))?
                    .rows_affected()
            }
        };

        if affected != 1 {
            bail!("sync: {m:?} touched {affected} rows, expected 1");
        }
        debug!(table = self.sql.table(), mutation = ?m, "applied");
        Ok(())
    }

    /// `new_value` is `None` only for an open `valid_to`.
    async fn update_one(
        &self,
        conn: &mut PgConnection,
        stmt: &str,
        new_value: Option<NaiveDate>,
        key: &Key,
        valid_from: NaiveDate,
        m: &Mutation,
    ) -> Result<u64> {
        let mut q = sqlx::query(stmt).bind(new_value);
        for k in key.parts() {
            q = q.bind(k.clone());
        }
        let done = q
            .bind(valid_from)
            .execute(&mut *conn)
            .await
            .map_err(|e| write_error(e, m))?;
        Ok(done.rows_affected())
    }

    /// One row per key covering `date`, ordered by key.
    pub async fn get(&self, pool: &PgPool, date: NaiveDate) -> Result<Vec<SnapshotRow>> {
        if !self.allow_unsynced && !self.is_synced(pool, date).await? {
            return Err(ScdError::NotSynced { date }.into());
        }
        let rows = sqlx::query(&self.sql.select_covering())
            .bind(date)
            .fetch_all(pool)
            .await
            .context("get failed")?;
        rows.iter()
            .map(|row| {
                let r = self.decode_record(row)?;
                Ok(SnapshotRow {
                    key: r.key,
                    attributes: r.attributes,
                })
            })
            .collect()
    }

    pub async fn is_synced(&self, pool: &PgPool, date: NaiveDate) -> Result<bool> {
        let row = sqlx::query(&self.sql.select_sync_log_entry())
            .bind(date)
            .fetch_optional(pool)
            .await
            .context("sync log lookup failed")?;
        Ok(row.is_some())
    }

    /// Ascending.
    pub async fn synced_dates(&self, pool: &PgPool) -> Result<Vec<NaiveDate>> {
        let mut conn = pool.acquire().await.context("acquire failed")?;
        Ok(self
            .fetch_sync_log(&mut conn)
            .await?
            .into_iter()
            .map(|e| e.date)
            .collect())
    }

    pub async fn sync_log(&self, pool: &PgPool) -> Result<Vec<SyncLogEntry>> {
        let mut conn = pool.acquire().await.context("acquire failed")?;
        self.fetch_sync_log(&mut conn).await
    }

    /// All interval rows, ordered by `(key, valid_from)`.
    pub async fn records(&self, pool: &PgPool) -> Result<Vec<IntervalRecord>> {
        let rows = sqlx::query(&self.sql.select_all_records())
            .fetch_all(pool)
            .await
            .context("records query failed")?;
        rows.iter().map(|row| self.decode_record(row)).collect()
    }

    pub async fn record_count(&self, pool: &PgPool) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(&self.sql.count_records())
            .fetch_one(pool)
            .await
            .context("record count failed")?;
        Ok(n)
    }

    async fn fetch_sync_log(&self, conn: &mut PgConnection) -> Result<Vec<SyncLogEntry>> {
        let rows = sqlx::query(&self.sql.select_sync_log())
            .fetch_all(&mut *conn)
            .await
            .context("sync log query failed")?;
        rows.iter()
            .map(|row| {
                let row_count: i64 = row.try_get("row_count")?;
                Ok(SyncLogEntry {
                    date: row.try_get("date")?,
                    synced_at: row.try_get("synced_at")?,
                    row_count: u64::try_from(row_count)
                        .map_err(|_| anyhow!("negative row_count in sync log: {row_count}"))?,
                })
            })
            .collect()
    }

    fn decode_key(&self, row: &PgRow) -> Result<Key> {
        let parts = (0..self.sql.key_arity())
            .map(|i| row.try_get::<String, _>(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Key(parts))
    }

    /// Column order: keys, values, valid_from, valid_to.
    fn decode_record(&self, row: &PgRow) -> Result<IntervalRecord> {
        let k = self.sql.key_arity();
        let v = self.sql.value_arity();
        let key = self.decode_key(row)?;
        let values = (k..k + v)
            .map(|i| row.try_get::<Option<String>, _>(i))
            .collect::<Result<Vec<_>, _>>()?;
        let valid_from: NaiveDate = row.try_get(k + v)?;
        let valid_to: Option<NaiveDate> = row.try_get(k + v + 1)?;
        Ok(IntervalRecord::new(
            key,
            Attributes(values),
            valid_from,
            Boundary::from(valid_to),
        ))
    }
}

/// Transpose keys into one column vector per key position, for `unnest`.
fn key_columns<'a>(arity: usize, keys: impl Iterator<Item = &'a Key>) -> Vec<Vec<String>> {
    let mut cols: Vec<Vec<String>> = vec![Vec::new(); arity];
    for key in keys {
        for (col, part) in cols.iter_mut().zip(key.parts()) {
            col.push(part.clone());
        }
    }
    cols
}

async fn table_exists(pool: &PgPool, name: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = current_schema() and table_name = $1
        )
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;
    Ok(exists)
}

fn write_error(e: sqlx::Error, m: &Mutation) -> anyhow::Error {
    if let sqlx::Error::Database(db_err) = &e {
        if let Some(constraint) = db_err.constraint() {
            return anyhow!(
                "sync: constraint {constraint} violated for key {} ({})",
                m.key(),
                db_err.message()
            );
        }
    }
    anyhow::Error::new(e).context(format!("sync: write failed for key {}", m.key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scd_reconcile::TableSchema;

    #[test]
    fn keys_transpose_to_columns() {
        let keys = [Key::new(["XNYS", "AAPL"]), Key::new(["XNAS", "MSFT"])];
        let cols = key_columns(2, keys.iter());
        assert_eq!(
            cols,
            vec![
                vec!["XNYS".to_string(), "XNAS".to_string()],
                vec!["AAPL".to_string(), "MSFT".to_string()],
            ]
        );
        assert_eq!(key_columns(1, std::iter::empty()), vec![Vec::<String>::new()]);
    }

    #[test]
    fn calendar_option_selects_strict_ddl() {
        let schema = TableSchema::new("t", ["id"], ["v"]);
        let open = PgTable::new(&TableOptions::new(schema.clone())).unwrap();
        assert!(!open.strict);

        let cal = scd_reconcile::BusinessCalendar::new(vec![
            "2025-01-02".parse().unwrap(),
            "2025-01-03".parse().unwrap(),
        ])
        .unwrap();
        let strict = PgTable::new(&TableOptions::new(schema).with_calendar(cal)).unwrap();
        assert!(strict.strict);
    }

    #[test]
    fn unsafe_table_names_are_refused() {
        let schema = TableSchema::new("t\"; --", ["id"], ["v"]);
        assert!(PgTable::new(&TableOptions::new(schema)).is_err());
    }
}
