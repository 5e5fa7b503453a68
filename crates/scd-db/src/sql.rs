//! SQL text for one SCD table.
//!
//! Identifiers are validated once in [`TableSql::new`] and always emitted
//! double-quoted. Every value goes through a bind parameter.

use anyhow::{bail, Result};
use scd_schemas::TableSchema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSql {
    table: String,
    keys: Vec<String>,
    values: Vec<String>,
}

/// `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes (Postgres NAMEDATALEN - 1).
pub fn validate_identifier(s: &str) -> Result<()> {
    let mut chars = s.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid sql identifier: {s:?}");
    }
    if s.len() > 63 {
        bail!("sql identifier too long ({} bytes): {s}", s.len());
    }
    Ok(())
}

fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

impl TableSql {
    pub fn new(schema: &TableSchema) -> Result<Self> {
        // Derived names must fit too.
        validate_identifier(&format!("{}_presence", schema.name))?;
        validate_identifier(&format!("{}_sync_log", schema.name))?;
        for c in schema.all_columns() {
            validate_identifier(c)?;
        }
        for reserved in ["valid_from", "valid_to", "as_of_date"] {
            if schema.all_columns().any(|c| c == reserved) {
                bail!("column name {reserved:?} is reserved for interval bookkeeping");
            }
        }
        Ok(Self {
            table: schema.name.clone(),
            keys: schema.keys.clone(),
            values: schema.values.clone(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn sync_log_table(&self) -> String {
        format!("{}_sync_log", self.table)
    }

    pub fn presence_table(&self) -> String {
        format!("{}_presence", self.table)
    }

    pub fn key_arity(&self) -> usize {
        self.keys.len()
    }

    pub fn value_arity(&self) -> usize {
        self.values.len()
    }

    fn key_list(&self, alias: Option<&str>) -> String {
        self.keys
            .iter()
            .map(|k| match alias {
                Some(a) => format!("{a}.{}", quote(k)),
                None => quote(k),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `"k1" = $first and "k2" = $first+1 ...`
    fn key_match(&self, first: usize) -> String {
        self.keys
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{} = ${}", quote(k), first + i))
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn record_columns(&self) -> String {
        let mut cols: Vec<String> = self.keys.iter().chain(self.values.iter()).map(|c| quote(c)).collect();
        cols.push(quote("valid_from"));
        cols.push(quote("valid_to"));
        cols.join(", ")
    }

    // -----------------------------------------------------------------------
    // DDL
    // -----------------------------------------------------------------------

    /// `valid_to` is nullable only in open-ended mode.
    pub fn create_records(&self, strict: bool) -> String {
        let mut cols: Vec<String> = Vec::new();
        for k in &self.keys {
            cols.push(format!("  {} text not null", quote(k)));
        }
        for v in &self.values {
            cols.push(format!("  {} text", quote(v)));
        }
        cols.push("  \"valid_from\" date not null".to_string());
        cols.push(format!(
            "  \"valid_to\" date{}",
            if strict { " not null" } else { "" }
        ));
        cols.push(format!(
            "  constraint {} check (\"valid_to\" is null or \"valid_to\" > \"valid_from\")",
            quote(&format!("{}_interval_nonempty", self.table))
        ));
        cols.push(format!(
            "  primary key ({}, \"valid_from\")",
            self.key_list(None)
        ));
        format!(
            "create table if not exists {} (\n{}\n)",
            quote(&self.table),
            cols.join(",\n")
        )
    }

    pub fn create_sync_log(&self) -> String {
        format!(
            "create table if not exists {} (\n  \"date\" date primary key,\n  \"synced_at\" timestamptz not null,\n  \"row_count\" bigint not null check (\"row_count\" >= 0)\n)",
            quote(&self.sync_log_table())
        )
    }

    pub fn create_presence(&self) -> String {
        let mut cols: Vec<String> = self
            .keys
            .iter()
            .map(|k| format!("  {} text not null", quote(k)))
            .collect();
        cols.push("  \"as_of_date\" date not null".to_string());
        cols.push(format!("  primary key (\"as_of_date\", {})", self.key_list(None)));
        format!(
            "create table if not exists {} (\n{}\n)",
            quote(&self.presence_table()),
            cols.join(",\n")
        )
    }

    // -----------------------------------------------------------------------
    // Loading the working set of one sync
    // -----------------------------------------------------------------------

    /// Rows of `alias` whose key is either in the staged key arrays
    /// (`$1..$k`, one `text[]` per key column) or covers `$k+1`.
    fn affected_predicate(&self, alias: &str) -> String {
        let k = self.keys.len();
        let arrays = (1..=k)
            .map(|i| format!("${i}::text[]"))
            .collect::<Vec<_>>()
            .join(", ");
        let staged_match = self
            .keys
            .iter()
            .map(|c| format!("s.{q} = {alias}.{q}", q = quote(c)))
            .collect::<Vec<_>>()
            .join(" and ");
        let covering_match = self
            .keys
            .iter()
            .map(|c| format!("c.{q} = {alias}.{q}", q = quote(c)))
            .collect::<Vec<_>>()
            .join(" and ");
        format!(
            "exists (select 1 from unnest({arrays}) as s({}) where {staged_match})\n   or exists (select 1 from {} c where {covering_match} and c.\"valid_from\" <= ${d} and (c.\"valid_to\" is null or c.\"valid_to\" > ${d}))",
            self.key_list(None),
            quote(&self.table),
            d = k + 1
        )
    }

    /// Binds: one `text[]` per key column, then the sync date.
    pub fn select_affected_records(&self) -> String {
        format!(
            "select {cols}\nfrom {t} r\nwhere {pred}\norder by {keys}, \"valid_from\"",
            cols = self.record_columns_aliased("r"),
            t = quote(&self.table),
            pred = self.affected_predicate("r"),
            keys = self.key_list(Some("r")),
        )
    }

    /// Same binds as [`Self::select_affected_records`].
    pub fn select_affected_presence(&self) -> String {
        format!(
            "select {keys}, p.\"as_of_date\"\nfrom {t} p\nwhere {pred}\norder by \"as_of_date\", {keys}",
            keys = self.key_list(Some("p")),
            t = quote(&self.presence_table()),
            pred = self.affected_predicate("p"),
        )
    }

    fn record_columns_aliased(&self, alias: &str) -> String {
        self.record_columns()
            .split(", ")
            .map(|c| format!("{alias}.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn select_sync_log(&self) -> String {
        format!(
            "select \"date\", \"synced_at\", \"row_count\" from {} order by \"date\"",
            quote(&self.sync_log_table())
        )
    }

    pub fn select_sync_log_entry(&self) -> String {
        format!(
            "select \"date\", \"synced_at\", \"row_count\" from {} where \"date\" = $1",
            quote(&self.sync_log_table())
        )
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Binds: the date.
    pub fn select_covering(&self) -> String {
        format!(
            "select {cols}\nfrom {t}\nwhere \"valid_from\" <= $1 and (\"valid_to\" is null or \"valid_to\" > $1)\norder by {keys}",
            cols = self.record_columns(),
            t = quote(&self.table),
            keys = self.key_list(None),
        )
    }

    pub fn select_all_records(&self) -> String {
        format!(
            "select {cols}\nfrom {t}\norder by {keys}, \"valid_from\"",
            cols = self.record_columns(),
            t = quote(&self.table),
            keys = self.key_list(None),
        )
    }

    pub fn count_records(&self) -> String {
        format!("select count(*)::bigint from {}", quote(&self.table))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Binds: keys, values, valid_from, valid_to.
    pub fn insert_record(&self) -> String {
        let n = self.keys.len() + self.values.len() + 2;
        let params = (1..=n).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");
        format!(
            "insert into {} ({}) values ({})",
            quote(&self.table),
            self.record_columns(),
            params
        )
    }

    /// Binds: the new value, then keys, then the current valid_from.
    fn update_one(&self, column: &str) -> String {
        let k = self.keys.len();
        format!(
            "update {} set {} = $1 where {} and \"valid_from\" = ${}",
            quote(&self.table),
            quote(column),
            self.key_match(2),
            k + 2
        )
    }

    pub fn close_at(&self) -> String {
        self.update_one("valid_to")
    }

    pub fn extend_forward(&self) -> String {
        self.update_one("valid_to")
    }

    pub fn extend_backward(&self) -> String {
        self.update_one("valid_from")
    }

    /// Binds: keys, then valid_from.
    pub fn delete_record(&self) -> String {
        format!(
            "delete from {} where {} and \"valid_from\" = ${}",
            quote(&self.table),
            self.key_match(1),
            self.keys.len() + 1
        )
    }

    /// Binds: date, synced_at, row_count.
    pub fn upsert_sync_log(&self) -> String {
        format!(
            "insert into {} (\"date\", \"synced_at\", \"row_count\") values ($1, $2, $3)\non conflict (\"date\") do update set\n  \"synced_at\" = excluded.\"synced_at\",\n  \"row_count\" = excluded.\"row_count\"",
            quote(&self.sync_log_table())
        )
    }

    /// Binds: date.
    pub fn delete_presence_for_date(&self) -> String {
        format!(
            "delete from {} where \"as_of_date\" = $1",
            quote(&self.presence_table())
        )
    }

    /// Binds: date, then one `text[]` per key column.
    pub fn insert_presence(&self) -> String {
        let arrays = (0..self.keys.len())
            .map(|i| format!("${}::text[]", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "insert into {t} ({keys}, \"as_of_date\")\nselect {s_keys}, $1 from unnest({arrays}) as s({keys})",
            t = quote(&self.presence_table()),
            keys = self.key_list(None),
            s_keys = self.key_list(Some("s")),
        )
    }

    /// Binds: the lock name.
    pub fn advisory_lock(&self) -> &'static str {
        "select pg_advisory_xact_lock(hashtext($1))"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql() -> TableSql {
        TableSql::new(&TableSchema::new("securities", ["exchange", "ticker"], ["name"])).unwrap()
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(validate_identifier("securities").is_ok());
        assert!(validate_identifier("_x9").is_ok());
        assert!(validate_identifier("9x").is_err());
        assert!(validate_identifier("a\"b").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());

        let bad = TableSchema::new("t; drop table x", ["id"], Vec::<String>::new());
        assert!(TableSql::new(&bad).is_err());
    }

    #[test]
    fn bookkeeping_column_names_are_reserved() {
        let s = TableSchema::new("t", ["id"], ["valid_to"]);
        let err = TableSql::new(&s).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn valid_to_nullability_follows_mode() {
        let s = sql();
        let open = s.create_records(false);
        let strict = s.create_records(true);
        assert!(open.contains("\"valid_to\" date,"));
        assert!(strict.contains("\"valid_to\" date not null,"));
        assert!(open.contains("primary key (\"exchange\", \"ticker\", \"valid_from\")"));
        assert!(open.contains("\"name\" text,"));
        assert!(open.contains("\"exchange\" text not null"));
    }

    #[test]
    fn companion_tables_are_prefixed() {
        let s = sql();
        assert!(s.create_sync_log().contains("\"securities_sync_log\""));
        assert!(s.create_presence().contains("\"securities_presence\""));
        assert!(s.create_presence().contains("primary key (\"as_of_date\", \"exchange\", \"ticker\")"));
    }

    #[test]
    fn write_statements_number_their_binds() {
        let s = sql();
        assert_eq!(
            s.insert_record(),
            "insert into \"securities\" (\"exchange\", \"ticker\", \"name\", \"valid_from\", \"valid_to\") values ($1, $2, $3, $4, $5)"
        );
        assert_eq!(
            s.close_at(),
            "update \"securities\" set \"valid_to\" = $1 where \"exchange\" = $2 and \"ticker\" = $3 and \"valid_from\" = $4"
        );
        assert_eq!(
            s.extend_backward(),
            "update \"securities\" set \"valid_from\" = $1 where \"exchange\" = $2 and \"ticker\" = $3 and \"valid_from\" = $4"
        );
        assert_eq!(
            s.delete_record(),
            "delete from \"securities\" where \"exchange\" = $1 and \"ticker\" = $2 and \"valid_from\" = $3"
        );
    }

    #[test]
    fn affected_set_uses_one_array_per_key_column() {
        let s = sql();
        let q = s.select_affected_records();
        assert!(q.contains("unnest($1::text[], $2::text[]) as s(\"exchange\", \"ticker\")"));
        assert!(q.contains("c.\"valid_from\" <= $3"));
        assert!(q.contains("order by r.\"exchange\", r.\"ticker\", \"valid_from\""));

        let p = s.insert_presence();
        assert!(p.contains("unnest($2::text[], $3::text[])"));
    }

    #[test]
    fn sync_log_upsert_overwrites() {
        let q = sql().upsert_sync_log();
        assert!(q.contains("on conflict (\"date\") do update"));
    }
}
