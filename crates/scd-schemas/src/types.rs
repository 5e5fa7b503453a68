use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{ScdError, ScdResult};

/// Ordered tuple of key-column values. Identifies an entity, not a row.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(pub Vec<String>);

impl Key {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Key {
    /// `PART1|PART2`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

/// Ordered tuple of value-column values. `None` is SQL NULL.
///
/// Opaque to the engine beyond equality; `None == None` counts as unchanged.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attributes(pub Vec<Option<String>>);

impl Attributes {
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        Self(values.into_iter().collect())
    }

    /// All values present (no NULLs).
    pub fn of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(|v| Some(v.into())).collect())
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

/// Exclusive upper bound of a record.
///
/// Variant order matters: the derived `Ord` places every concrete date
/// before `Open`, so `min`/`max` over boundaries behave like dates with an
/// infinity sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Boundary {
    Date(NaiveDate),
    Open,
}

impl Boundary {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Boundary::Date(d) => Some(*d),
            Boundary::Open => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Boundary::Open)
    }

    /// `true` when `date` lies strictly before this bound.
    pub fn is_after(&self, date: NaiveDate) -> bool {
        Boundary::Date(date) < *self
    }
}

impl From<NaiveDate> for Boundary {
    fn from(d: NaiveDate) -> Self {
        Boundary::Date(d)
    }
}

impl From<Option<NaiveDate>> for Boundary {
    fn from(d: Option<NaiveDate>) -> Self {
        d.map(Boundary::Date).unwrap_or(Boundary::Open)
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Date(d) => write!(f, "{d}"),
            Boundary::Open => write!(f, "open"),
        }
    }
}

/// One stored fact about one entity over `[valid_from, valid_to)`.
///
/// Identity is `(key, valid_from)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub key: Key,
    pub attributes: Attributes,
    pub valid_from: NaiveDate,
    pub valid_to: Boundary,
}

impl IntervalRecord {
    pub fn new(
        key: Key,
        attributes: Attributes,
        valid_from: NaiveDate,
        valid_to: impl Into<Boundary>,
    ) -> Self {
        Self {
            key,
            attributes,
            valid_from,
            valid_to: valid_to.into(),
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && self.valid_to.is_after(date)
    }

    /// Zero-length intervals are never stored.
    pub fn is_empty(&self) -> bool {
        !self.valid_to.is_after(self.valid_from)
    }

    pub fn overlaps(&self, other: &IntervalRecord) -> bool {
        other.valid_to.is_after(self.valid_from) && self.valid_to.is_after(other.valid_from)
    }
}

/// One reconstructed row: the attributes a key carried on a date.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub key: Key,
    pub attributes: Attributes,
}

/// Canonical snapshot: key -> attributes, at most one row per key.
///
/// Deterministic iteration order (by key).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    rows: BTreeMap<Key, Attributes>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(key, attributes)` pairs in input order.
    ///
    /// Fails with [`ScdError::DuplicateKey`] on the second occurrence of a key;
    /// row numbers are 0-based positions in `rows`.
    pub fn from_rows<I>(rows: I) -> ScdResult<Self>
    where
        I: IntoIterator<Item = (Key, Attributes)>,
    {
        let mut first_seen: BTreeMap<Key, usize> = BTreeMap::new();
        let mut out = BTreeMap::new();
        for (row, (key, attributes)) in rows.into_iter().enumerate() {
            if let Some(first_row) = first_seen.get(&key) {
                return Err(ScdError::DuplicateKey {
                    key,
                    first_row: *first_row,
                    row,
                });
            }
            first_seen.insert(key.clone(), row);
            out.insert(key, attributes);
        }
        Ok(Self { rows: out })
    }

    pub fn get(&self, key: &Key) -> Option<&Attributes> {
        self.rows.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Attributes)> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<SnapshotRow> {
        self.rows
            .into_iter()
            .map(|(key, attributes)| SnapshotRow { key, attributes })
            .collect()
    }
}

/// Declared shape of one SCD table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub keys: Vec<String>,
    pub values: Vec<String>,
}

impl TableSchema {
    pub fn new<K, V>(name: impl Into<String>, keys: K, values: V) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Keys first, then values.
    pub fn all_columns(&self) -> impl Iterator<Item = &String> {
        self.keys.iter().chain(self.values.iter())
    }

    /// Rejects rows whose key/attribute width does not match the declaration.
    pub fn check_row(&self, key: &Key, attributes: &Attributes) -> ScdResult<()> {
        if key.arity() != self.keys.len() {
            return Err(ScdError::Arity {
                what: "key",
                expected: self.keys.len(),
                got: key.arity(),
            });
        }
        if attributes.arity() != self.values.len() {
            return Err(ScdError::Arity {
                what: "value",
                expected: self.values.len(),
                got: attributes.arity(),
            });
        }
        Ok(())
    }
}

/// How the open end of a record is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMode {
    /// `valid_to` may be the open sentinel (NULL).
    OpenEnded,
    /// Every `valid_to` is a concrete date from the business calendar.
    BusinessCalendar,
}

/// Where "was key K present at synced date S" comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceMode {
    /// Inferred from interval coverage plus the sync log.
    #[default]
    Inferred,
    /// Read from an explicit `(key, date)` presence table.
    Explicit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn open_boundary_sorts_after_every_date() {
        assert!(Boundary::Date(d("9999-12-31")) < Boundary::Open);
        assert_eq!(
            Boundary::Open.min(Boundary::Date(d("2025-01-05"))),
            Boundary::Date(d("2025-01-05"))
        );
    }

    #[test]
    fn record_coverage_is_half_open() {
        let r = IntervalRecord::new(
            Key::new(["A"]),
            Attributes::of(["x"]),
            d("2025-01-01"),
            d("2025-01-05"),
        );
        assert!(r.covers(d("2025-01-01")));
        assert!(r.covers(d("2025-01-04")));
        assert!(!r.covers(d("2025-01-05")));
        assert!(!r.covers(d("2024-12-31")));
    }

    #[test]
    fn open_record_covers_far_future() {
        let r = IntervalRecord::new(
            Key::new(["A"]),
            Attributes::of(["x"]),
            d("2025-01-01"),
            Boundary::Open,
        );
        assert!(r.covers(d("2099-01-01")));
        assert!(!r.is_empty());
    }

    #[test]
    fn overlap_detection() {
        let a = IntervalRecord::new(Key::new(["A"]), Attributes::of(["x"]), d("2025-01-01"), d("2025-01-05"));
        let b = IntervalRecord::new(Key::new(["A"]), Attributes::of(["y"]), d("2025-01-05"), Boundary::Open);
        let c = IntervalRecord::new(Key::new(["A"]), Attributes::of(["y"]), d("2025-01-04"), d("2025-01-06"));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn null_attributes_compare_equal() {
        let a = Attributes::new([Some("Widget".to_string()), None]);
        let b = Attributes::new([Some("Widget".to_string()), None]);
        let c = Attributes::of(["Widget", "9.99"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn snapshot_rejects_duplicate_keys() {
        let err = Snapshot::from_rows([
            (Key::new(["A"]), Attributes::of(["1"])),
            (Key::new(["B"]), Attributes::of(["2"])),
            (Key::new(["A"]), Attributes::of(["3"])),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ScdError::DuplicateKey {
                key: Key::new(["A"]),
                first_row: 0,
                row: 2
            }
        );
    }

    #[test]
    fn key_display_joins_parts() {
        assert_eq!(Key::new(["electronics", "001"]).to_string(), "electronics|001");
    }

    #[test]
    fn schema_checks_arity() {
        let schema = TableSchema::new("items", ["id"], ["name", "price"]);
        assert!(schema
            .check_row(&Key::new(["A"]), &Attributes::of(["w", "1"]))
            .is_ok());
        let err = schema
            .check_row(&Key::new(["A"]), &Attributes::of(["w"]))
            .unwrap_err();
        assert!(matches!(err, ScdError::Arity { what: "value", expected: 2, got: 1 }));
    }

    #[test]
    fn presence_mode_serde_names() {
        let m: PresenceMode = serde_json::from_str("\"explicit\"").unwrap();
        assert_eq!(m, PresenceMode::Explicit);
        assert_eq!(PresenceMode::default(), PresenceMode::Inferred);
    }
}
