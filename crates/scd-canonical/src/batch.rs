//! Tabular input batches.
//!
//! A [`Batch`] is the raw, un-keyed form of one snapshot: a header plus rows
//! of nullable string cells. It can be built from CSV (header row required,
//! empty cells are NULL) or from a JSON array of objects.

use std::io::Read;

use scd_schemas::{SchemaError, ScdResult};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Batch {
    /// Every row must be exactly as wide as `columns`.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> ScdResult<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SchemaError::RowWidth {
                    row: i,
                    expected: columns.len(),
                    got: row.len(),
                }
                .into());
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // -----------------------------------------------------------------------
    // CSV
    // -----------------------------------------------------------------------

    pub fn from_csv_reader<R: Read>(reader: R) -> ScdResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(not_tabular)?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(SchemaError::NotTabular {
                reason: "csv has no header row".to_string(),
            }
            .into());
        }

        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec.map_err(not_tabular)?;
            rows.push(
                rec.iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect(),
            );
        }
        Self::new(columns, rows)
    }

    pub fn from_csv_str(src: &str) -> ScdResult<Self> {
        Self::from_csv_reader(src.as_bytes())
    }

    // -----------------------------------------------------------------------
    // JSON
    // -----------------------------------------------------------------------

    /// `[{"col": value, ...}, ...]`. Columns are the union of object keys in
    /// first-seen order; a key missing from one object is NULL in that row.
    pub fn from_json_records(value: &Value) -> ScdResult<Self> {
        let items = value.as_array().ok_or_else(|| SchemaError::NotTabular {
            reason: "json input must be an array of objects".to_string(),
        })?;

        let mut columns: Vec<String> = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let obj = item.as_object().ok_or_else(|| SchemaError::NotTabular {
                reason: format!("json row {i} is not an object"),
            })?;
            for k in obj.keys() {
                if !columns.iter().any(|c| c == k) {
                    columns.push(k.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let mut row = Vec::with_capacity(columns.len());
            for c in &columns {
                let cell = match item.get(c) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    Some(Value::Bool(b)) => Some(b.to_string()),
                    Some(_) => {
                        return Err(SchemaError::NotTabular {
                            reason: format!("json row {i} column {c} is not a scalar"),
                        }
                        .into())
                    }
                };
                row.push(cell);
            }
            rows.push(row);
        }
        Self::new(columns, rows)
    }

    pub fn from_json_str(src: &str) -> ScdResult<Self> {
        let value: Value = serde_json::from_str(src).map_err(|e| SchemaError::NotTabular {
            reason: format!("invalid json: {e}"),
        })?;
        Self::from_json_records(&value)
    }
}

fn not_tabular(e: csv::Error) -> SchemaError {
    SchemaError::NotTabular {
        reason: format!("csv: {e}"),
    }
}
