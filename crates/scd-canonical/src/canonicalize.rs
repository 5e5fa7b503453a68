use scd_schemas::{Attributes, Key, SchemaError, ScdError, ScdResult, Snapshot, TableSchema};

use crate::Batch;

/// Column-name matching form: lowercase with `-` and `_` removed.
///
/// `Security_ID`, `security-id` and `securityid` all normalize to `securityid`.
pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve each declared column to its index in `input`.
///
/// All missing columns are reported at once. Extra input columns are ignored.
pub fn resolve_columns<'a, I>(declared: I, input: &[String]) -> ScdResult<Vec<usize>>
where
    I: IntoIterator<Item = &'a String>,
{
    let normalized: Vec<String> = input.iter().map(|c| normalize_column_name(c)).collect();
    let mut out = Vec::new();
    let mut missing = Vec::new();

    for col in declared {
        let want = normalize_column_name(col);
        let hits: Vec<usize> = normalized
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == want)
            .map(|(i, _)| i)
            .collect();
        match hits.as_slice() {
            [] => missing.push(col.clone()),
            [i] => out.push(*i),
            _ => {
                return Err(SchemaError::AmbiguousColumn {
                    column: col.clone(),
                    candidates: hits.iter().map(|i| input[*i].clone()).collect(),
                }
                .into())
            }
        }
    }

    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns { missing }.into());
    }
    Ok(out)
}

/// Turn a raw batch into a keyed snapshot.
///
/// Fails on missing or ambiguous declared columns, on a NULL key cell, and
/// on a key repeated within the batch. Pure; row order is irrelevant to the
/// result.
pub fn canonicalize(batch: &Batch, schema: &TableSchema) -> ScdResult<Snapshot> {
    let idx = resolve_columns(schema.all_columns(), batch.columns())?;
    let (key_idx, value_idx) = idx.split_at(schema.keys.len());

    let mut rows = Vec::with_capacity(batch.len());
    for (row_no, row) in batch.rows().iter().enumerate() {
        let mut parts = Vec::with_capacity(key_idx.len());
        for (k, &i) in key_idx.iter().enumerate() {
            match &row[i] {
                Some(v) => parts.push(v.clone()),
                None => {
                    return Err(ScdError::NullKey {
                        column: schema.keys[k].clone(),
                        row: row_no,
                    })
                }
            }
        }
        let attrs = Attributes::new(value_idx.iter().map(|&i| row[i].clone()));
        rows.push((Key(parts), attrs));
    }

    Snapshot::from_rows(rows)
}
