//! Selection evaluation over one table.

use std::cmp::Ordering;

use serde_json::Value;

use super::Table;
use crate::backend::BackendError;
use crate::query::filter::resolve_path;
use crate::query::ordering::{Datum, cmp_bound, cmp_values};
use crate::query::projection::pluck;
use crate::query::{Cursor, IndexFields};
use crate::types::Record;

/// Index key of a record as a tuple. `None` when the record lacks an
/// indexed field, in which case it is not in the index.
fn index_key(record: &Record, fields: &IndexFields) -> Option<Vec<Value>> {
    match fields {
        IndexFields::Field(f) => match resolve_path(record, f) {
            Value::Null => None,
            v => Some(vec![v.clone()]),
        },
        IndexFields::Compound(fs) => fs
            .iter()
            .map(|f| match resolve_path(record, f) {
                Value::Null => None,
                v => Some(v.clone()),
            })
            .collect(),
    }
}

/// The lookup value a `get_all` key is compared against.
fn index_value(key: Vec<Value>, fields: &IndexFields) -> Value {
    match fields {
        IndexFields::Field(_) => key.into_iter().next().unwrap_or(Value::Null),
        IndexFields::Compound(_) => Value::Array(key),
    }
}

/// Records selected by `cursor`, projected if the cursor plucks.
pub(super) fn select(table: &Table, cursor: &Cursor) -> Result<Vec<Record>, BackendError> {
    match cursor {
        Cursor::Table { .. } => Ok(table.rows.values().cloned().collect()),

        Cursor::Get { key, .. } => Ok(table
            .rows
            .get(&Datum(key.clone()))
            .cloned()
            .into_iter()
            .collect()),

        Cursor::GetAll {
            keys, index: None, ..
        } => Ok(keys
            .iter()
            .filter_map(|k| table.rows.get(&Datum(k.clone())).cloned())
            .collect()),

        Cursor::GetAll {
            table: tref,
            keys,
            index: Some(name),
        } => {
            let fields = table.index(name, tref)?;
            let mut out = Vec::new();
            for key in keys {
                for (_, record) in indexed(table, fields) {
                    if record_matches(record, fields, key) {
                        out.push(record.clone());
                    }
                }
            }
            Ok(out)
        }

        Cursor::Between {
            table: tref,
            index,
            lower,
            upper,
        } => {
            let fields = table.index(index, tref)?;
            let mut hits: Vec<(Vec<Value>, &Record)> = indexed(table, fields)
                .filter(|(key, _)| {
                    cmp_bound(lower, key) != Ordering::Greater
                        && cmp_bound(upper, key) == Ordering::Greater
                })
                .collect();
            hits.sort_by(|(a, _), (b, _)| cmp_values(&Value::Array(a.clone()), &Value::Array(b.clone())));
            Ok(hits.into_iter().map(|(_, r)| r.clone()).collect())
        }

        Cursor::Filter { source, predicate } => {
            let mut out = Vec::new();
            for record in select(table, source)? {
                if predicate
                    .eval(&record)
                    .map_err(|e| BackendError::query_logic(e.to_string()))?
                {
                    out.push(record);
                }
            }
            Ok(out)
        }

        Cursor::OrderBy { source, fields } => {
            let mut rows = select(table, source)?;
            rows.sort_by(|a, b| {
                fields
                    .iter()
                    .map(|f| cmp_values(resolve_path(a, f), resolve_path(b, f)))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
            Ok(rows)
        }

        Cursor::Limit { source, n } => {
            let mut rows = select(table, source)?;
            rows.truncate(*n);
            Ok(rows)
        }

        Cursor::Pluck { source, fields } => Ok(select(table, source)?
            .iter()
            .map(|r| pluck(r, fields))
            .collect()),
    }
}

fn indexed<'a>(
    table: &'a Table,
    fields: &'a IndexFields,
) -> impl Iterator<Item = (Vec<Value>, &'a Record)> + 'a {
    table
        .rows
        .values()
        .filter_map(move |r| index_key(r, fields).map(|k| (k, r)))
}

fn record_matches(record: &Record, fields: &IndexFields, key: &Value) -> bool {
    index_key(record, fields)
        .map(|k| cmp_values(&index_value(k, fields), key) == Ordering::Equal)
        .unwrap_or(false)
}

/// Primary keys of the records a write targets.
pub(super) fn target_keys(table: &Table, target: &Cursor) -> Result<Vec<Datum>, BackendError> {
    if matches!(target, Cursor::Pluck { .. }) {
        return Err(BackendError::query_logic(
            "Cannot write to a projected selection.",
        ));
    }
    let mut keys: Vec<Datum> = Vec::new();
    for record in select(table, target)? {
        let pk = record.get(&table.primary_key).cloned().unwrap_or(Value::Null);
        let pk = Datum(pk);
        if !keys.contains(&pk) {
            keys.push(pk);
        }
    }
    Ok(keys)
}
