//! Write commands against one table. Callers hold the engine's write lock.

use serde_json::Value;

use super::Table;
use crate::backend::BackendError;
use crate::config::merge;
use crate::query::Guard;
use crate::query::ordering::{Datum, cmp_values};
use crate::types::{ConflictMode, Record, WriteSummary};

pub(super) fn insert(table: &mut Table, documents: &[Record], conflict: ConflictMode) -> WriteSummary {
    let mut summary = WriteSummary::default();
    for doc in documents {
        let mut doc = doc.clone();
        let pk = match doc.get(&table.primary_key) {
            Some(v) if !v.is_null() => v.clone(),
            _ => {
                let generated = Value::String(uuid::Uuid::new_v4().to_string());
                doc.insert(table.primary_key.clone(), generated.clone());
                summary.generated_keys.push(generated.clone());
                generated
            }
        };
        let key = Datum(pk);

        let Some(existing) = table.rows.get(&key) else {
            table.rows.insert(key, doc);
            summary.inserted += 1;
            continue;
        };

        let next = match conflict {
            ConflictMode::Error => {
                summary.errors += 1;
                if summary.first_error.is_none() {
                    summary.first_error = Some(format!(
                        "Duplicate primary key `{}`:\n{}\n{}",
                        table.primary_key,
                        Value::Object(existing.clone()),
                        Value::Object(doc)
                    ));
                }
                continue;
            }
            ConflictMode::Replace => doc,
            ConflictMode::Update => merged(existing, &doc),
        };
        if &next == existing {
            summary.unchanged += 1;
        } else {
            table.rows.insert(key, next);
            summary.replaced += 1;
        }
    }
    summary
}

pub(super) fn update(
    table: &mut Table,
    keys: Vec<Datum>,
    patch: &Record,
    guard: Option<&Guard>,
    summary: &mut WriteSummary,
) -> Result<(), BackendError> {
    for key in keys {
        let Some(current) = table.rows.get(&key) else {
            summary.skipped += 1;
            continue;
        };
        if let Some(pk) = patch.get(&table.primary_key) {
            if cmp_values(pk, &key.0).is_ne() {
                return Err(primary_key_changed(&table.primary_key));
            }
        }
        if rejected(current, guard, summary) {
            continue;
        }
        let next = merged(current, patch);
        store(table, key, next, summary);
    }
    Ok(())
}

pub(super) fn replace(
    table: &mut Table,
    keys: Vec<Datum>,
    document: &Record,
    guard: Option<&Guard>,
    summary: &mut WriteSummary,
) -> Result<(), BackendError> {
    for key in keys {
        let Some(current) = table.rows.get(&key) else {
            summary.skipped += 1;
            continue;
        };
        let mut next = document.clone();
        match next.get(&table.primary_key) {
            Some(pk) if cmp_values(pk, &key.0).is_ne() => {
                return Err(primary_key_changed(&table.primary_key));
            }
            Some(_) => {}
            None => {
                next.insert(table.primary_key.clone(), key.0.clone());
            }
        }
        if rejected(current, guard, summary) {
            continue;
        }
        store(table, key, next, summary);
    }
    Ok(())
}

pub(super) fn delete(table: &mut Table, keys: Vec<Datum>, summary: &mut WriteSummary) {
    for key in keys {
        if table.rows.remove(&key).is_some() {
            summary.deleted += 1;
        } else {
            summary.skipped += 1;
        }
    }
}

/// Check the guard; on mismatch record the stored value and report it.
fn rejected(current: &Record, guard: Option<&Guard>, summary: &mut WriteSummary) -> bool {
    let Some(guard) = guard else {
        return false;
    };
    let stored = current.get(&guard.field).cloned().unwrap_or(Value::Null);
    if cmp_values(&stored, &guard.equals).is_eq() {
        return false;
    }
    summary.guard_rejected = Some(stored);
    true
}

fn store(table: &mut Table, key: Datum, next: Record, summary: &mut WriteSummary) {
    if table.rows.get(&key) == Some(&next) {
        summary.unchanged += 1;
    } else {
        table.rows.insert(key, next);
        summary.replaced += 1;
    }
}

fn merged(current: &Record, patch: &Record) -> Record {
    match merge(
        &Value::Object(current.clone()),
        &Value::Object(patch.clone()),
    ) {
        Value::Object(m) => m,
        _ => current.clone(),
    }
}

fn primary_key_changed(primary_key: &str) -> BackendError {
    BackendError::op_failed(format!(
        "Primary key `{primary_key}` cannot be changed."
    ))
}
