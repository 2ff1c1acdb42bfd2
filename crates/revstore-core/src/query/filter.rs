//! Row predicates for `filter` and `contains` selectors.
//!
//! Predicates are plain serde values so the same tree is evaluated by the
//! in-process engine and shipped over the wire to a remote one.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;
use crate::types::Record;

/// A boolean expression over a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// `field == value`. Dot-separated paths reach into nested objects.
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    /// The array at `field` contains at least one of the values.
    ContainsAny(String, Vec<Value>),
    /// The field is present and not null.
    HasField(String),

    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

const MAX_PREDICATE_DEPTH: usize = 16;

impl Predicate {
    /// Build an AND of equality tests from a `{field: value}` mapping.
    pub fn matching(obj: &Value) -> Result<Self, QueryError> {
        let map = obj
            .as_object()
            .ok_or_else(|| QueryError::InvalidFilter(obj.to_string()))?;
        Ok(Predicate::And(
            map.iter()
                .map(|(k, v)| Predicate::Eq(k.clone(), v.clone()))
                .collect(),
        ))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Ne(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lt(field.into(), value.into())
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Le(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gt(field.into(), value.into())
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Ge(field.into(), value.into())
    }

    pub fn contains_any(field: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::ContainsAny(field.into(), values)
    }

    pub fn has_field(field: impl Into<String>) -> Self {
        Predicate::HasField(field.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    /// Conjoin two predicates, flattening nested ANDs.
    pub fn and_also(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Evaluate against a record.
    pub fn eval(&self, record: &Record) -> Result<bool, QueryError> {
        self.eval_inner(record, 0)
    }

    fn eval_inner(&self, record: &Record, depth: usize) -> Result<bool, QueryError> {
        if depth > MAX_PREDICATE_DEPTH {
            return Err(QueryError::TooDeep(MAX_PREDICATE_DEPTH));
        }

        Ok(match self {
            Predicate::Eq(path, v) => compare(resolve_path(record, path), v) == Some(Ordering::Equal),
            Predicate::Ne(path, v) => compare(resolve_path(record, path), v) != Some(Ordering::Equal),
            Predicate::Lt(path, v) => compare(resolve_path(record, path), v) == Some(Ordering::Less),
            Predicate::Le(path, v) => matches!(
                compare(resolve_path(record, path), v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::Gt(path, v) => {
                compare(resolve_path(record, path), v) == Some(Ordering::Greater)
            }
            Predicate::Ge(path, v) => matches!(
                compare(resolve_path(record, path), v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::ContainsAny(path, values) => match resolve_path(record, path) {
                Value::Array(items) => values.iter().any(|v| items.contains(v)),
                _ => false,
            },
            Predicate::HasField(path) => !resolve_path(record, path).is_null(),
            Predicate::And(preds) => {
                for p in preds {
                    if !p.eval_inner(record, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            Predicate::Or(preds) => {
                for p in preds {
                    if p.eval_inner(record, depth + 1)? {
                        return Ok(true);
                    }
                }
                false
            }
            Predicate::Not(inner) => !inner.eval_inner(record, depth + 1)?,
        })
    }
}

/// Resolve a dot-separated path on a record. Missing segments yield null.
pub fn resolve_path<'a>(record: &'a Record, path: &str) -> &'a Value {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return &Value::Null;
    };
    let mut current = match record.get(first) {
        Some(v) => v,
        None => return &Value::Null,
    };
    for segment in segments {
        match current.get(segment) {
            Some(v) => current = v,
            None => return &Value::Null,
        }
    }
    current
}

/// Compare two values for predicate purposes.
///
/// Mismatched types are incomparable and never satisfy an ordering test.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (left == right).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Record {
        json!({
            "name": "Alice",
            "age": 30,
            "active": true,
            "tags": ["admin", "ops"],
            "address": {"city": "NYC"}
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_matching_builds_conjunction() {
        let rec = sample();
        let p = Predicate::matching(&json!({"name": "Alice", "age": 30})).unwrap();
        assert!(p.eval(&rec).unwrap());

        let p = Predicate::matching(&json!({"name": "Alice", "age": 31})).unwrap();
        assert!(!p.eval(&rec).unwrap());
    }

    #[test]
    fn test_matching_rejects_non_object() {
        assert!(matches!(
            Predicate::matching(&json!([1, 2])),
            Err(QueryError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_comparisons() {
        let rec = sample();
        assert!(Predicate::gt("age", 20).eval(&rec).unwrap());
        assert!(Predicate::le("age", 30).eval(&rec).unwrap());
        assert!(!Predicate::lt("age", 30).eval(&rec).unwrap());
        assert!(Predicate::ne("name", "Bob").eval(&rec).unwrap());
        // Number vs string never orders.
        assert!(!Predicate::gt("age", "10").eval(&rec).unwrap());
    }

    #[test]
    fn test_nested_path() {
        let rec = sample();
        assert!(Predicate::eq("address.city", "NYC").eval(&rec).unwrap());
        assert!(!Predicate::has_field("address.zip").eval(&rec).unwrap());
    }

    #[test]
    fn test_contains_any() {
        let rec = sample();
        assert!(
            Predicate::contains_any("tags", vec![json!("guest"), json!("ops")])
                .eval(&rec)
                .unwrap()
        );
        assert!(
            !Predicate::contains_any("tags", vec![json!("guest")])
                .eval(&rec)
                .unwrap()
        );
        // Non-array field never contains anything.
        assert!(
            !Predicate::contains_any("name", vec![json!("Alice")])
                .eval(&rec)
                .unwrap()
        );
    }

    #[test]
    fn test_and_also_flattens() {
        let p = Predicate::eq("a", 1)
            .and_also(Predicate::eq("b", 2))
            .and_also(Predicate::eq("c", 3));
        match p {
            Predicate::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_and_or() {
        let rec = sample();
        assert!(Predicate::And(vec![]).eval(&rec).unwrap());
        assert!(!Predicate::Or(vec![]).eval(&rec).unwrap());
    }

    #[test]
    fn test_depth_limit() {
        let mut p = Predicate::eq("name", "Alice");
        for _ in 0..20 {
            p = Predicate::not(p);
        }
        assert!(matches!(p.eval(&sample()), Err(QueryError::TooDeep(16))));
    }

    #[test]
    fn test_serde_roundtrip() {
        let p = Predicate::Or(vec![
            Predicate::eq("name", "Alice"),
            Predicate::contains_any("tags", vec![json!("ops")]),
        ]);
        let s = serde_json::to_string(&p).unwrap();
        let back: Predicate = serde_json::from_str(&s).unwrap();
        assert_eq!(p, back);
    }
}
