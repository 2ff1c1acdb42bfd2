//! Total ordering over JSON values, used for primary keys, index ranges, and
//! `order_by`.
//!
//! Values of different types order by type rank:
//! null < bool < number < string < array < object.
//! Arrays compare element-wise, then by length. Objects compare as their
//! sorted `(key, value)` sequences.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compare two values under the total order.
pub fn cmp_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let fa = a.as_f64().unwrap_or(f64::NAN);
            let fb = b.as_f64().unwrap_or(f64::NAN);
            fa.total_cmp(&fb)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match cmp_values(x, y) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => {
            // serde_json maps iterate in key order.
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                match ka.cmp(kb).then_with(|| cmp_values(va, vb)) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            a.len().cmp(&b.len())
        }
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// A JSON value usable as an ordered map key.
#[derive(Debug, Clone)]
pub struct Datum(pub Value);

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_values(&self.0, &other.0)
    }
}

/// One position of an index range bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// Sorts before every value.
    Min,
    Value(Value),
    /// Sorts after every value.
    Max,
}

impl Bound {
    /// Compare a concrete value against this bound position.
    pub fn cmp_value(&self, v: &Value) -> Ordering {
        match self {
            Bound::Min => Ordering::Less,
            Bound::Max => Ordering::Greater,
            Bound::Value(b) => cmp_values(b, v),
        }
    }
}

/// Compare an index key (as a tuple of components) against a bound tuple.
///
/// Returns the ordering of the bound relative to the key.
pub fn cmp_bound(bound: &[Bound], key: &[Value]) -> Ordering {
    for (b, k) in bound.iter().zip(key.iter()) {
        match b.cmp_value(k) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    bound.len().cmp(&key.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_rank_order() {
        let ordered = [
            json!(null),
            json!(false),
            json!(true),
            json!(-5),
            json!(3.5),
            json!("a"),
            json!("b"),
            json!([1]),
            json!({"a": 1}),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(cmp_values(&pair[0], &pair[1]), Ordering::Less, "{pair:?}");
        }
    }

    #[test]
    fn test_integer_and_float_compare_numerically() {
        assert_eq!(cmp_values(&json!(2), &json!(2.0)), Ordering::Equal);
        assert_eq!(cmp_values(&json!(10), &json!(9.5)), Ordering::Greater);
    }

    #[test]
    fn test_arrays_compare_lexicographically() {
        assert_eq!(cmp_values(&json!([5, 1]), &json!([5, 2])), Ordering::Less);
        assert_eq!(cmp_values(&json!([5]), &json!([5, 0])), Ordering::Less);
        assert_eq!(cmp_values(&json!([6]), &json!([5, 9])), Ordering::Greater);
    }

    #[test]
    fn test_bound_sentinels() {
        let key = [json!(5), json!("zzz")];
        let lower = [Bound::Value(json!(5)), Bound::Min];
        let upper = [Bound::Value(json!(5)), Bound::Max];
        assert_eq!(cmp_bound(&lower, &key), Ordering::Less);
        assert_eq!(cmp_bound(&upper, &key), Ordering::Greater);

        let other = [json!(6), json!("a")];
        assert_eq!(cmp_bound(&upper, &other), Ordering::Less);
    }

    #[test]
    fn test_datum_as_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(Datum(json!("b")), 2);
        map.insert(Datum(json!(1)), 1);
        map.insert(Datum(json!(1.0)), 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec![3, 2]);
    }
}
