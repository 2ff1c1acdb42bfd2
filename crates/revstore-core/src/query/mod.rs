//! Query translation: turns lookup arguments into a backend [`Cursor`].
//!
//! [`build_query`] is pure. It validates the selector against the storage
//! config (declared indexes, composite wildcard rules) and returns the
//! cursor together with the result shape the caller should expect.

pub mod filter;
pub mod ordering;
pub mod projection;
pub mod term;

use serde_json::Value;

use crate::api::storage_config::{IndexDef, StorageConfig};
use crate::error::{Error, IndexError, QueryError};
use crate::types::TableRef;

pub use filter::Predicate;
pub use ordering::Bound;
pub use term::{Command, Cursor, Guard, IndexFields};

/// How records are located before any filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Lookup {
    /// Full table.
    #[default]
    All,
    /// Point lookup by primary key.
    Key(Value),
    /// Multi-get by primary key. Result order is not tied to input order.
    Keys(Vec<Value>),
    /// Lookup through a declared secondary index.
    Index { name: String, key: IndexLookup },
}

impl Lookup {
    /// Interpret an untyped id argument: nothing means the whole table, an
    /// array means a multi-get, anything else a point lookup.
    pub fn from_id(id: Option<Value>) -> Self {
        match id {
            None | Some(Value::Null) => Lookup::All,
            Some(Value::Array(keys)) => Lookup::Keys(keys),
            Some(key) => Lookup::Key(key),
        }
    }
}

/// The value side of an index lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexLookup {
    /// One or more exact index values.
    Values(Vec<Value>),
    /// One composite key, possibly with a single open position.
    Tuple(Vec<Component>),
}

impl From<Value> for IndexLookup {
    fn from(v: Value) -> Self {
        match v {
            Value::Array(values) => IndexLookup::Values(values),
            v => IndexLookup::Values(vec![v]),
        }
    }
}

/// One position of a composite index tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Value(Value),
    /// Matches any value at this position.
    Any,
}

macro_rules! component_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Component {
            fn from(v: $t) -> Self {
                Component::Value(v.into())
            }
        })*
    };
}

component_from!(Value, &str, String, bool, i32, i64, u32, u64, f64);

/// A validated composite index key.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeKey {
    Exact(Vec<Value>),
    /// `fixed` holds every position except `open`, in order.
    RangeOpen { fixed: Vec<Value>, open: usize },
}

impl CompositeKey {
    /// Validate untyped tuple components. More than one open position is
    /// rejected.
    pub fn from_components(components: &[Component]) -> Result<Self, QueryError> {
        if components.is_empty() {
            return Err(QueryError::EmptyTuple);
        }
        let open: Vec<usize> = components
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Component::Any))
            .map(|(i, _)| i)
            .collect();
        let fixed: Vec<Value> = components
            .iter()
            .filter_map(|c| match c {
                Component::Value(v) => Some(v.clone()),
                Component::Any => None,
            })
            .collect();

        match open.as_slice() {
            [] => Ok(CompositeKey::Exact(fixed)),
            [pos] => Ok(CompositeKey::RangeOpen { fixed, open: *pos }),
            many => Err(QueryError::MultipleOpenPositions(many.len())),
        }
    }

    /// Lower and upper bound tuples for a range-open key.
    fn bounds(fixed: &[Value], open: usize) -> (Vec<Bound>, Vec<Bound>) {
        let mut lower: Vec<Bound> = fixed.iter().cloned().map(Bound::Value).collect();
        let mut upper = lower.clone();
        lower.insert(open, Bound::Min);
        upper.insert(open, Bound::Max);
        (lower, upper)
    }
}

/// Everything a read can ask for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    pub lookup: Lookup,
    /// Extra predicate ANDed onto the lookup.
    pub filter: Option<Predicate>,
    /// `(field, values)`: the array field must contain any of the values.
    pub contains: Option<(String, Vec<Value>)>,
    /// Restrict returned fields. Only meaningful for raw results.
    pub fields: Option<Vec<String>>,
    /// Ascending sort fields.
    pub order_by: Vec<String>,
    /// `0` means unbounded.
    pub limit: usize,
}

/// Expected result cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Record or nothing.
    One,
    Many,
}

/// A translated read.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub cursor: Cursor,
    pub shape: Shape,
}

/// Translate a selector into a cursor over `table`.
pub fn build_query(
    table: &TableRef,
    selector: &Selector,
    config: &StorageConfig,
) -> Result<Query, Error> {
    let mut cursor = base_cursor(table, &selector.lookup, config)?;

    if let Some(predicate) = &selector.filter {
        cursor = cursor.filter(predicate.clone());
    }

    if let Some((field, values)) = &selector.contains {
        cursor = cursor.filter(Predicate::contains_any(field.clone(), values.clone()));
    }

    if !selector.order_by.is_empty() {
        cursor = cursor.order_by(selector.order_by.clone());
    }

    if selector.limit > 0 {
        cursor = cursor.limit(selector.limit);
    }

    if let Some(fields) = &selector.fields {
        cursor = cursor.pluck(fields.clone());
    }

    let shape = if matches!(selector.lookup, Lookup::Key(_)) || selector.limit == 1 {
        Shape::One
    } else {
        Shape::Many
    };

    Ok(Query { cursor, shape })
}

/// Translate only the lookup part, for writes that target a selection.
pub fn base_cursor(
    table: &TableRef,
    lookup: &Lookup,
    config: &StorageConfig,
) -> Result<Cursor, Error> {
    let table = table.clone();
    Ok(match lookup {
        Lookup::All => Cursor::Table { table },
        Lookup::Key(key) => Cursor::Get {
            table,
            key: key.clone(),
        },
        Lookup::Keys(keys) => Cursor::GetAll {
            table,
            keys: keys.clone(),
            index: None,
        },
        Lookup::Index { name, key } => {
            let def = config
                .indexes
                .get(name)
                .ok_or_else(|| IndexError::NotDeclared {
                    table: table.table.clone(),
                    index: name.clone(),
                })?;
            index_cursor(table, name, def, key)?
        }
    })
}

fn index_cursor(
    table: TableRef,
    name: &str,
    def: &IndexDef,
    key: &IndexLookup,
) -> Result<Cursor, Error> {
    let index = name.to_string();
    match key {
        IndexLookup::Values(values) => Ok(Cursor::GetAll {
            table,
            keys: values.clone(),
            index: Some(index),
        }),
        IndexLookup::Tuple(components) => match CompositeKey::from_components(components)? {
            CompositeKey::Exact(values) => Ok(Cursor::GetAll {
                table,
                keys: vec![Value::Array(values)],
                index: Some(index),
            }),
            CompositeKey::RangeOpen { fixed, open } => {
                let (lower, upper) = CompositeKey::bounds(&fixed, open);
                let cursor = Cursor::Between {
                    table,
                    index,
                    lower,
                    upper,
                };
                // The range is lexicographic, so positions after the open one
                // are not constrained by it. Pin them explicitly.
                let trailing: Vec<Predicate> = match def {
                    IndexDef::Compound(fields) => fields
                        .iter()
                        .zip(components.iter())
                        .skip(open + 1)
                        .filter_map(|(field, c)| match c {
                            Component::Value(v) => Some(Predicate::eq(field.clone(), v.clone())),
                            Component::Any => None,
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(if trailing.is_empty() {
                    cursor
                } else {
                    cursor.filter(Predicate::And(trailing))
                })
            }
        },
    }
}
