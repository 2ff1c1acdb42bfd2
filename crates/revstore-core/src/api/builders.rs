use serde_json::Value;

use crate::error::{Error, QueryError, Result, StorageError};
use crate::query::{
    Command, Component, IndexLookup, Lookup, Predicate, Selector, Shape, base_cursor, build_query,
};
use crate::types::{Outcome, Record, Role};

use super::collection::{Collection, unexpected};
use super::document::Document;

/// Result of a read: a single record-or-nothing for point lookups and
/// `limit(1)`, a sequence otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    One(Option<T>),
    Many(Vec<T>),
}

impl<T> Fetched<T> {
    /// The single result, or the first of many.
    pub fn into_one(self) -> Option<T> {
        match self {
            Fetched::One(v) => v,
            Fetched::Many(v) => v.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<T> {
        match self {
            Fetched::One(v) => v.into_iter().collect(),
            Fetched::Many(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Fetched::One(v) => usize::from(v.is_some()),
            Fetched::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_map<U>(self, mut f: impl FnMut(T) -> Result<U>) -> Result<Fetched<U>> {
        Ok(match self {
            Fetched::One(v) => Fetched::One(v.map(&mut f).transpose()?),
            Fetched::Many(v) => Fetched::Many(v.into_iter().map(f).collect::<Result<_>>()?),
        })
    }
}

fn into_record(v: Value) -> Result<Record> {
    match v {
        Value::Object(m) => Ok(m),
        other => Err(StorageError::UnexpectedOutcome(format!("expected a record, got {other}")).into()),
    }
}

// ---------------------------------------------------------------------------
// GetBuilder
// ---------------------------------------------------------------------------

/// Builder for reads. With no lookup set it scans the full table.
pub struct GetBuilder<'a> {
    collection: &'a Collection,
    selector: Selector,
    error: Option<Error>,
}

impl<'a> GetBuilder<'a> {
    pub(crate) fn new(collection: &'a Collection) -> Self {
        Self {
            collection,
            selector: Selector::default(),
            error: None,
        }
    }

    /// Point lookup by primary key.
    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.selector.lookup = Lookup::Key(key.into());
        self
    }

    /// Multi-get by primary key.
    pub fn keys<I, V>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.selector.lookup = Lookup::Keys(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Untyped id: nothing scans the table, an array multi-gets, anything
    /// else is a point lookup.
    pub fn id(mut self, id: Option<Value>) -> Self {
        self.selector.lookup = Lookup::from_id(id);
        self
    }

    /// Exact match on a declared index. An array value matches any of its
    /// elements.
    pub fn index(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.selector.lookup = Lookup::Index {
            name: name.to_string(),
            key: IndexLookup::from(value.into()),
        };
        self
    }

    /// Composite-key lookup on a declared compound index. At most one
    /// component may be [`Component::Any`].
    pub fn index_tuple(mut self, name: &str, components: Vec<Component>) -> Self {
        self.selector.lookup = Lookup::Index {
            name: name.to_string(),
            key: IndexLookup::Tuple(components),
        };
        self
    }

    /// AND a predicate onto the selection.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.selector.filter = Some(match self.selector.filter.take() {
            Some(existing) => existing.and_also(predicate),
            None => predicate,
        });
        self
    }

    /// AND a `{field: value}` equality mapping onto the selection.
    pub fn matching(self, mapping: &Value) -> Self {
        match Predicate::matching(mapping) {
            Ok(p) => self.filter(p),
            Err(e) => self.fail(e.into()),
        }
    }

    /// Keep records whose array `field` contains any of `values` (a single
    /// value or an array).
    pub fn contains(mut self, field: &str, values: impl Into<Value>) -> Self {
        let values = match values.into() {
            Value::Array(vs) => vs,
            v => vec![v],
        };
        self.selector.contains = Some((field.to_string(), values));
        self
    }

    /// Restrict returned fields. Only valid with [`execute_raw`](Self::execute_raw).
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selector.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sort ascending by `field`. Later calls break ties.
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.selector.order_by.push(field.into());
        self
    }

    /// `0` is unbounded; `1` makes the result a single record-or-nothing.
    pub fn limit(mut self, n: usize) -> Self {
        self.selector.limit = n;
        self
    }

    fn fail(mut self, e: Error) -> Self {
        self.error.get_or_insert(e);
        self
    }

    /// Run the read and wrap results as documents.
    pub fn execute(self) -> Result<Fetched<Document>> {
        if self.selector.fields.is_some() {
            return Err(QueryError::ProjectionRequiresRaw.into());
        }
        let collection = self.collection;
        self.execute_raw()?
            .try_map(|record| collection.hydrate(record))
    }

    /// Run the read and return plain records.
    pub fn execute_raw(self) -> Result<Fetched<Record>> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let query = build_query(
            &self.collection.table_ref(),
            &self.selector,
            self.collection.config(),
        )?;
        let command = Command::Read {
            cursor: query.cursor,
        };
        let fetched = match (query.shape, self.collection.run(Role::Secondary, &command)?) {
            (Shape::One, Outcome::Datum(v)) => Fetched::One(v),
            (Shape::One, Outcome::Rows(rows)) => Fetched::One(rows.into_iter().next()),
            (Shape::Many, Outcome::Rows(rows)) => Fetched::Many(rows),
            (Shape::Many, Outcome::Datum(v)) => Fetched::Many(v.into_iter().collect()),
            (_, other) => return Err(unexpected(&command, &other)),
        };
        fetched.try_map(into_record)
    }
}

// ---------------------------------------------------------------------------
// DeleteBuilder
// ---------------------------------------------------------------------------

/// Builder for deleting by selector. With no lookup set it empties the
/// table.
pub struct DeleteBuilder<'a> {
    collection: &'a Collection,
    lookup: Lookup,
    filter: Option<Predicate>,
}

impl<'a> DeleteBuilder<'a> {
    pub(crate) fn new(collection: &'a Collection) -> Self {
        Self {
            collection,
            lookup: Lookup::All,
            filter: None,
        }
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.lookup = Lookup::Key(key.into());
        self
    }

    pub fn keys<I, V>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.lookup = Lookup::Keys(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn index(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.lookup = Lookup::Index {
            name: name.to_string(),
            key: IndexLookup::from(value.into()),
        };
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(predicate),
            None => predicate,
        });
        self
    }

    /// Run the delete and return how many records were removed.
    pub fn execute(self) -> Result<usize> {
        let mut target = base_cursor(
            &self.collection.table_ref(),
            &self.lookup,
            self.collection.config(),
        )?;
        if let Some(predicate) = self.filter {
            target = target.filter(predicate);
        }
        let summary = self.collection.write(&Command::Delete { target })?;
        Ok(summary.deleted)
    }
}
