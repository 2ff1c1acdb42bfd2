//! A schema-backed record with pending-change tracking.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ConflictError, FieldError, Result, StorageError};
use crate::query::{Command, Cursor, Guard};
use crate::types::{ConflictMode, REVISION_FIELD, Record};

use super::collection::Collection;
use super::revision::Revision;

/// Which fields the next `update` must write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DirtyState {
    #[default]
    Clean,
    /// Only these fields changed.
    Partial(BTreeSet<String>),
    /// The whole record must be replaced (a field was removed).
    FullReplace,
}

impl DirtyState {
    pub fn is_clean(&self) -> bool {
        matches!(self, DirtyState::Clean)
    }

    fn mark(&mut self, field: &str) {
        match self {
            DirtyState::Clean => {
                *self = DirtyState::Partial(BTreeSet::from([field.to_string()]));
            }
            DirtyState::Partial(fields) => {
                fields.insert(field.to_string());
            }
            DirtyState::FullReplace => {}
        }
    }
}

/// One record of a [`Collection`].
///
/// Created from caller data with [`Collection::document`] (unpersisted until
/// [`insert`](Self::insert)) or returned by reads.
#[derive(Debug, Clone)]
pub struct Document {
    collection: Collection,
    data: Record,
    dirty: DirtyState,
}

impl Document {
    pub(crate) fn new(collection: Collection, data: Record) -> Self {
        Self {
            collection,
            data,
            dirty: DirtyState::Clean,
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    pub fn into_data(self) -> Record {
        self.data
    }

    pub fn dirty_state(&self) -> &DirtyState {
        &self.dirty
    }

    /// The primary-key value, if one has been assigned.
    pub fn primary_key(&self) -> Option<&Value> {
        self.data
            .get(self.collection.primary_key())
            .filter(|v| !v.is_null())
    }

    /// The current revision, if the record carries a well-formed one.
    pub fn revision(&self) -> Option<Revision> {
        self.data
            .get(REVISION_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_or(&self, field: &str, default: Value) -> Value {
        self.data.get(field).cloned().unwrap_or(default)
    }

    /// Set a field after cleaning and validating it against the schema.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let value = if field == self.collection.primary_key() {
            value
        } else {
            let schema = self.collection.schema();
            if !schema.has_field(field) {
                return Err(FieldError::Unknown(field.to_string()).into());
            }
            let value = schema.clean_field(field, value)?;
            schema.validate_field(field, &value)?;
            value
        };
        self.data.insert(field.to_string(), value);
        self.dirty.mark(field);
        Ok(())
    }

    /// Remove a field. The next update replaces the whole record.
    pub fn unset(&mut self, field: &str) -> Result<Value> {
        let old = self
            .data
            .remove(field)
            .ok_or_else(|| FieldError::NotPresent(field.to_string()))?;
        self.dirty = DirtyState::FullReplace;
        Ok(old)
    }

    /// Write this document as a new record and return its primary key.
    ///
    /// A missing key is generated here when the collection uses automatic
    /// ids and is an error otherwise. With revisions enabled the record is
    /// stamped with version 1 first.
    pub fn insert(&mut self, conflict: ConflictMode) -> Result<Value> {
        let config = self.collection.config();
        let primary = config.primary.clone();
        let assigned = self.primary_key().is_none();
        if assigned {
            if !config.auto_id {
                return Err(StorageError::MissingPrimaryKey("insert").into());
            }
            self.data.insert(
                primary.clone(),
                Value::String(Uuid::new_v4().to_string()),
            );
        }

        let held = self.data.get(REVISION_FIELD).cloned();
        if config.revisions {
            let rev = Revision::of(&self.data, &primary, 1);
            self.data
                .insert(REVISION_FIELD.to_string(), Value::String(rev.to_string()));
        }

        let command = Command::Insert {
            table: self.collection.table_ref(),
            documents: vec![self.data.clone()],
            conflict,
        };
        let summary = match self.collection.write(&command) {
            Ok(s) => s,
            Err(e) => {
                self.restore_revision(held);
                if assigned {
                    self.data.remove(&primary);
                }
                return Err(e);
            }
        };

        if summary.inserted + summary.replaced + summary.unchanged == 0 {
            self.restore_revision(held);
            if assigned {
                self.data.remove(&primary);
            }
            return Err(match summary.first_error {
                Some(msg) => StorageError::WriteFailed(msg),
                None => StorageError::NoRowsAffected("insert"),
            }
            .into());
        }

        if let Some(key) = summary.generated_keys.into_iter().next() {
            self.data.insert(primary, key);
        }
        self.dirty = DirtyState::Clean;

        let key = self
            .primary_key()
            .cloned()
            .ok_or(StorageError::MissingPrimaryKey("insert"))?;
        debug!(table = %self.collection.table_ref(), key = %key, "inserted");
        Ok(key)
    }

    /// Write pending changes. Returns `false` when there was nothing to
    /// write.
    ///
    /// With revisions enabled the write only lands if the stored revision
    /// still equals the one this document was read with; otherwise it fails
    /// with [`ConflictError`] and the document keeps its old revision.
    pub fn update(&mut self, replace: bool) -> Result<bool> {
        if self.dirty.is_clean() {
            return Ok(false);
        }
        let key = self
            .primary_key()
            .cloned()
            .ok_or(StorageError::MissingPrimaryKey("update"))?;
        let full = replace || self.dirty == DirtyState::FullReplace;
        let table = self.collection.table_ref();
        let primary = self.collection.primary_key().to_string();

        let held = self.data.get(REVISION_FIELD).cloned();
        let mut guard = None;
        if self.collection.config().revisions {
            let next = match held.as_ref().and_then(Value::as_str) {
                Some(s) => match s.parse::<Revision>()?.next_for(&self.data, &primary) {
                    Some(next) => next,
                    None => {
                        self.dirty = DirtyState::Clean;
                        return Ok(false);
                    }
                },
                None => Revision::of(&self.data, &primary, 1),
            };
            self.data
                .insert(REVISION_FIELD.to_string(), Value::String(next.to_string()));
            guard = Some(Guard {
                field: REVISION_FIELD.to_string(),
                equals: held.clone().unwrap_or(Value::Null),
            });
        }

        let target = Cursor::Get {
            table: table.clone(),
            key: key.clone(),
        };
        let command = if full {
            Command::Replace {
                target,
                document: self.data.clone(),
                guard,
            }
        } else {
            let mut patch = Record::new();
            if let DirtyState::Partial(fields) = &self.dirty {
                for f in fields {
                    if let Some(v) = self.data.get(f) {
                        patch.insert(f.clone(), v.clone());
                    }
                }
            }
            if let Some(rev) = self.data.get(REVISION_FIELD).filter(|_| guard.is_some()) {
                patch.insert(REVISION_FIELD.to_string(), rev.clone());
            }
            Command::Update {
                target,
                patch,
                guard,
            }
        };

        let summary = match self.collection.write(&command) {
            Ok(s) => s,
            Err(e) => {
                self.restore_revision(held);
                return Err(e);
            }
        };

        if let Some(actual) = summary.guard_rejected {
            self.restore_revision(held.clone());
            return Err(ConflictError {
                table: table.to_string(),
                key: key.to_string(),
                expected: held
                    .as_ref()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                actual: actual.as_str().map(str::to_string),
            }
            .into());
        }
        if summary.skipped > 0 {
            self.restore_revision(held);
            return Ok(false);
        }
        if summary.errors > 0 {
            self.restore_revision(held);
            return Err(StorageError::WriteFailed(summary.first_error.unwrap_or_default()).into());
        }

        self.dirty = DirtyState::Clean;
        debug!(%table, key = %key, full, "updated");
        Ok(summary.replaced > 0)
    }

    /// Delete this record by primary key. Returns `false` when nothing was
    /// deleted. On success the primary key is removed from the document.
    pub fn delete(&mut self) -> Result<bool> {
        let key = self
            .primary_key()
            .cloned()
            .ok_or(StorageError::MissingPrimaryKey("delete"))?;
        let summary = self.collection.write(&Command::Delete {
            target: Cursor::Get {
                table: self.collection.table_ref(),
                key,
            },
        })?;
        if summary.deleted != 1 {
            return Ok(false);
        }
        let primary = self.collection.primary_key().to_string();
        self.data.remove(&primary);
        self.dirty = DirtyState::Clean;
        Ok(true)
    }

    fn restore_revision(&mut self, held: Option<Value>) {
        match held {
            Some(v) => {
                self.data.insert(REVISION_FIELD.to_string(), v);
            }
            None => {
                self.data.remove(REVISION_FIELD);
            }
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.data.clone()))
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.collection.table_ref() == other.collection.table_ref()
    }
}
