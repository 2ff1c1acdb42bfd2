//! Core types shared by the access layer, the engine, and the drivers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored record: field name to value.
pub type Record = Map<String, Value>;

/// Default primary-key field name.
pub const DEFAULT_PRIMARY_KEY: &str = "_id";

/// Reserved field holding the `"<version>-<hash>"` revision string.
pub const REVISION_FIELD: &str = "_rev";

/// Server profile used when a storage config does not name one.
pub const DEFAULT_SERVER: &str = "default";

/// Database used when a storage config does not name one.
pub const DEFAULT_DATABASE: &str = "test";

/// Fully resolved location of a table in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub db: String,
    pub table: String,
}

impl TableRef {
    pub fn new(db: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.table)
    }
}

/// Which side of a server profile a connection is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-write.
    Primary,
    /// Read-only. Routed to the primary when the profile has no replica.
    Secondary,
}

/// What an insert does when the primary key already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    #[default]
    Error,
    Replace,
    Update,
}

/// Counters returned by every write command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteSummary {
    #[serde(default)]
    pub inserted: usize,
    #[serde(default)]
    pub replaced: usize,
    #[serde(default)]
    pub unchanged: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub deleted: usize,
    #[serde(default)]
    pub errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated_keys: Vec<Value>,
    /// Stored value of the guarded field when a guarded write was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard_rejected: Option<Value>,
}

/// Counters returned by DDL commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlSummary {
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub dropped: usize,
}

/// Result of running one command against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// Single-record selection (point lookup).
    Datum(Option<Value>),
    /// Multi-record selection.
    Rows(Vec<Value>),
    Write(WriteSummary),
    Ddl(DdlSummary),
    Names(Vec<String>),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Datum(_) => "datum",
            Outcome::Rows(_) => "rows",
            Outcome::Write(_) => "write",
            Outcome::Ddl(_) => "ddl",
            Outcome::Names(_) => "names",
        }
    }
}
