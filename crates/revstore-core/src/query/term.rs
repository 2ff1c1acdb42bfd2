//! Backend command trees.
//!
//! A [`Cursor`] describes a selection of records; a [`Command`] is what is
//! actually sent to a connection: a read of a cursor, a write against a
//! cursor, or a DDL statement.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filter::Predicate;
use super::ordering::Bound;
use crate::types::{ConflictMode, Record, TableRef};

/// A selection expression, built innermost-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "term", rename_all = "snake_case")]
pub enum Cursor {
    /// Every record in the table.
    Table { table: TableRef },
    /// Point lookup by primary key. Selects at most one record.
    Get { table: TableRef, key: Value },
    /// Multi-get by primary key (`index` = `None`) or by a secondary index.
    GetAll {
        table: TableRef,
        keys: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<String>,
    },
    /// Range over a secondary index; `lower` inclusive, `upper` exclusive.
    Between {
        table: TableRef,
        index: String,
        lower: Vec<Bound>,
        upper: Vec<Bound>,
    },
    Filter {
        source: Box<Cursor>,
        predicate: Predicate,
    },
    OrderBy {
        source: Box<Cursor>,
        fields: Vec<String>,
    },
    Limit { source: Box<Cursor>, n: usize },
    Pluck {
        source: Box<Cursor>,
        fields: Vec<String>,
    },
}

impl Cursor {
    pub fn filter(self, predicate: Predicate) -> Self {
        Cursor::Filter {
            source: Box::new(self),
            predicate,
        }
    }

    pub fn order_by(self, fields: Vec<String>) -> Self {
        Cursor::OrderBy {
            source: Box::new(self),
            fields,
        }
    }

    pub fn limit(self, n: usize) -> Self {
        Cursor::Limit {
            source: Box::new(self),
            n,
        }
    }

    pub fn pluck(self, fields: Vec<String>) -> Self {
        Cursor::Pluck {
            source: Box::new(self),
            fields,
        }
    }

    /// The table at the root of this selection.
    pub fn table(&self) -> &TableRef {
        match self {
            Cursor::Table { table }
            | Cursor::Get { table, .. }
            | Cursor::GetAll { table, .. }
            | Cursor::Between { table, .. } => table,
            Cursor::Filter { source, .. }
            | Cursor::OrderBy { source, .. }
            | Cursor::Limit { source, .. }
            | Cursor::Pluck { source, .. } => source.table(),
        }
    }

    /// Whether this selection yields at most one record by construction.
    pub fn is_single(&self) -> bool {
        match self {
            Cursor::Get { .. } => true,
            Cursor::Filter { source, .. }
            | Cursor::OrderBy { source, .. }
            | Cursor::Limit { source, .. }
            | Cursor::Pluck { source, .. } => source.is_single(),
            _ => false,
        }
    }
}

/// Only write when the stored `field` still equals `equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guard {
    pub field: String,
    pub equals: Value,
}

/// Fields covered by a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFields {
    Field(String),
    Compound(Vec<String>),
}

/// A unit of work for a backend connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Read {
        cursor: Cursor,
    },
    Insert {
        table: TableRef,
        documents: Vec<Record>,
        #[serde(default)]
        conflict: ConflictMode,
    },
    /// Merge `patch` into every selected record.
    Update {
        target: Cursor,
        patch: Record,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<Guard>,
    },
    /// Replace every selected record with `document`.
    Replace {
        target: Cursor,
        document: Record,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<Guard>,
    },
    Delete {
        target: Cursor,
    },
    DbCreate {
        name: String,
    },
    DbDrop {
        name: String,
    },
    DbList,
    TableCreate {
        table: TableRef,
        primary_key: String,
    },
    TableDrop {
        table: TableRef,
    },
    TableList {
        db: String,
    },
    IndexCreate {
        table: TableRef,
        name: String,
        fields: IndexFields,
    },
    IndexDrop {
        table: TableRef,
        name: String,
    },
    IndexList {
        table: TableRef,
    },
}

impl Command {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Read { .. } => "read",
            Command::Insert { .. } => "insert",
            Command::Update { .. } => "update",
            Command::Replace { .. } => "replace",
            Command::Delete { .. } => "delete",
            Command::DbCreate { .. } => "db_create",
            Command::DbDrop { .. } => "db_drop",
            Command::DbList => "db_list",
            Command::TableCreate { .. } => "table_create",
            Command::TableDrop { .. } => "table_drop",
            Command::TableList { .. } => "table_list",
            Command::IndexCreate { .. } => "index_create",
            Command::IndexDrop { .. } => "index_drop",
            Command::IndexList { .. } => "index_list",
        }
    }
}
