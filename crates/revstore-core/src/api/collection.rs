use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::connection::ConnectionManager;
use crate::error::{Error, Result, StorageError, ValidationError};
use crate::query::Command;
use crate::schema::Schema;
use crate::types::{Outcome, Record, Role, TableRef, WriteSummary};

use super::builders::{DeleteBuilder, GetBuilder};
use super::document::Document;
use super::storage_config::StorageConfig;

/// Per-call storage overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbOptions {
    /// Use this server profile instead of the configured one.
    pub server: Option<String>,
    /// Use `<db>_<postfix>` instead of the configured database.
    pub postfix: Option<String>,
}

impl DbOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = Some(postfix.into());
        self
    }
}

struct TableInfo {
    name: String,
    schema: Arc<dyn Schema>,
    config: StorageConfig,
}

/// Typed access to one backend table, bound to a schema.
///
/// Cheap to clone. Every document created or fetched through a collection
/// keeps a clone of it for its own writes.
#[derive(Clone)]
pub struct Collection {
    manager: Arc<ConnectionManager>,
    info: Arc<TableInfo>,
    options: DbOptions,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("table", &self.info.name)
            .field("config", &self.info.config)
            .field("options", &self.options)
            .finish()
    }
}

impl Collection {
    /// Bind `schema` to a table. The storage config is derived here, so a
    /// nameless schema or a malformed index definition fails immediately.
    pub fn new(manager: Arc<ConnectionManager>, schema: Arc<dyn Schema>) -> Result<Self> {
        let (name, config) = StorageConfig::derive(schema.as_ref())?;
        Ok(Self {
            manager,
            info: Arc::new(TableInfo {
                name,
                schema,
                config,
            }),
            options: DbOptions::default(),
        })
    }

    /// A view of this collection with per-call overrides applied.
    pub fn with_options(&self, options: DbOptions) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            info: Arc::clone(&self.info),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn config(&self) -> &StorageConfig {
        &self.info.config
    }

    pub fn schema(&self) -> &dyn Schema {
        self.info.schema.as_ref()
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn primary_key(&self) -> &str {
        &self.info.config.primary
    }

    /// Server profile used for this collection's commands.
    pub fn server(&self) -> &str {
        self.options
            .server
            .as_deref()
            .unwrap_or(&self.info.config.server)
    }

    /// Database name after postfix and global prefix.
    pub fn database(&self) -> String {
        let db = match &self.options.postfix {
            Some(postfix) => format!("{}_{}", self.info.config.db, postfix),
            None => self.info.config.db.clone(),
        };
        format!("{}{}", self.manager.prefix(), db)
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.database(), self.info.name.clone())
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// A new, unpersisted document from caller data, cleaned and validated.
    pub fn document(&self, data: Value) -> Result<Document> {
        let record = match data {
            Value::Object(record) => record,
            other => {
                return Err(ValidationError {
                    field: String::new(),
                    reason: format!("document must be an object, got {other}"),
                }
                .into());
            }
        };
        let record = self.info.schema.clean(record)?;
        self.info.schema.validate(&record)?;
        Ok(Document::new(self.clone(), record))
    }

    /// Wrap a record read from the backend.
    pub(crate) fn hydrate(&self, record: Record) -> Result<Document> {
        let record = self.info.schema.clean(record)?;
        Ok(Document::new(self.clone(), record))
    }

    // -----------------------------------------------------------------------
    // Reads and bulk writes
    // -----------------------------------------------------------------------

    /// Start a read.
    pub fn get(&self) -> GetBuilder<'_> {
        GetBuilder::new(self)
    }

    /// Full-table scan restricted by a `{field: value}` equality mapping.
    pub fn filter(&self, mapping: &Value) -> GetBuilder<'_> {
        GetBuilder::new(self).matching(mapping)
    }

    /// Whether a primary-key (or index, when `index` is given) lookup finds
    /// at least one record.
    pub fn exists(&self, key: impl Into<Value>, index: Option<&str>) -> Result<bool> {
        let builder = match index {
            Some(name) => self.get().index(name, key),
            None => self.get().key(key),
        };
        let found = builder
            .fields([self.primary_key()])
            .limit(1)
            .execute_raw()?;
        Ok(found.into_one().is_some())
    }

    /// Start a delete by selector.
    pub fn delete_where(&self) -> DeleteBuilder<'_> {
        DeleteBuilder::new(self)
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    pub(crate) fn run(&self, role: Role, command: &Command) -> Result<Outcome> {
        self.manager.run(self.server(), role, command)
    }

    pub(crate) fn write(&self, command: &Command) -> Result<WriteSummary> {
        match self.run(Role::Primary, command)? {
            Outcome::Write(summary) => Ok(summary),
            other => Err(unexpected(command, &other)),
        }
    }
}

pub(crate) fn unexpected(command: &Command, outcome: &Outcome) -> Error {
    StorageError::UnexpectedOutcome(format!(
        "{} returned {}",
        command.name(),
        outcome.kind()
    ))
    .into()
}
