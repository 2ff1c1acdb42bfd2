//! Table, index, and database lifecycle.
//!
//! "Already exists" and "does not exist" answers from the backend are normal
//! `false` returns here, not errors.

use tracing::{debug, error};

use crate::connection::ConnectionManager;
use crate::error::{Error, Result, StorageError};
use crate::query::Command;
use crate::types::{Outcome, Role};

use super::collection::{Collection, unexpected};

impl Collection {
    /// Create the table and its declared indexes. Returns `false` when the
    /// table already exists, in which case indexes are left alone.
    pub fn create_table(&self) -> Result<bool> {
        let table = self.table_ref();
        let mut conn = self.manager().acquire(self.server(), Role::Primary)?;

        match conn.run(&Command::TableCreate {
            table: table.clone(),
            primary_key: self.primary_key().to_string(),
        }) {
            Ok(_) => {}
            Err(Error::Storage(StorageError::AlreadyExists(msg))) => {
                debug!(%table, %msg, "table exists");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        for (name, def) in &self.config().indexes {
            let command = Command::IndexCreate {
                table: table.clone(),
                name: name.clone(),
                fields: def.fields(name),
            };
            match conn.run(&command) {
                Ok(_) => {}
                Err(Error::Storage(StorageError::AlreadyExists(msg))) => {
                    error!(%table, index = %name, %msg, "index creation skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Drop the table. Returns `false` when it does not exist.
    pub fn drop_table(&self) -> Result<bool> {
        match self.run(Role::Primary, &Command::TableDrop {
            table: self.table_ref(),
        }) {
            Ok(_) => Ok(true),
            Err(Error::Storage(StorageError::NotFound(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Indexes present on the backend table.
    pub fn list_indexes(&self) -> Result<Vec<String>> {
        let command = Command::IndexList {
            table: self.table_ref(),
        };
        match self.run(Role::Secondary, &command)? {
            Outcome::Names(names) => Ok(names),
            other => Err(unexpected(&command, &other)),
        }
    }

    /// Create this collection's database. See [`create_database`].
    pub fn create_database(&self) -> Result<bool> {
        create_database(self.manager(), &self.database(), self.server())
    }
}

/// Create database `name` on `server`. An existing database counts as
/// success.
pub fn create_database(manager: &ConnectionManager, name: &str, server: &str) -> Result<bool> {
    match manager.run(server, Role::Primary, &Command::DbCreate {
        name: name.to_string(),
    }) {
        Ok(_) => Ok(true),
        Err(Error::Storage(StorageError::AlreadyExists(_))) => Ok(true),
        Err(e) => Err(e),
    }
}

/// Drop database `name` on `server`. Returns `false` when it does not exist.
pub fn drop_database(manager: &ConnectionManager, name: &str, server: &str) -> Result<bool> {
    match manager.run(server, Role::Primary, &Command::DbDrop {
        name: name.to_string(),
    }) {
        Ok(_) => Ok(true),
        Err(Error::Storage(StorageError::NotFound(_))) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Database names on `server`.
pub fn list_databases(manager: &ConnectionManager, server: &str) -> Result<Vec<String>> {
    let command = Command::DbList;
    match manager.run(server, Role::Secondary, &command)? {
        Outcome::Names(names) => Ok(names),
        other => Err(unexpected(&command, &other)),
    }
}
