//! Public API: schema-bound collections, documents with revision tracking,
//! builder-pattern reads and deletes, and table lifecycle.

pub mod builders;
pub mod collection;
pub mod document;
pub mod lifecycle;
pub mod revision;
pub mod storage_config;

pub use builders::{DeleteBuilder, Fetched, GetBuilder};
pub use collection::{Collection, DbOptions};
pub use document::{DirtyState, Document};
pub use lifecycle::{create_database, drop_database, list_databases};
pub use revision::Revision;
pub use storage_config::{IndexDef, SPECIAL_NAMESPACE, StorageConfig};

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{Value, json};

    use crate::backend::MemoryConnector;
    use crate::config::{ServerProfile, StoreConfig};
    use crate::connection::{ConnectionManager, RetryPolicy};
    use crate::schema::{FieldDef, RecordSchema};

    use super::Collection;

    pub fn manager(connector: &MemoryConnector) -> Arc<ConnectionManager> {
        Arc::new(
            ConnectionManager::new(
                StoreConfig::new().server("default", ServerProfile::new("localhost", 28015)),
                Arc::new(connector.clone()),
            )
            .with_retry(RetryPolicy::new(3, Duration::ZERO)),
        )
    }

    pub fn user_schema(special: Value) -> RecordSchema {
        RecordSchema::new("users")
            .field("name", FieldDef::string().required())
            .field("email", FieldDef::string())
            .field("age", FieldDef::integer().default_value(0))
            .field("tags", FieldDef::array())
            .field("team", FieldDef::string())
            .field("level", FieldDef::integer())
            .with_special("revstore", special)
    }

    /// A `users` collection with its table already created.
    pub fn users(connector: &MemoryConnector, special: Value) -> Collection {
        let users =
            Collection::new(manager(connector), Arc::new(user_schema(special))).unwrap();
        assert!(users.create_table().unwrap());
        users
    }

    pub fn revisioned(connector: &MemoryConnector) -> Collection {
        users(
            connector,
            json!({"revisions": true, "indexes": {"email": null, "team_level": ["team", "level"]}}),
        )
    }
}
