//! Per-schema storage configuration, derived once from the schema's
//! namespaced special section merged over the defaults.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::config::merge;
use crate::error::ConfigError;
use crate::query::IndexFields;
use crate::schema::Schema;
use crate::types::{DEFAULT_DATABASE, DEFAULT_PRIMARY_KEY, DEFAULT_SERVER};

/// Namespace of the schema special section read by this crate.
pub const SPECIAL_NAMESPACE: &str = "revstore";

/// How a declared index maps to record fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexDef {
    /// No definition: the index name is the field name.
    Implicit,
    Field(String),
    Compound(Vec<String>),
}

impl IndexDef {
    fn from_value(name: &str, v: &Value) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedIndex {
            index: name.to_string(),
            definition: v.to_string(),
        };
        match v {
            Value::Null => Ok(IndexDef::Implicit),
            Value::String(s) if s.is_empty() => Ok(IndexDef::Implicit),
            Value::String(s) => Ok(IndexDef::Field(s.clone())),
            Value::Array(items) if items.is_empty() => Ok(IndexDef::Implicit),
            Value::Array(items) => items
                .iter()
                .map(|i| i.as_str().map(str::to_string).ok_or_else(malformed))
                .collect::<Result<Vec<_>, _>>()
                .map(IndexDef::Compound),
            _ => Err(malformed()),
        }
    }

    /// The fields the backend should index for an index called `name`.
    pub fn fields(&self, name: &str) -> IndexFields {
        match self {
            IndexDef::Implicit => IndexFields::Field(name.to_string()),
            IndexDef::Field(f) => IndexFields::Field(f.clone()),
            IndexDef::Compound(fs) => IndexFields::Compound(fs.clone()),
        }
    }
}

/// Storage settings for one document type.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Primary-key field name.
    pub primary: String,
    /// Whether `insert` generates a missing primary key.
    pub auto_id: bool,
    pub db: String,
    pub server: String,
    pub indexes: BTreeMap<String, IndexDef>,
    /// Optimistic-concurrency revisioning on `update`.
    pub revisions: bool,
}

impl StorageConfig {
    fn defaults() -> Value {
        json!({
            "auto_id": true,
            "server": DEFAULT_SERVER,
            "db": DEFAULT_DATABASE,
            "indexes": {},
            "primary": DEFAULT_PRIMARY_KEY,
            "revisions": false,
        })
    }

    /// Build a config from overrides merged over the defaults.
    pub fn from_value(overrides: &Value) -> Result<Self, ConfigError> {
        let merged = merge(&Self::defaults(), overrides);

        let string = |key: &str| -> Result<String, ConfigError> {
            merged
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ConfigError::InvalidStorageConfig(format!("'{key}' must be a string")))
        };
        let boolean = |key: &str| -> Result<bool, ConfigError> {
            merged
                .get(key)
                .and_then(Value::as_bool)
                .ok_or_else(|| ConfigError::InvalidStorageConfig(format!("'{key}' must be a boolean")))
        };

        let indexes = match merged.get("indexes") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, def)| Ok((name.clone(), IndexDef::from_value(name, def)?)))
                .collect::<Result<BTreeMap<_, _>, ConfigError>>()?,
            _ => {
                return Err(ConfigError::InvalidStorageConfig(
                    "'indexes' must be a mapping".to_string(),
                ));
            }
        };

        Ok(Self {
            primary: string("primary")?,
            auto_id: boolean("auto_id")?,
            db: string("db")?,
            server: string("server")?,
            indexes,
            revisions: boolean("revisions")?,
        })
    }

    /// Derive the table name and storage config from a schema. A schema
    /// without a name cannot back a table.
    pub fn derive(schema: &dyn Schema) -> Result<(String, Self), ConfigError> {
        let name = schema
            .name()
            .filter(|n| !n.is_empty())
            .ok_or(ConfigError::MissingSchemaName)?
            .to_string();
        let special = schema
            .special(SPECIAL_NAMESPACE)
            .unwrap_or_else(|| json!({}));
        Ok((name, Self::from_value(&special)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let conf = StorageConfig::from_value(&json!({})).unwrap();
        assert_eq!(conf.primary, "_id");
        assert!(conf.auto_id);
        assert_eq!(conf.server, "default");
        assert_eq!(conf.db, "test");
        assert!(conf.indexes.is_empty());
        assert!(!conf.revisions);
    }

    #[test]
    fn test_overrides_and_index_shapes() {
        let conf = StorageConfig::from_value(&json!({
            "db": "app",
            "revisions": true,
            "indexes": {"email": null, "owner": "owner_id", "ab": ["a", "b"]}
        }))
        .unwrap();
        assert_eq!(conf.db, "app");
        assert!(conf.revisions);
        assert_eq!(conf.indexes["email"], IndexDef::Implicit);
        assert_eq!(
            conf.indexes["owner"].fields("owner"),
            IndexFields::Field("owner_id".into())
        );
        assert_eq!(
            conf.indexes["ab"].fields("ab"),
            IndexFields::Compound(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            conf.indexes["email"].fields("email"),
            IndexFields::Field("email".into())
        );
    }

    #[test]
    fn test_malformed_index_rejected() {
        let err = StorageConfig::from_value(&json!({"indexes": {"bad": 42}})).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedIndex { .. }));

        let err = StorageConfig::from_value(&json!({"indexes": {"bad": ["a", 1]}})).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedIndex { .. }));
    }

    #[test]
    fn test_wrong_types_rejected() {
        let err = StorageConfig::from_value(&json!({"revisions": "yes"})).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStorageConfig(_)));
    }
}
