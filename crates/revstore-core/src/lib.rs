//! # revstore
//!
//! A document access layer over a clustered document backend.
//!
//! revstore manages named server profiles and connection acquisition with
//! bounded retry, translates a small query vocabulary (primary key,
//! secondary and compound index lookups with one open position, filters,
//! projection, ordering, limits) into backend commands, and models records
//! as [`Document`](api::Document)s with dirty tracking and revision-based
//! optimistic concurrency.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use revstore_core::api::Collection;
//! use revstore_core::backend::MemoryConnector;
//! use revstore_core::config::{ServerProfile, StoreConfig};
//! use revstore_core::connection::ConnectionManager;
//! use revstore_core::schema::{FieldDef, RecordSchema};
//! use revstore_core::types::ConflictMode;
//! use serde_json::json;
//!
//! let manager = Arc::new(ConnectionManager::new(
//!     StoreConfig::new().server("default", ServerProfile::new("localhost", 28015)),
//!     Arc::new(MemoryConnector::default()),
//! ));
//!
//! let schema = RecordSchema::new("users")
//!     .field("name", FieldDef::string().required())
//!     .field("age", FieldDef::integer().default_value(0))
//!     .with_special("revstore", json!({"revisions": true}));
//! let users = Collection::new(manager, Arc::new(schema)).unwrap();
//! users.create_table().unwrap();
//!
//! let mut alice = users.document(json!({"name": "Alice"})).unwrap();
//! let id = alice.insert(ConflictMode::Error).unwrap();
//!
//! alice.set("age", 30).unwrap();
//! assert!(alice.update(false).unwrap());
//! assert_eq!(alice.revision().unwrap().version, 2);
//!
//! let fetched = users.get().key(id).execute().unwrap().into_one().unwrap();
//! assert_eq!(fetched.get("age"), Some(&json!(30)));
//! ```

pub mod api;
pub mod backend;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod query;
pub mod schema;
pub mod types;
