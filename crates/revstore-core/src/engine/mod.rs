//! In-process document backend.
//!
//! The [`Engine`] keeps databases of tables in memory and evaluates
//! [`Command`]s with the semantics the access layer relies on: point and
//! multi-get lookups, secondary and compound index lookups, half-open index
//! ranges, conflict-mode inserts, and guarded writes. Errors are reported
//! the way a remote backend would, as [`BackendError`]s with `OpFailed` or
//! `QueryLogic` codes and human-readable messages.
//!
//! All state sits behind one `RwLock`: reads share it, writes take it
//! exclusively, so a guarded write's check and its effect are atomic.

mod eval;
mod write;

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::backend::BackendError;
use crate::query::ordering::Datum;
use crate::query::{Command, Cursor, IndexFields};
use crate::types::{DEFAULT_DATABASE, DdlSummary, Outcome, Record, TableRef, WriteSummary};

/// One table: rows keyed by primary key under the total value order.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub(crate) primary_key: String,
    pub(crate) rows: BTreeMap<Datum, Record>,
    pub(crate) indexes: BTreeMap<String, IndexFields>,
}

impl Table {
    fn new(primary_key: String) -> Self {
        Self {
            primary_key,
            rows: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub(crate) fn index(&self, name: &str, table: &TableRef) -> Result<&IndexFields, BackendError> {
        self.indexes.get(name).ok_or_else(|| {
            BackendError::op_failed(format!(
                "Index `{name}` was not found on table `{table}`."
            ))
        })
    }
}

#[derive(Debug, Default)]
struct Database {
    tables: BTreeMap<String, Table>,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, Database>,
}

impl State {
    fn database(&self, name: &str) -> Result<&Database, BackendError> {
        self.databases
            .get(name)
            .ok_or_else(|| BackendError::op_failed(format!("Database `{name}` does not exist.")))
    }

    fn database_mut(&mut self, name: &str) -> Result<&mut Database, BackendError> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| BackendError::op_failed(format!("Database `{name}` does not exist.")))
    }

    fn table(&self, table: &TableRef) -> Result<&Table, BackendError> {
        self.database(&table.db)?
            .tables
            .get(&table.table)
            .ok_or_else(|| BackendError::op_failed(format!("Table `{table}` does not exist.")))
    }

    fn table_mut(&mut self, table: &TableRef) -> Result<&mut Table, BackendError> {
        self.database_mut(&table.db)?
            .tables
            .get_mut(&table.table)
            .ok_or_else(|| BackendError::op_failed(format!("Table `{table}` does not exist.")))
    }
}

/// An in-memory backend. Starts with an empty `test` database.
#[derive(Debug)]
pub struct Engine {
    state: RwLock<State>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let mut state = State::default();
        state
            .databases
            .insert(DEFAULT_DATABASE.to_string(), Database::default());
        Self {
            state: RwLock::new(state),
        }
    }

    /// Execute one command.
    pub fn run(&self, command: &Command) -> Result<Outcome, BackendError> {
        debug!(command = command.name(), "engine run");
        match command {
            Command::Read { cursor } => self.read(cursor),

            Command::Insert {
                table,
                documents,
                conflict,
            } => {
                let mut state = self.state.write();
                let t = state.table_mut(table)?;
                Ok(Outcome::Write(write::insert(t, documents, *conflict)))
            }
            Command::Update {
                target,
                patch,
                guard,
            } => self.modify(target, |t, pks, summary| {
                write::update(t, pks, patch, guard.as_ref(), summary)
            }),
            Command::Replace {
                target,
                document,
                guard,
            } => self.modify(target, |t, pks, summary| {
                write::replace(t, pks, document, guard.as_ref(), summary)
            }),
            Command::Delete { target } => self.modify(target, |t, pks, summary| {
                write::delete(t, pks, summary);
                Ok(())
            }),

            Command::DbCreate { name } => {
                let mut state = self.state.write();
                if state.databases.contains_key(name) {
                    return Err(BackendError::op_failed(format!(
                        "Database `{name}` already exists."
                    )));
                }
                state.databases.insert(name.clone(), Database::default());
                Ok(created())
            }
            Command::DbDrop { name } => {
                let mut state = self.state.write();
                if state.databases.remove(name).is_none() {
                    return Err(BackendError::op_failed(format!(
                        "Database `{name}` does not exist."
                    )));
                }
                Ok(dropped())
            }
            Command::DbList => Ok(Outcome::Names(
                self.state.read().databases.keys().cloned().collect(),
            )),

            Command::TableCreate { table, primary_key } => {
                let mut state = self.state.write();
                let db = state.database_mut(&table.db)?;
                if db.tables.contains_key(&table.table) {
                    return Err(BackendError::op_failed(format!(
                        "Table `{table}` already exists."
                    )));
                }
                db.tables
                    .insert(table.table.clone(), Table::new(primary_key.clone()));
                Ok(created())
            }
            Command::TableDrop { table } => {
                let mut state = self.state.write();
                let db = state.database_mut(&table.db)?;
                if db.tables.remove(&table.table).is_none() {
                    return Err(BackendError::op_failed(format!(
                        "Table `{table}` does not exist."
                    )));
                }
                Ok(dropped())
            }
            Command::TableList { db } => Ok(Outcome::Names(
                self.state.read().database(db)?.tables.keys().cloned().collect(),
            )),

            Command::IndexCreate {
                table,
                name,
                fields,
            } => {
                let mut state = self.state.write();
                let t = state.table_mut(table)?;
                if t.indexes.contains_key(name) {
                    return Err(BackendError::op_failed(format!(
                        "Index `{name}` already exists on table `{table}`."
                    )));
                }
                t.indexes.insert(name.clone(), fields.clone());
                Ok(created())
            }
            Command::IndexDrop { table, name } => {
                let mut state = self.state.write();
                let t = state.table_mut(table)?;
                if t.indexes.remove(name).is_none() {
                    return Err(BackendError::op_failed(format!(
                        "Index `{name}` does not exist on table `{table}`."
                    )));
                }
                Ok(dropped())
            }
            Command::IndexList { table } => Ok(Outcome::Names(
                self.state.read().table(table)?.indexes.keys().cloned().collect(),
            )),
        }
    }

    fn read(&self, cursor: &Cursor) -> Result<Outcome, BackendError> {
        let state = self.state.read();
        let t = state.table(cursor.table())?;
        let rows = eval::select(t, cursor)?;
        if cursor.is_single() {
            Ok(Outcome::Datum(rows.into_iter().next().map(serde_json::Value::Object)))
        } else {
            Ok(Outcome::Rows(
                rows.into_iter().map(serde_json::Value::Object).collect(),
            ))
        }
    }

    /// Resolve `target` to primary keys and apply `f` to them under one
    /// write lock.
    fn modify<F>(&self, target: &Cursor, f: F) -> Result<Outcome, BackendError>
    where
        F: FnOnce(&mut Table, Vec<Datum>, &mut WriteSummary) -> Result<(), BackendError>,
    {
        let mut state = self.state.write();
        let t = state.table_mut(target.table())?;
        let mut summary = WriteSummary::default();
        let pks = eval::target_keys(t, target)?;
        if pks.is_empty() && matches!(target, Cursor::Get { .. }) {
            summary.skipped = 1;
        }
        f(t, pks, &mut summary)?;
        Ok(Outcome::Write(summary))
    }
}

fn created() -> Outcome {
    Outcome::Ddl(DdlSummary {
        created: 1,
        dropped: 0,
    })
}

fn dropped() -> Outcome {
    Outcome::Ddl(DdlSummary {
        created: 0,
        dropped: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Bound, Guard, Predicate};
    use crate::types::ConflictMode;
    use serde_json::{Value, json};

    fn users() -> TableRef {
        TableRef::new("test", "users")
    }

    fn rec(v: Value) -> Record {
        v.as_object().unwrap().clone()
    }

    fn engine_with_users() -> Engine {
        let engine = Engine::new();
        engine
            .run(&Command::TableCreate {
                table: users(),
                primary_key: "_id".into(),
            })
            .unwrap();
        engine
    }

    fn insert(engine: &Engine, docs: Vec<Value>) -> WriteSummary {
        match engine
            .run(&Command::Insert {
                table: users(),
                documents: docs.into_iter().map(rec).collect(),
                conflict: ConflictMode::Error,
            })
            .unwrap()
        {
            Outcome::Write(s) => s,
            other => panic!("expected write, got {other:?}"),
        }
    }

    fn rows(engine: &Engine, cursor: Cursor) -> Vec<Value> {
        match engine.run(&Command::Read { cursor }).unwrap() {
            Outcome::Rows(r) => r,
            other => panic!("expected rows, got {other:?}"),
        }
    }

    fn write_summary(outcome: Outcome) -> WriteSummary {
        match outcome {
            Outcome::Write(s) => s,
            other => panic!("expected write, got {other:?}"),
        }
    }

    #[test]
    fn test_ddl_errors_are_op_failed() {
        let engine = engine_with_users();
        let err = engine
            .run(&Command::TableCreate {
                table: users(),
                primary_key: "_id".into(),
            })
            .unwrap_err();
        assert_eq!(err.code, crate::backend::ErrorCode::OpFailed);
        assert_eq!(err.message, "Table `test.users` already exists.");

        let err = engine
            .run(&Command::TableDrop {
                table: TableRef::new("test", "nope"),
            })
            .unwrap_err();
        assert_eq!(err.message, "Table `test.nope` does not exist.");

        let err = engine
            .run(&Command::TableList { db: "nope".into() })
            .unwrap_err();
        assert_eq!(err.message, "Database `nope` does not exist.");
    }

    #[test]
    fn test_database_lifecycle() {
        let engine = Engine::new();
        engine.run(&Command::DbCreate { name: "app".into() }).unwrap();
        assert!(engine.run(&Command::DbCreate { name: "app".into() }).is_err());
        assert_eq!(
            engine.run(&Command::DbList).unwrap(),
            Outcome::Names(vec!["app".into(), "test".into()])
        );
        engine.run(&Command::DbDrop { name: "app".into() }).unwrap();
        assert!(engine.run(&Command::DbDrop { name: "app".into() }).is_err());
    }

    #[test]
    fn test_insert_generates_keys_and_detects_duplicates() {
        let engine = engine_with_users();
        let s = insert(&engine, vec![json!({"name": "a"}), json!({"_id": "b", "name": "b"})]);
        assert_eq!(s.inserted, 2);
        assert_eq!(s.generated_keys.len(), 1);
        assert!(s.generated_keys[0].is_string());

        let s = insert(&engine, vec![json!({"_id": "b", "name": "again"})]);
        assert_eq!(s.inserted, 0);
        assert_eq!(s.errors, 1);
        assert!(s.first_error.unwrap().starts_with("Duplicate primary key"));
    }

    #[test]
    fn test_insert_conflict_modes() {
        let engine = engine_with_users();
        insert(&engine, vec![json!({"_id": "a", "x": 1, "y": 1})]);

        let run = |doc: Value, conflict| {
            write_summary(
                engine
                    .run(&Command::Insert {
                        table: users(),
                        documents: vec![rec(doc)],
                        conflict,
                    })
                    .unwrap(),
            )
        };

        let s = run(json!({"_id": "a", "x": 2}), ConflictMode::Update);
        assert_eq!(s.replaced, 1);
        let s = run(json!({"_id": "a", "x": 2}), ConflictMode::Update);
        assert_eq!(s.unchanged, 1);
        let stored = rows(&engine, Cursor::Table { table: users() });
        assert_eq!(stored[0], json!({"_id": "a", "x": 2, "y": 1}));

        let s = run(json!({"_id": "a", "x": 3}), ConflictMode::Replace);
        assert_eq!(s.replaced, 1);
        let stored = rows(&engine, Cursor::Table { table: users() });
        assert_eq!(stored[0], json!({"_id": "a", "x": 3}));
    }

    #[test]
    fn test_point_get_missing_is_null() {
        let engine = engine_with_users();
        let out = engine
            .run(&Command::Read {
                cursor: Cursor::Get {
                    table: users(),
                    key: json!("nope"),
                },
            })
            .unwrap();
        assert_eq!(out, Outcome::Datum(None));
    }

    #[test]
    fn test_compound_index_range_is_half_open() {
        let engine = engine_with_users();
        engine
            .run(&Command::IndexCreate {
                table: users(),
                name: "a_b".into(),
                fields: IndexFields::Compound(vec!["a".into(), "b".into()]),
            })
            .unwrap();
        insert(
            &engine,
            vec![
                json!({"_id": 1, "a": 5, "b": "x"}),
                json!({"_id": 2, "a": 5, "b": 7}),
                json!({"_id": 3, "a": 6, "b": "x"}),
                json!({"_id": 4, "a": 5}),
            ],
        );

        let found = rows(
            &engine,
            Cursor::Between {
                table: users(),
                index: "a_b".into(),
                lower: vec![Bound::Value(json!(5)), Bound::Min],
                upper: vec![Bound::Value(json!(5)), Bound::Max],
            },
        );
        let ids: Vec<_> = found.iter().map(|r| r["_id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(1)]);

        // Upper bound is exclusive.
        let found = rows(
            &engine,
            Cursor::Between {
                table: users(),
                index: "a_b".into(),
                lower: vec![Bound::Value(json!(5)), Bound::Min],
                upper: vec![Bound::Value(json!(5)), Bound::Value(json!("x"))],
            },
        );
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_unknown_index_message() {
        let engine = engine_with_users();
        let err = engine
            .run(&Command::Read {
                cursor: Cursor::GetAll {
                    table: users(),
                    keys: vec![json!(1)],
                    index: Some("nope".into()),
                },
            })
            .unwrap_err();
        assert_eq!(err.message, "Index `nope` was not found on table `test.users`.");
    }

    #[test]
    fn test_guarded_update() {
        let engine = engine_with_users();
        insert(&engine, vec![json!({"_id": "a", "_rev": "1-x", "n": 1})]);
        let target = Cursor::Get {
            table: users(),
            key: json!("a"),
        };

        let s = write_summary(
            engine
                .run(&Command::Update {
                    target: target.clone(),
                    patch: rec(json!({"n": 2, "_rev": "2-y"})),
                    guard: Some(Guard {
                        field: "_rev".into(),
                        equals: json!("1-x"),
                    }),
                })
                .unwrap(),
        );
        assert_eq!(s.replaced, 1);

        let s = write_summary(
            engine
                .run(&Command::Update {
                    target,
                    patch: rec(json!({"n": 3, "_rev": "2-z"})),
                    guard: Some(Guard {
                        field: "_rev".into(),
                        equals: json!("1-x"),
                    }),
                })
                .unwrap(),
        );
        assert_eq!(s.replaced, 0);
        assert_eq!(s.guard_rejected, Some(json!("2-y")));
    }

    #[test]
    fn test_update_and_delete_missing_are_skipped() {
        let engine = engine_with_users();
        let target = Cursor::Get {
            table: users(),
            key: json!("ghost"),
        };
        let s = write_summary(
            engine
                .run(&Command::Update {
                    target: target.clone(),
                    patch: rec(json!({"n": 1})),
                    guard: None,
                })
                .unwrap(),
        );
        assert_eq!(s.skipped, 1);
        let s = write_summary(engine.run(&Command::Delete { target }).unwrap());
        assert_eq!(s.skipped, 1);
        assert_eq!(s.deleted, 0);
    }

    #[test]
    fn test_delete_over_filtered_selection() {
        let engine = engine_with_users();
        insert(
            &engine,
            vec![
                json!({"_id": 1, "kind": "a"}),
                json!({"_id": 2, "kind": "b"}),
                json!({"_id": 3, "kind": "a"}),
            ],
        );
        let s = write_summary(
            engine
                .run(&Command::Delete {
                    target: Cursor::Table { table: users() }.filter(Predicate::eq("kind", "a")),
                })
                .unwrap(),
        );
        assert_eq!(s.deleted, 2);
        assert_eq!(rows(&engine, Cursor::Table { table: users() }).len(), 1);
    }
}
