//! Integration tests for revstore-server: start a server, drive it through
//! `TcpConnector` and the document API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use revstore_core::api::Collection;
use revstore_core::config::{ServerProfile, StoreConfig};
use revstore_core::connection::{ConnectionManager, RetryPolicy};
use revstore_core::engine::Engine;
use revstore_core::error::{ConflictError, Error, IndexError, StorageError};
use revstore_core::query::Command;
use revstore_core::schema::{FieldDef, RecordSchema};
use revstore_core::types::{ConflictMode, Role};
use revstore_server::client::RevstoreClient;
use revstore_server::{RevstoreServer, TcpConnector};
use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

/// A server running on its own runtime. Stops when dropped.
struct TestServer {
    addr: SocketAddr,
    runtime: Runtime,
    _stop: oneshot::Sender<()>,
}

fn start_server() -> TestServer {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let server = runtime
        .block_on(RevstoreServer::bind(Arc::new(Engine::new()), "127.0.0.1:0"))
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    runtime.spawn(server.serve(async {
        stopped.await.ok();
    }));
    TestServer {
        addr,
        runtime,
        _stop: stop,
    }
}

fn profile(addr: SocketAddr) -> ServerProfile {
    ServerProfile::new("127.0.0.1", addr.port()).with_timeout(Duration::from_secs(5))
}

fn users(profile: ServerProfile) -> Collection {
    let manager = Arc::new(
        ConnectionManager::new(
            StoreConfig::new().server("default", profile),
            Arc::new(TcpConnector::new().unwrap()),
        )
        .with_retry(RetryPolicy::new(2, Duration::from_millis(10))),
    );
    let schema = RecordSchema::new("users")
        .field("name", FieldDef::string().required())
        .field("email", FieldDef::string())
        .field("age", FieldDef::integer().default_value(0))
        .with_special(
            "revstore",
            json!({"revisions": true, "indexes": {"email": null}}),
        );
    Collection::new(manager, Arc::new(schema)).unwrap()
}

#[test]
fn test_create_table_and_crud() {
    let server = start_server();
    let users = users(profile(server.addr));

    assert!(users.create_table().unwrap());
    assert!(!users.create_table().unwrap());
    assert_eq!(users.list_indexes().unwrap(), vec!["email"]);

    let mut alice = users
        .document(json!({"name": "Alice", "email": "alice@example.com"}))
        .unwrap();
    let id = alice.insert(ConflictMode::Error).unwrap();
    assert_eq!(alice.revision().unwrap().version, 1);

    let fetched = users
        .get()
        .index("email", "alice@example.com")
        .execute()
        .unwrap()
        .into_many();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].get("age"), Some(&json!(0)));

    alice.set("age", 31).unwrap();
    assert!(alice.update(false).unwrap());

    let again = users.get().key(id.clone()).execute().unwrap().into_one().unwrap();
    assert_eq!(again.get("age"), Some(&json!(31)));
    assert_eq!(again.revision().unwrap().version, 2);

    assert!(alice.delete().unwrap());
    assert!(users.get().key(id).execute().unwrap().into_one().is_none());
}

#[test]
fn test_stale_copy_conflicts_over_the_wire() {
    let server = start_server();
    let users = users(profile(server.addr));
    users.create_table().unwrap();

    let mut first = users.document(json!({"name": "Bob"})).unwrap();
    let id = first.insert(ConflictMode::Error).unwrap();
    let mut second = users.get().key(id).execute().unwrap().into_one().unwrap();

    first.set("age", 40).unwrap();
    assert!(first.update(false).unwrap());

    second.set("age", 41).unwrap();
    match second.update(false) {
        Err(Error::Conflict(ConflictError { .. })) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn test_backend_errors_keep_their_class() {
    let server = start_server();
    let users = users(profile(server.addr));
    users.create_table().unwrap();

    let mut dup = users.document(json!({"_id": "x", "name": "X"})).unwrap();
    dup.insert(ConflictMode::Error).unwrap();
    let mut dup = users.document(json!({"_id": "x", "name": "X"})).unwrap();
    assert!(matches!(
        dup.insert(ConflictMode::Error),
        Err(Error::Storage(StorageError::WriteFailed(_)))
    ));

    assert!(users.drop_table().unwrap());
    assert!(!users.drop_table().unwrap());

    // A table without the declared index.
    let create = Command::TableCreate {
        table: users.table_ref(),
        primary_key: "_id".into(),
    };
    users.manager().run("default", Role::Primary, &create).unwrap();
    match users.get().index("email", "a@b").execute() {
        Err(Error::Index(IndexError::NotFound { index, .. })) => assert_eq!(index, "email"),
        other => panic!("expected missing index, got {other:?}"),
    }
}

#[test]
fn test_unreachable_server_exhausts_retries() {
    let addr = {
        let server = start_server();
        server.addr
    };
    let users = users(profile(addr));
    match users.create_table() {
        Err(Error::Connection(err)) => assert_eq!(err.attempts, 2),
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[test]
fn test_ping() {
    let server = start_server();
    server.runtime.block_on(async {
        let port = server.addr.port();
        let mut client = RevstoreClient::connect("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap();
        client.ping().await.unwrap();
    });
}
