//! revstore network server and driver.
//!
//! Serves an in-memory revstore engine over TCP with a JSON-lines protocol,
//! and provides the [`TcpConnector`] driver that lets a
//! [`ConnectionManager`](revstore_core::connection::ConnectionManager) talk
//! to it.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{RevstoreClient, TcpConnector};
pub use server::RevstoreServer;
