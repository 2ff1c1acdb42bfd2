//! Client library for a `revstore-server`, plus a blocking [`Connector`]
//! built on it.
//!
//! Each request serializes a JSON line, sends it, reads a JSON-line
//! response, and returns the parsed result.

use std::sync::Arc;
use std::time::Duration;

use revstore_core::backend::{BackendError, Connection, Connector};
use revstore_core::config::ServerProfile;
use revstore_core::query::Command;
use revstore_core::types::{Outcome, Role};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::protocol::{ErrorResponse, Request};

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Async client for a revstore server.
pub struct RevstoreClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    line_buf: String,
    timeout: Duration,
}

impl RevstoreClient {
    /// Connect to `host:port`, giving up after `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::Timeout(addr))??;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            line_buf: String::new(),
            timeout,
        })
    }

    pub async fn ping(&mut self) -> Result<()> {
        let resp = self.send_request(&Request::Ping).await?;
        check_error(&resp)
    }

    /// Run one command on the server.
    pub async fn run(&mut self, command: &Command) -> Result<Outcome> {
        let resp = self
            .send_request(&Request::Run {
                command: command.clone(),
            })
            .await?;
        outcome_from_response(resp)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn send_request(&mut self, req: &Request) -> Result<Value> {
        let mut data = serde_json::to_vec(req).map_err(ClientError::Serialization)?;
        data.push(b'\n');
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;

        self.line_buf.clear();
        let n = tokio::time::timeout(self.timeout, self.reader.read_line(&mut self.line_buf))
            .await
            .map_err(|_| ClientError::Timeout("response".to_string()))??;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }

        let resp: Value =
            serde_json::from_str(self.line_buf.trim()).map_err(ClientError::Serialization)?;
        Ok(resp)
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

fn check_error(resp: &Value) -> Result<()> {
    if let Some(err) = resp.get("error") {
        let error = err.as_str().unwrap_or("Internal").to_string();
        let message = resp
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        return Err(ClientError::Server(ErrorResponse { error, message }));
    }
    Ok(())
}

fn outcome_from_response(mut resp: Value) -> Result<Outcome> {
    check_error(&resp)?;
    let outcome = resp
        .get_mut("outcome")
        .map(Value::take)
        .ok_or_else(|| ClientError::Protocol("missing outcome".to_string()))?;
    serde_json::from_value(outcome).map_err(ClientError::Serialization)
}

// ---------------------------------------------------------------------------
// Blocking driver
// ---------------------------------------------------------------------------

/// A [`Connector`] that dials revstore servers over TCP.
///
/// Calls block the current thread on a private runtime, so the connector
/// must not be used from inside another tokio runtime.
#[derive(Clone)]
pub struct TcpConnector {
    runtime: Arc<Runtime>,
}

impl TcpConnector {
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl std::fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnector").finish_non_exhaustive()
    }
}

impl Connector for TcpConnector {
    fn connect(
        &self,
        profile: &ServerProfile,
        role: Role,
    ) -> std::result::Result<Box<dyn Connection>, BackendError> {
        let endpoint = profile.endpoint(role);
        let client = self.runtime.block_on(RevstoreClient::connect(
            &endpoint.host,
            endpoint.port,
            profile.timeout(),
        ))?;
        debug!(host = %endpoint.host, port = endpoint.port, ?role, "connected");
        Ok(Box::new(TcpConnection {
            runtime: Arc::clone(&self.runtime),
            client: Some(client),
        }))
    }
}

/// One TCP session opened by [`TcpConnector`].
pub struct TcpConnection {
    runtime: Arc<Runtime>,
    client: Option<RevstoreClient>,
}

impl Connection for TcpConnection {
    fn run(&mut self, command: &Command) -> std::result::Result<Outcome, BackendError> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| BackendError::driver("connection is closed"))?;
        Ok(self.runtime.block_on(client.run(command))?)
    }

    fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = self.runtime.block_on(client.writer.shutdown()) {
                warn!(error = %e, "error closing connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_core::backend::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_check_error_carries_error_class() {
        let resp = json!({"error": "OpFailed", "message": "Table `test.t` already exists."});
        let err: BackendError = check_error(&resp).unwrap_err().into();
        assert_eq!(err.code, ErrorCode::OpFailed);
        assert_eq!(err.message, "Table `test.t` already exists.");

        assert!(check_error(&json!({"ok": true})).is_ok());
    }

    #[test]
    fn test_outcome_from_response() {
        let out = outcome_from_response(
            json!({"ok": true, "outcome": {"type": "rows", "value": [{"_id": 1}]}}),
        )
        .unwrap();
        assert_eq!(out, Outcome::Rows(vec![json!({"_id": 1})]));

        assert!(matches!(
            outcome_from_response(json!({"ok": true})),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn test_transport_errors_are_driver_errors() {
        let err: BackendError = ClientError::Disconnected.into();
        assert_eq!(err.code, ErrorCode::Driver);
    }

    #[test]
    fn test_connect_refused_is_driver_error() {
        let connector = TcpConnector::new().unwrap();
        // Bind then drop to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let profile = ServerProfile::new("127.0.0.1", port).with_timeout(Duration::from_secs(2));
        let Err(err) = connector.connect(&profile, Role::Primary) else {
            panic!("expected the connection to be refused");
        };
        assert_eq!(err.code, ErrorCode::Driver);
    }
}
