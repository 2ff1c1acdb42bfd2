//! TCP server that wraps a shared revstore [`Engine`].
//!
//! Each connected client sends JSON-line requests and receives JSON-line
//! responses. Commands from all connections run against the same engine;
//! its internal lock serializes writers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use revstore_core::engine::Engine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::protocol::{Request, Response};

/// A revstore server listening on a TCP socket.
pub struct RevstoreServer {
    engine: Arc<Engine>,
    listener: TcpListener,
}

impl RevstoreServer {
    /// Bind to `addr`. Port `0` picks a free port; see [`local_addr`](Self::local_addr).
    pub async fn bind(
        engine: Arc<Engine>,
        addr: impl tokio::net::ToSocketAddrs,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { engine, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the server, accepting connections until a shutdown signal is received.
    pub async fn run(self) -> std::io::Result<()> {
        self.serve(shutdown_signal()).await
    }

    /// Run the server until `shutdown` completes.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
        info!(addr = %self.local_addr()?, "server listening");

        let accept_loop = async {
            loop {
                match self.listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "client connected");
                        let engine = Arc::clone(&self.engine);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(engine, stream).await {
                                warn!(error = %e, %peer, "connection handler error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept error");
                    }
                }
            }
        };

        tokio::select! {
            _ = accept_loop => {}
            _ = shutdown => {
                info!("shutdown signal received");
            }
        }

        Ok(())
    }
}

async fn handle_connection(engine: Arc<Engine>, stream: TcpStream) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(req) => dispatch(&engine, req),
            Err(e) => Response::error("ParseError", e.to_string()),
        };

        let mut resp_bytes = match serde_json::to_vec(&response) {
            Ok(bytes) => bytes,
            Err(e) => serde_json::to_vec(&Response::error("SerializationError", e.to_string()))
                .map_err(std::io::Error::other)?,
        };
        resp_bytes.push(b'\n');

        writer.write_all(&resp_bytes).await?;
        writer.flush().await?;
    }

    Ok(())
}

fn dispatch(engine: &Engine, req: Request) -> Response {
    match req {
        Request::Ping => Response::ok_empty(),
        Request::Run { command } => match engine.run(&command) {
            Ok(outcome) => Response::ok_outcome(outcome),
            Err(e) => {
                debug!(command = command.name(), error = %e, "command failed");
                Response::backend(e)
            }
        },
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
