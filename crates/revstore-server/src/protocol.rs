//! Wire protocol: JSON-over-newlines request/response types.
//!
//! Each request is a single JSON line; each response is a single JSON line.
//! Failures carry the backend error class in `error` so a driver can rebuild
//! the driver-side [`BackendError`].

use revstore_core::backend::BackendError;
use revstore_core::query::Command;
use revstore_core::types::Outcome;
use serde::{Deserialize, Serialize};

/// A request from a client.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Run {
        command: Command,
    },
}

/// A response to a client.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Ok(OkResponse),
    Error(ErrorResponse),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OkResponse {
    Outcome { ok: bool, outcome: Outcome },
    Empty { ok: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl Response {
    pub fn ok_empty() -> Self {
        Response::Ok(OkResponse::Empty { ok: true })
    }

    pub fn ok_outcome(outcome: Outcome) -> Self {
        Response::Ok(OkResponse::Outcome { ok: true, outcome })
    }

    pub fn error(error: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            error: error.into(),
            message: message.into(),
        })
    }

    pub fn backend(err: BackendError) -> Self {
        Response::error(err.code.as_str(), err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_core::query::Cursor;
    use revstore_core::types::TableRef;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req: Request = serde_json::from_value(json!({"op": "ping"})).unwrap();
        assert!(matches!(req, Request::Ping));

        let run = Request::Run {
            command: Command::Read {
                cursor: Cursor::Get {
                    table: TableRef::new("test", "users"),
                    key: json!("alice"),
                },
            },
        };
        let v = serde_json::to_value(&run).unwrap();
        assert_eq!(v["op"], "run");
        assert_eq!(v["command"]["cmd"], "read");
        assert_eq!(v["command"]["cursor"]["term"], "get");
    }

    #[test]
    fn test_response_wire_format() {
        let v = serde_json::to_value(Response::ok_outcome(Outcome::Datum(None))).unwrap();
        assert_eq!(v, json!({"ok": true, "outcome": {"type": "datum", "value": null}}));

        let v = serde_json::to_value(Response::backend(BackendError::op_failed(
            "Table `test.users` already exists.",
        )))
        .unwrap();
        assert_eq!(v["error"], "OpFailed");
        assert_eq!(v["message"], "Table `test.users` already exists.");
    }
}
