//! Driver seam between the access layer and a backend.
//!
//! A [`Connector`] opens [`Connection`]s for a server profile; a connection
//! runs [`Command`]s and reports failures as [`BackendError`]. The rest of
//! the crate never inspects a `BackendError` directly: [`translate`] maps it
//! onto the domain error taxonomy.

pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServerProfile;
use crate::error::{Error, IndexError, StorageError};
use crate::query::Command;
use crate::types::{Outcome, Role};

pub use memory::MemoryConnector;

/// Backend error classes, mirroring the driver's own error hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Transport or connection failure.
    Driver,
    /// The backend refused an operation on existing state.
    OpFailed,
    /// Type or argument error in the command.
    QueryLogic,
    /// A referenced value does not exist.
    NonExistence,
    Runtime,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Driver => "Driver",
            ErrorCode::OpFailed => "OpFailed",
            ErrorCode::QueryLogic => "QueryLogic",
            ErrorCode::NonExistence => "NonExistence",
            ErrorCode::Runtime => "Runtime",
            ErrorCode::Internal => "Internal",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Driver" => ErrorCode::Driver,
            "OpFailed" => ErrorCode::OpFailed,
            "QueryLogic" => ErrorCode::QueryLogic,
            "NonExistence" => ErrorCode::NonExistence,
            "Runtime" => ErrorCode::Runtime,
            _ => ErrorCode::Internal,
        }
    }
}

/// A failure reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", code.as_str())]
pub struct BackendError {
    pub code: ErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Driver, message)
    }

    pub fn op_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OpFailed, message)
    }

    pub fn query_logic(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueryLogic, message)
    }
}

/// An open session with one backend endpoint.
pub trait Connection: Send {
    fn run(&mut self, command: &Command) -> Result<Outcome, BackendError>;

    /// Release the session. Called exactly once by the connection guard.
    fn close(&mut self);
}

/// Opens connections for a server profile.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        profile: &ServerProfile,
        role: Role,
    ) -> Result<Box<dyn Connection>, BackendError>;
}

/// Map a driver error onto the domain taxonomy.
pub fn translate(err: BackendError) -> Error {
    let BackendError { code, message } = err;
    match code {
        ErrorCode::OpFailed if message.starts_with("Index") && message.contains("was not found") => {
            IndexError::NotFound {
                index: quoted_name(&message).unwrap_or_default(),
                message,
            }
            .into()
        }
        ErrorCode::OpFailed if message.contains("already exists") => {
            StorageError::AlreadyExists(message).into()
        }
        ErrorCode::OpFailed if message.contains("does not exist") => {
            StorageError::NotFound(message).into()
        }
        code => StorageError::Backend { code, message }.into(),
    }
}

/// First backquoted name in a backend message.
fn quoted_name(message: &str) -> Option<String> {
    let start = message.find('`')? + 1;
    let len = message[start..].find('`')?;
    Some(message[start..start + len].to_string())
}
