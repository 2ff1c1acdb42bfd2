//! Error types for all revstore operations.

use thiserror::Error;

use crate::backend::ErrorCode;

/// Top-level error type for revstore operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Programming or setup mistakes. Never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no such server: {0}")]
    UnknownServer(String),

    #[error("schema must declare a name to be used as a table")]
    MissingSchemaName,

    #[error("unknown index format for '{index}': {definition}")]
    MalformedIndex { index: String, definition: String },

    #[error("invalid storage config: {0}")]
    InvalidStorageConfig(String),

    #[error("invalid server config: {0}")]
    Parse(String),

    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// The backend could not be reached within the retry budget.
#[derive(Debug, Error)]
#[error("could not connect to server '{server}' after {attempts} attempts: {code:?}: {message}")]
pub struct ConnectionError {
    pub server: String,
    pub attempts: u32,
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index '{index}' is not declared on table '{table}'")]
    NotDeclared { table: String, index: String },

    #[error("index '{index}' does not exist in the backend: {message}")]
    NotFound { index: String, message: String },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("at most one open position per composite index query (got {0})")]
    MultipleOpenPositions(usize),

    #[error("composite index query requires at least one component")]
    EmptyTuple,

    #[error("filter must be a mapping of field names to values, got: {0}")]
    InvalidFilter(String),

    #[error("field projection requires a raw result")]
    ProjectionRequiresRaw,

    #[error("expression depth exceeds maximum of {0}")]
    TooDeep(usize),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),
}

/// A value was rejected by the schema.
#[derive(Debug, Error)]
#[error("invalid value for '{field}': {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("unknown field: {0}")]
    Unknown(String),

    #[error("field not present: {0}")]
    NotPresent(String),
}

/// Optimistic-concurrency failure: the stored revision moved since this
/// instance was read.
#[derive(Debug, Error)]
#[error(
    "document {key} in '{table}' is out of sync: held revision {expected}, stored {}",
    actual.as_deref().unwrap_or("<none>")
)]
pub struct ConflictError {
    pub table: String,
    pub key: String,
    pub expected: String,
    pub actual: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot {0} a document with no primary key")]
    MissingPrimaryKey(&'static str),

    #[error("{0} affected no records")]
    NoRowsAffected(&'static str),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed revision: {0}")]
    InvalidRevision(String),

    #[error("unexpected backend result: {0}")]
    UnexpectedOutcome(String),

    #[error("backend error ({code:?}): {message}")]
    Backend { code: ErrorCode, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
