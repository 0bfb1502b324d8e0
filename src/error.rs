//! Domain error taxonomy shared by the store, ledger and reconciliation engine.
//!
//! Every variant maps onto one IPC error code so handlers can bubble errors up
//! with `?` and convert once at the edge.

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExamError {
    /// No workspace database has been opened yet.
    #[error("select a workspace first")]
    NoWorkspace,

    /// A referenced record does not exist.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// Malformed or out-of-domain input. The caller can correct it.
    #[error("{0}")]
    Validation(String),

    /// The acting user is not allowed to perform the operation.
    #[error("{message}")]
    Forbidden {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The record is in a state that does not allow the operation.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type ExamResult<T> = Result<T, ExamError>;

impl ExamError {
    pub fn not_found(entity: &'static str) -> Self {
        ExamError::NotFound { entity }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ExamError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ExamError::Forbidden {
            message: message.into(),
            details: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ExamError::Conflict(message.into())
    }

    /// IPC error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ExamError::NoWorkspace => "no_workspace",
            ExamError::NotFound { .. } => "not_found",
            ExamError::Validation(_) => "bad_params",
            ExamError::Forbidden { .. } => "forbidden",
            ExamError::Conflict(_) => "conflict",
            ExamError::Db(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ExamError::NotFound { entity } => Some(json!({ "entity": entity })),
            ExamError::Forbidden { details, .. } => details.clone(),
            _ => None,
        }
    }
}

/// Maps a unique-constraint violation onto `Conflict`, leaving other
/// database errors untouched.
pub fn conflict_on_unique(e: rusqlite::Error, message: &str) -> ExamError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            ExamError::conflict(message)
        }
        _ => ExamError::Db(e),
    }
}
