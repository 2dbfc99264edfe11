//! Error taxonomy for compilation, reads and guarded writes.
//!
//! # Invariants
//! - Write failures distinguish "no transaction" (`NoActiveTransaction`),
//!   "storage rejected the write" (`ConstraintViolation`, `NotFound`) and
//!   "batch failed" (`BatchAborted`).
//! - Introspection skips are diagnostics, never errors.

use crate::db::DbError;
use crate::model::row::RowDecodeError;
use crate::schema::SchemaError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Schema(SchemaError),
    /// A write was attempted while no transaction could be active.
    NoActiveTransaction,
    /// First item-level failure of a batch write; the whole batch was rolled
    /// back. `index` is zero-based.
    BatchAborted { index: usize, cause: Box<RepoError> },
    /// Storage rejected a write (unique, foreign key, not-null, check).
    ConstraintViolation {
        entity: Option<&'static str>,
        source: rusqlite::Error,
    },
    NotFound { entity: &'static str, id: String },
    /// Update/delete target carries no identity value.
    MissingIdentity(&'static str),
    /// Page size must be positive.
    InvalidPageSize(u32),
    UnknownAttribute { entity: &'static str, path: String },
    /// Type is not registered as a table-backed entity.
    UnregisteredEntity(&'static str),
    /// Accessor failure on a write path, where skipping is not allowed.
    AttributeAccess {
        entity: &'static str,
        path: String,
        message: String,
    },
    Decode(RowDecodeError),
    /// The connection is inside a unit of work owned by another session.
    ForeignTransaction,
    SessionClosed,
    DeadlineExceeded,
    Cancelled,
}

impl RepoError {
    /// Classifies a storage error raised while writing `entity`.
    pub(crate) fn from_storage(err: rusqlite::Error, entity: &'static str) -> Self {
        match Self::from(err) {
            Self::ConstraintViolation { source, .. } => Self::ConstraintViolation {
                entity: Some(entity),
                source,
            },
            other => other,
        }
    }

    pub(crate) fn batch_aborted(index: usize, cause: RepoError) -> Self {
        Self::BatchAborted {
            index,
            cause: Box::new(cause),
        }
    }

    /// Stable short code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Db(_) => "db_error",
            Self::Schema(_) => "schema_error",
            Self::NoActiveTransaction => "no_active_transaction",
            Self::BatchAborted { .. } => "batch_aborted",
            Self::ConstraintViolation { .. } => "constraint_violation",
            Self::NotFound { .. } => "not_found",
            Self::MissingIdentity(_) => "missing_identity",
            Self::InvalidPageSize(_) => "invalid_page_size",
            Self::UnknownAttribute { .. } => "unknown_attribute",
            Self::UnregisteredEntity(_) => "unregistered_entity",
            Self::AttributeAccess { .. } => "attribute_access",
            Self::Decode(_) => "decode_error",
            Self::ForeignTransaction => "foreign_transaction",
            Self::SessionClosed => "session_closed",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::NoActiveTransaction => write!(f, "no active transaction"),
            Self::BatchAborted { index, cause } => {
                write!(f, "batch aborted at item {index}: {cause}")
            }
            Self::ConstraintViolation {
                entity: Some(entity),
                source,
            } => write!(f, "constraint violation on `{entity}`: {source}"),
            Self::ConstraintViolation {
                entity: None,
                source,
            } => write!(f, "constraint violation: {source}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::MissingIdentity(entity) => write!(f, "{entity} has no identity value"),
            Self::InvalidPageSize(size) => {
                write!(f, "page size must be positive, got {size}")
            }
            Self::UnknownAttribute { entity, path } => {
                write!(f, "unknown attribute path `{path}` on `{entity}`")
            }
            Self::UnregisteredEntity(name) => write!(f, "`{name}` is not a registered entity"),
            Self::AttributeAccess {
                entity,
                path,
                message,
            } => write!(f, "cannot read `{entity}.{path}`: {message}"),
            Self::Decode(err) => write!(f, "{err}"),
            Self::ForeignTransaction => {
                write!(f, "connection is inside a unit of work owned by another session")
            }
            Self::SessionClosed => write!(f, "session is closed"),
            Self::DeadlineExceeded => write!(f, "session deadline exceeded"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::BatchAborted { cause, .. } => Some(cause.as_ref()),
            Self::ConstraintViolation { source, .. } => Some(source),
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<SchemaError> for RepoError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<RowDecodeError> for RepoError {
    fn from(value: RowDecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation {
                entity: None,
                source: value,
            },
            Some(ErrorCode::OperationInterrupted) => Self::Cancelled,
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}
