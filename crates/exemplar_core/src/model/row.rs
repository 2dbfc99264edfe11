//! Typed access to stored rows by attribute path.
//!
//! # Responsibility
//! - Let `Entity::from_row` read values by attribute path (`name`,
//!   `address.street`, `city`) instead of physical column names.
//!
//! # Invariants
//! - Paths are resolved through the registry's flattened column table.
//! - To-one attributes read back as their foreign-key value.

use crate::model::value::Scalar;
use crate::schema::ColumnBinding;
use rusqlite::types::ValueRef;
use rusqlite::Row;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error raised while rebuilding an entity from a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDecodeError {
    /// Attribute path is not part of the entity's column table.
    UnknownPath(String),
    /// Column is mapped but absent from the result set.
    MissingColumn { column: String },
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    /// Required value stored as NULL.
    UnexpectedNull { column: String },
    Custom { message: String },
}

impl Display for RowDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPath(path) => write!(f, "unknown attribute path `{path}`"),
            Self::MissingColumn { column } => write!(f, "missing column `{column}`"),
            Self::TypeMismatch {
                column,
                expected,
                actual,
            } => write!(
                f,
                "column `{column}` type mismatch: expected {expected}, got {actual}"
            ),
            Self::UnexpectedNull { column } => write!(f, "column `{column}` is null"),
            Self::Custom { message } => write!(f, "{message}"),
        }
    }
}

impl Error for RowDecodeError {}

/// Row view keyed by attribute path.
pub struct EntityRow<'r, 'stmt> {
    row: &'r Row<'stmt>,
    columns: &'r [ColumnBinding],
}

impl<'r, 'stmt> EntityRow<'r, 'stmt> {
    pub(crate) fn new(row: &'r Row<'stmt>, columns: &'r [ColumnBinding]) -> Self {
        Self { row, columns }
    }

    fn column(&self, path: &str) -> Result<&'r str, RowDecodeError> {
        self.columns
            .iter()
            .find(|binding| binding.path == path)
            .map(|binding| binding.column.as_str())
            .ok_or_else(|| RowDecodeError::UnknownPath(path.to_string()))
    }

    fn value_ref(&self, path: &str) -> Result<(&'r str, ValueRef<'_>), RowDecodeError> {
        let column = self.column(path)?;
        let value = self
            .row
            .get_ref(column)
            .map_err(|_| RowDecodeError::MissingColumn {
                column: column.to_string(),
            })?;
        Ok((column, value))
    }

    pub fn opt_integer(&self, path: &str) -> Result<Option<i64>, RowDecodeError> {
        match self.value_ref(path)? {
            (_, ValueRef::Null) => Ok(None),
            (_, ValueRef::Integer(value)) => Ok(Some(value)),
            (column, other) => Err(mismatch(column, "integer", other)),
        }
    }

    pub fn integer(&self, path: &str) -> Result<i64, RowDecodeError> {
        self.opt_integer(path)?.ok_or_else(|| self.null_error(path))
    }

    pub fn opt_real(&self, path: &str) -> Result<Option<f64>, RowDecodeError> {
        match self.value_ref(path)? {
            (_, ValueRef::Null) => Ok(None),
            (_, ValueRef::Real(value)) => Ok(Some(value)),
            // SQLite stores whole reals in REAL columns as integers on some paths.
            (_, ValueRef::Integer(value)) => Ok(Some(value as f64)),
            (column, other) => Err(mismatch(column, "real", other)),
        }
    }

    pub fn real(&self, path: &str) -> Result<f64, RowDecodeError> {
        self.opt_real(path)?.ok_or_else(|| self.null_error(path))
    }

    pub fn opt_text(&self, path: &str) -> Result<Option<String>, RowDecodeError> {
        match self.value_ref(path)? {
            (_, ValueRef::Null) => Ok(None),
            (column, ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
                .map(|text| Some(text.to_string()))
                .map_err(|_| RowDecodeError::Custom {
                    message: format!("column `{column}` holds invalid UTF-8"),
                }),
            (column, other) => Err(mismatch(column, "text", other)),
        }
    }

    pub fn text(&self, path: &str) -> Result<String, RowDecodeError> {
        self.opt_text(path)?.ok_or_else(|| self.null_error(path))
    }

    pub fn opt_bool(&self, path: &str) -> Result<Option<bool>, RowDecodeError> {
        match self.value_ref(path)? {
            (_, ValueRef::Null) => Ok(None),
            (_, ValueRef::Integer(0)) => Ok(Some(false)),
            (_, ValueRef::Integer(1)) => Ok(Some(true)),
            (column, ValueRef::Integer(other)) => Err(RowDecodeError::Custom {
                message: format!("invalid bool value `{other}` in column `{column}`"),
            }),
            (column, other) => Err(mismatch(column, "bool", other)),
        }
    }

    pub fn bool(&self, path: &str) -> Result<bool, RowDecodeError> {
        self.opt_bool(path)?.ok_or_else(|| self.null_error(path))
    }

    /// Reads any value without a declared type.
    pub fn scalar(&self, path: &str) -> Result<Option<Scalar>, RowDecodeError> {
        let (column, value) = self.value_ref(path)?;
        scalar_from_ref(column, value)
    }

    fn null_error(&self, path: &str) -> RowDecodeError {
        RowDecodeError::UnexpectedNull {
            column: self.column(path).unwrap_or(path).to_string(),
        }
    }
}

pub(crate) fn scalar_from_ref(
    column: &str,
    value: ValueRef<'_>,
) -> Result<Option<Scalar>, RowDecodeError> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(value) => Ok(Some(Scalar::Integer(value))),
        ValueRef::Real(value) => Ok(Some(Scalar::Real(value))),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|text| Some(Scalar::Text(text.to_string())))
            .map_err(|_| RowDecodeError::Custom {
                message: format!("column `{column}` holds invalid UTF-8"),
            }),
        other @ ValueRef::Blob(_) => Err(mismatch(column, "scalar", other)),
    }
}

fn mismatch(column: &str, expected: &'static str, actual: ValueRef<'_>) -> RowDecodeError {
    RowDecodeError::TypeMismatch {
        column: column.to_string(),
        expected,
        actual: match actual {
            ValueRef::Null => "null",
            ValueRef::Integer(_) => "integer",
            ValueRef::Real(_) => "real",
            ValueRef::Text(_) => "text",
            ValueRef::Blob(_) => "blob",
        },
    }
}
