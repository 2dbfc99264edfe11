//! Attribute values and the mapping contract for filter objects.
//!
//! # Responsibility
//! - Define the scalar values that may appear in restrictions and rows.
//! - Define `Mapped`, the accessor contract every filter object implements.
//!
//! # Invariants
//! - Only `Integer` and `Real` are numeric.
//! - `Timestamp` is epoch milliseconds and is not numeric for filtering.

use crate::model::row::{EntityRow, RowDecodeError};
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Scalar value read from a filter object or a stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    /// Unix epoch milliseconds.
    Timestamp(i64),
}

impl Scalar {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Real(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Text values that are empty count as "not populated".
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Bool(_) => "bool",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub(crate) fn to_sql_value(&self) -> Value {
        match self {
            Self::Integer(value) | Self::Timestamp(value) => Value::Integer(*value),
            Self::Real(value) => Value::Real(*value),
            Self::Text(value) => Value::Text(value.clone()),
            Self::Bool(value) => Value::Integer(i64::from(*value)),
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) | Self::Timestamp(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.to_sql_value()))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Value returned by an attribute accessor.
///
/// Nested values borrow from the owning object, so one introspection pass never
/// clones whole object graphs.
#[derive(Clone, Copy)]
pub enum AttrValue<'a> {
    Null,
    Scalar(&'a Scalar),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Timestamp(i64),
    Text(&'a str),
    /// Structured value stored inline with its owner.
    Embedded(&'a dyn Mapped),
    /// Related entity with its own identity.
    Entity(&'a dyn Mapped),
    /// To-many collection; carries only its size.
    Collection(usize),
}

impl AttrValue<'_> {
    /// Converts plain values into an owned scalar. Nested and null values
    /// return `None`.
    pub fn to_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Scalar(value) => Some((*value).clone()),
            Self::Integer(value) => Some(Scalar::Integer(*value)),
            Self::Real(value) => Some(Scalar::Real(*value)),
            Self::Bool(value) => Some(Scalar::Bool(*value)),
            Self::Timestamp(value) => Some(Scalar::Timestamp(*value)),
            Self::Text(value) => Some(Scalar::Text((*value).to_string())),
            Self::Null | Self::Embedded(_) | Self::Entity(_) | Self::Collection(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Scalar(value) => value.kind_name(),
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Bool(_) => "bool",
            Self::Timestamp(_) => "timestamp",
            Self::Text(_) => "text",
            Self::Embedded(_) => "embedded",
            Self::Entity(_) => "entity",
            Self::Collection(_) => "collection",
        }
    }
}

impl std::fmt::Debug for AttrValue<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded(value) => write!(f, "Embedded({})", value.type_name()),
            Self::Entity(value) => write!(f, "Entity({})", value.type_name()),
            Self::Collection(len) => write!(f, "Collection({len})"),
            other => match other.to_scalar() {
                Some(scalar) => write!(f, "{scalar:?}"),
                None => write!(f, "Null"),
            },
        }
    }
}

impl<'a> From<&'a str> for AttrValue<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for AttrValue<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

impl<'a> From<&'a Option<String>> for AttrValue<'a> {
    fn from(value: &'a Option<String>) -> Self {
        value.as_deref().map_or(Self::Null, Self::Text)
    }
}

impl From<i64> for AttrValue<'_> {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Option<i64>> for AttrValue<'_> {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Integer)
    }
}

impl From<f64> for AttrValue<'_> {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<Option<f64>> for AttrValue<'_> {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Real)
    }
}

impl From<bool> for AttrValue<'_> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Option<bool>> for AttrValue<'_> {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Null, Self::Bool)
    }
}

/// Failure to read one attribute through its accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The object exposes no accessor for this attribute.
    Missing,
    /// The accessor exists but could not produce a value.
    Failed(String),
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "no accessor"),
            Self::Failed(message) => write!(f, "accessor failed: {message}"),
        }
    }
}

impl Error for AccessError {}

/// Accessor contract for anything the schema registry knows about.
///
/// `type_name` must match the name the type was registered under.
pub trait Mapped {
    fn type_name(&self) -> &'static str;

    /// Reads one attribute by its registered name.
    fn read(&self, attribute: &str) -> Result<AttrValue<'_>, AccessError>;
}

/// Persistent entity: a mapped type that can be rebuilt from a stored row.
pub trait Entity: Mapped + Sized {
    /// Registered entity name.
    const NAME: &'static str;

    fn from_row(row: &EntityRow<'_, '_>) -> Result<Self, RowDecodeError>;
}
