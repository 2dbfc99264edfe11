//! SQLite connection bootstrap.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the persistence layer.
//!
//! # Invariants
//! - Bootstrap failures are fatal for the caller (configuration failure).
//! - Schema creation and migration are owned by the application, not by this
//!   crate; `schema::verify_schema` checks the result.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;

pub use open::{open_db, open_db_in_memory, open_db_with_config, register_functions};
pub(crate) use open::FOLD_FUNCTION;

pub type DbResult<T> = Result<T, DbError>;

/// Storage-level failure, including connection bootstrap.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Store configuration rejected before any connection was attempted.
    InvalidConfig(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidConfig(message) => write!(f, "invalid store configuration: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidConfig(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
