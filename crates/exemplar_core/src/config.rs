//! Store configuration.
//!
//! # Responsibility
//! - Describe how the storage connection is opened and how sessions begin
//!   their transactions.
//!
//! # Invariants
//! - `path = None` means an in-memory database.
//! - A zero busy timeout is rejected; writers must wait on locks.

use crate::db::{DbError, DbResult};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite locking mode used when a session begins its unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    Deferred,
    /// Takes the write lock at `BEGIN`, so writers fail fast instead of
    /// deadlocking on lock upgrade.
    #[default]
    Immediate,
    Exclusive,
}

impl TransactionMode {
    pub(crate) fn behavior(self) -> TransactionBehavior {
        match self {
            Self::Deferred => TransactionBehavior::Deferred,
            Self::Immediate => TransactionBehavior::Immediate,
            Self::Exclusive => TransactionBehavior::Exclusive,
        }
    }
}

/// Connection and session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file. `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
    pub transaction_mode: TransactionMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
            transaction_mode: TransactionMode::default(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// # Errors
    /// - Returns `DbError::InvalidConfig` for a zero busy timeout or an empty
    ///   path.
    pub fn validate(&self) -> DbResult<()> {
        if self.busy_timeout_ms == 0 {
            return Err(DbError::InvalidConfig(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err(DbError::InvalidConfig(
                    "path cannot be empty; omit it for an in-memory store".to_string(),
                ));
            }
        }
        Ok(())
    }
}
