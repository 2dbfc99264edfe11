//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections from a `StoreConfig`.
//! - Configure connection pragmas required by the persistence layer.
//!
//! # Invariants
//! - Returned connections honor the configured `foreign_keys` and busy
//!   timeout settings.
//! - Returned connections carry the crate's SQL functions (`exemplar_fold`).

use super::{DbError, DbResult};
use crate::config::StoreConfig;
use log::{error, info};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a SQLite database file with default settings.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with_config(&StoreConfig::file(path.as_ref()))
}

/// Opens an in-memory SQLite database with default settings.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_db_with_config(&StoreConfig::in_memory())
}

/// Opens and configures a connection as described by `config`.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
///
/// # Errors
/// - `DbError::InvalidConfig` when the config does not validate.
/// - `DbError::Sqlite` when the file cannot be opened or pragmas fail.
pub fn open_db_with_config(config: &StoreConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = if config.path.is_some() { "file" } else { "memory" };
    info!("event=db_open module=db status=start mode={mode}");

    let result = config.validate().and_then(|()| {
        let conn = match &config.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(DbError::from)?;
        bootstrap_connection(&conn, config)?;
        Ok(conn)
    });

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn bootstrap_connection(conn: &Connection, config: &StoreConfig) -> DbResult<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    register_functions(conn)?;
    Ok(())
}

/// Installs the SQL functions rendered queries rely on.
///
/// Connections from `open_db*` already have them; call this for connections
/// opened elsewhere before running pattern searches on them.
pub fn register_functions(conn: &Connection) -> DbResult<()> {
    conn.create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        fold_case,
    )?;
    Ok(())
}

/// Name of the Unicode lowercase function used by case-insensitive matching.
pub(crate) const FOLD_FUNCTION: &str = "exemplar_fold";

fn fold_case(ctx: &Context<'_>) -> rusqlite::Result<Option<String>> {
    let folded = match ctx.get_raw(0) {
        ValueRef::Null => return Ok(None),
        ValueRef::Integer(value) => value.to_string(),
        ValueRef::Real(value) => value.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).to_lowercase()
        }
    };
    Ok(Some(folded))
}
