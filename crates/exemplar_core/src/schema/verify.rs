//! Registry verification against a live connection.
//!
//! # Responsibility
//! - Confirm every registered table and flattened column exists before any
//!   query is compiled against it.

use super::{AttributeKind, SchemaError, SchemaRegistry};
use log::{error, info};
use rusqlite::Connection;
use std::collections::HashSet;

/// Checks that the connected database has every table and column the
/// registry maps, including the `mapped_by` columns of to-many relations.
pub fn verify_schema(conn: &Connection, registry: &SchemaRegistry) -> Result<(), SchemaError> {
    let result = verify_all(conn, registry);
    match &result {
        Ok(()) => info!(
            "event=schema_verify module=schema status=ok entities={}",
            registry.entities().len()
        ),
        Err(err) => error!(
            "event=schema_verify module=schema status=error error={}",
            err
        ),
    }
    result
}

fn verify_all(conn: &Connection, registry: &SchemaRegistry) -> Result<(), SchemaError> {
    // Tables first, so a missing table is never reported as a missing column.
    for mapping in registry.entities() {
        let Some(table) = mapping.table() else {
            continue;
        };
        if !table_exists(conn, table)? {
            return Err(SchemaError::MissingTable {
                entity: mapping.name(),
                table,
            });
        }
    }

    for mapping in registry.entities() {
        let Some(table) = mapping.table() else {
            continue;
        };
        let existing = table_columns(conn, table)?;
        for binding in mapping.columns() {
            if !existing.contains(&binding.column.to_ascii_lowercase()) {
                return Err(SchemaError::MissingColumn {
                    table,
                    column: binding.column.clone(),
                });
            }
        }

        for attribute in mapping.attributes() {
            let AttributeKind::ToMany { target, mapped_by } = attribute.kind else {
                continue;
            };
            let Some(target_table) = registry.get(target).and_then(|target| target.table()) else {
                continue;
            };
            if !table_columns(conn, target_table)?.contains(&mapped_by.to_ascii_lowercase()) {
                return Err(SchemaError::MissingColumn {
                    table: target_table,
                    column: mapped_by.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, SchemaError> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, SchemaError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\");"))?;
    let mut rows = stmt.query([])?;
    let mut columns = HashSet::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        columns.insert(name.to_ascii_lowercase());
    }
    Ok(columns)
}
