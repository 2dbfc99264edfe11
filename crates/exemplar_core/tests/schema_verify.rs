mod common;

use common::{registry, setup_db, SCHEMA_SQL};
use exemplar_core::{open_db_in_memory, verify_schema, SchemaError};

#[test]
fn matching_database_verifies() {
    let conn = setup_db();
    verify_schema(&conn, &registry()).unwrap();
}

#[test]
fn missing_table_is_reported() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE city (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
        .unwrap();
    let err = verify_schema(&conn, &registry()).unwrap_err();
    assert!(matches!(
        err,
        SchemaError::MissingTable {
            entity: "Person",
            table: "person"
        }
    ));
}

#[test]
fn missing_flattened_column_is_reported() {
    let conn = open_db_in_memory().unwrap();
    let without_embedded = SCHEMA_SQL.replace("    address_street TEXT,\n", "");
    conn.execute_batch(&without_embedded).unwrap();
    let err = verify_schema(&conn, &registry()).unwrap_err();
    assert!(matches!(
        err,
        SchemaError::MissingColumn { table: "person", ref column } if column == "address_street"
    ));
}
