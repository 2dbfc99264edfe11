//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise bootstrap, registration, a batch insert and a paginated
//!   pattern search against an in-memory store.
//! - Keep output deterministic for quick local sanity checks.

use exemplar_core::{
    core_version, default_log_level, init_logging, open_db_in_memory, verify_schema,
    AccessError, AttrValue, CrudOrchestrator, Entity, EntityRow, EntitySchema, Mapped,
    PageRequest, RowDecodeError, SchemaRegistry, Session, SortTerm,
};
use log::info;
use serde::Serialize;
use std::error::Error;
use std::process::ExitCode;

const SCHEMA_SQL: &str = "
CREATE TABLE contact (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE
);";

#[derive(Debug, Clone, Default, Serialize)]
struct Contact {
    id: i64,
    name: String,
    email: Option<String>,
}

impl Mapped for Contact {
    fn type_name(&self) -> &'static str {
        Self::NAME
    }

    fn read(&self, attribute: &str) -> Result<AttrValue<'_>, AccessError> {
        match attribute {
            "id" => Ok(self.id.into()),
            "name" => Ok((&self.name).into()),
            "email" => Ok((&self.email).into()),
            _ => Err(AccessError::Missing),
        }
    }
}

impl Entity for Contact {
    const NAME: &'static str = "Contact";

    fn from_row(row: &EntityRow<'_, '_>) -> Result<Self, RowDecodeError> {
        Ok(Self {
            id: row.integer("id")?,
            name: row.text("name")?,
            email: row.opt_text("email")?,
        })
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("exemplar_cli error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("EXEMPLAR_LOG_DIR") {
        init_logging(default_log_level(), &log_dir)?;
    }
    println!("exemplar_core version={}", core_version());

    let conn = open_db_in_memory()?;
    conn.execute_batch(SCHEMA_SQL)?;
    let registry = SchemaRegistry::builder()
        .register(
            EntitySchema::entity(Contact::NAME, "contact")
                .identity("id", "id")
                .regular("name", "name")
                .regular("email", "email"),
        )
        .build()?;
    verify_schema(&conn, &registry)?;

    let contacts = CrudOrchestrator::<Contact>::new(&registry)?;
    let mut session = Session::new(&conn);
    let seed = ["Ana Paula", "Bruno", "Mariana", "Carlos", "Anabela"].map(|name| Contact {
        name: name.to_string(),
        ..Contact::default()
    });
    contacts.insert_all(&mut session, &seed)?;

    let filter = Contact {
        name: "ana".to_string(),
        ..Contact::default()
    };
    let request = PageRequest::new(0, 2).sorted_by(SortTerm::asc("name"));
    let page = contacts.find_paginate(&mut session, &filter, &request)?;
    info!(
        "event=cli_smoke module=cli status=ok total={} served={}",
        page.total_row_count,
        page.len()
    );
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
