//! Query-by-example persistence over SQLite.
//!
//! Application types describe themselves once in a [`schema::SchemaRegistry`]
//! and implement [`model::value::Mapped`]. A populated instance then doubles as
//! a search filter: every populated attribute becomes a restriction.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod schema;

pub use config::{StoreConfig, TransactionMode};
pub use db::{
    open_db, open_db_in_memory, open_db_with_config, register_functions, DbError, DbResult,
};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::row::{EntityRow, RowDecodeError};
pub use model::value::{AccessError, AttrValue, Entity, Mapped, Scalar};
pub use query::{MatchMode, Page, PageRequest, QueryPlan, SortDirection, SortTerm};
pub use repo::{CancelHandle, CrudOrchestrator, RepoError, RepoResult, Session, SessionOptions};
pub use schema::{verify_schema, EntitySchema, SchemaError, SchemaRegistry};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
