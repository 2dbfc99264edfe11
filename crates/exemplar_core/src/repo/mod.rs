//! Sessions, transaction guard and CRUD orchestration.
//!
//! # Responsibility
//! - Run writes as all-or-nothing units of work over an explicit `Session`.
//! - Execute compiled query plans against SQLite.
//!
//! # Invariants
//! - No process-wide session state; every operation receives its session.
//! - Repository APIs return semantic errors (`NotFound`, `BatchAborted`) in
//!   addition to storage errors.

pub mod crud;
pub mod error;
mod read;
pub mod session;
mod write;

pub use crud::CrudOrchestrator;
pub use error::{RepoError, RepoResult};
pub use session::{CancelHandle, Session, SessionOptions};
