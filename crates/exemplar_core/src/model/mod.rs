//! Values and mapping contracts shared by queries and writes.
//!
//! # Responsibility
//! - Define the scalar value model and the `Mapped`/`Entity` traits that
//!   application types implement.
//! - Decode stored rows by attribute path.

pub mod row;
pub mod value;
