//! Query-by-example compilation.
//!
//! # Responsibility
//! - Introspect filter objects, apply restriction rules, bind join aliases
//!   and render SQL.
//!
//! # Invariants
//! - Compilation is pure; nothing here touches a connection.

pub mod alias;
pub mod compiler;
pub mod introspect;
pub mod paginate;
pub mod restriction;
pub mod sql;

pub use alias::{AliasBinding, AliasResolver};
pub use compiler::{compile, Condition, MatchMode, Operator, QueryPlan, SortDirection, SortTerm, Window};
pub use introspect::{introspect, Introspection, IntrospectionSkip, SkipReason};
pub use paginate::{Page, PageRequest};
pub use restriction::{Restriction, RestrictionSet};
