//! Restriction inclusion rules.
//!
//! # Responsibility
//! - Decide which introspected values become restrictions.
//!
//! # Invariants
//! - Key-like attributes (identity, to-one, to-many) restrict only with a
//!   non-zero integer. Zero means "unset".
//! - Regular attributes restrict only with a non-numeric value. Numeric
//!   regular attributes never restrict; callers filtering on a number must
//!   sort or use `find_by_id` instead.
//! - Paths are unique; the first value added for a path wins.

use crate::model::value::Scalar;
use crate::schema::{AttributeDescriptor, AttributeKind};
use std::collections::HashSet;

/// Candidate equality/pattern restriction on one attribute path.
#[derive(Debug, Clone, PartialEq)]
pub struct Restriction {
    pub path: String,
    pub value: Scalar,
    pub key_like: bool,
}

/// Ordered, append-only set of restrictions keyed by path.
#[derive(Debug, Clone, Default)]
pub struct RestrictionSet {
    restrictions: Vec<Restriction>,
    paths: HashSet<String>,
}

impl RestrictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` at `path` when the inclusion rules admit it.
    ///
    /// Returns `true` when a restriction was added.
    pub fn add(&mut self, attribute: &AttributeDescriptor, path: impl Into<String>, value: Scalar) -> bool {
        let key_like = attribute.kind.is_key_like();
        if !admits(attribute.kind, &value) {
            return false;
        }
        let path = path.into();
        if !self.paths.insert(path.clone()) {
            return false;
        }
        self.restrictions.push(Restriction {
            path,
            value,
            key_like,
        });
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.restrictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restrictions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Restriction> {
        self.restrictions.iter()
    }

    pub fn into_vec(self) -> Vec<Restriction> {
        self.restrictions
    }
}

fn admits(kind: AttributeKind, value: &Scalar) -> bool {
    if kind.is_key_like() {
        return matches!(value.as_integer(), Some(id) if id != 0);
    }
    // FIXME: numeric regular attributes never restrict while numeric keys do.
    // Kept for compatibility with existing callers; likely a defect.
    !value.is_numeric()
}
