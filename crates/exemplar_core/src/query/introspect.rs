//! Filter object introspection.
//!
//! # Responsibility
//! - Walk a filter object through the schema registry and list every
//!   populated attribute as a `(path, descriptor, value)` entry.
//!
//! # Invariants
//! - Own attributes are visited before inherited ones.
//! - A failure on one attribute skips only that attribute and is recorded as
//!   a diagnostic; introspection itself never fails.
//! - Embedded values and registered related entities are walked with the same
//!   rules as the root, under a dotted prefix (`city.name`,
//!   `address.city.id`).
//! - A related entity of an unregistered type contributes its conventional
//!   `id` only.

use crate::model::value::{AccessError, AttrValue, Mapped, Scalar};
use crate::schema::{AttributeDescriptor, AttributeKind, EntityMapping, SchemaRegistry};
use log::debug;
use std::fmt::{Display, Formatter};

/// Identity accessor read on related entities of unregistered types.
const CONVENTIONAL_IDENTITY: &str = "id";

/// One populated attribute of the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrospectedValue {
    /// Dotted path from the filter root (`address.street`, `city.id`).
    pub path: String,
    /// Innermost owning attribute. For an unregistered related type this is
    /// the relation attribute.
    pub attribute: AttributeDescriptor,
    pub value: Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingAccessor,
    AccessorFailed(String),
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    UnregisteredType(&'static str),
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingAccessor => write!(f, "missing_accessor"),
            Self::AccessorFailed(_) => write!(f, "accessor_failed"),
            Self::KindMismatch { expected, actual } => {
                write!(f, "kind_mismatch expected={expected} actual={actual}")
            }
            Self::UnregisteredType(name) => write!(f, "unregistered_type type={name}"),
        }
    }
}

/// Attribute left out of the restrictions because it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionSkip {
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Introspection {
    pub entries: Vec<IntrospectedValue>,
    pub diagnostics: Vec<IntrospectionSkip>,
}

/// Lists the populated attributes of `filter`.
///
/// Null values, empty text and collections are not populated. An unregistered
/// filter type yields no entries and one diagnostic.
pub fn introspect(registry: &SchemaRegistry, filter: &dyn Mapped) -> Introspection {
    let mut out = Introspection::default();
    match registry.get(filter.type_name()) {
        Some(mapping) => walk(registry, filter, mapping, "", &mut out),
        None => skip(
            &mut out,
            String::new(),
            SkipReason::UnregisteredType(filter.type_name()),
        ),
    }
    out
}

fn walk(
    registry: &SchemaRegistry,
    object: &dyn Mapped,
    mapping: &EntityMapping,
    prefix: &str,
    out: &mut Introspection,
) {
    for attribute in mapping.attributes() {
        let path = format!("{prefix}{}", attribute.name);
        let value = match object.read(attribute.name) {
            Ok(value) => value,
            Err(AccessError::Missing) => {
                skip(out, path, SkipReason::MissingAccessor);
                continue;
            }
            Err(AccessError::Failed(message)) => {
                skip(out, path, SkipReason::AccessorFailed(message));
                continue;
            }
        };

        match (attribute.kind, value) {
            (_, AttrValue::Null | AttrValue::Collection(_)) => {}
            (AttributeKind::Embedded { .. }, AttrValue::Embedded(inner)) => {
                match registry.get(inner.type_name()) {
                    Some(inner_mapping) => {
                        walk(registry, inner, inner_mapping, &format!("{path}."), out)
                    }
                    None => skip(out, path, SkipReason::UnregisteredType(inner.type_name())),
                }
            }
            (
                AttributeKind::ToOne { .. } | AttributeKind::ToMany { .. },
                AttrValue::Entity(related),
            ) => walk_related(registry, *attribute, path, related, out),
            (AttributeKind::Embedded { .. }, other) => skip(
                out,
                path,
                SkipReason::KindMismatch {
                    expected: "embedded",
                    actual: other.kind_name(),
                },
            ),
            (_, other @ (AttrValue::Embedded(_) | AttrValue::Entity(_))) => skip(
                out,
                path,
                SkipReason::KindMismatch {
                    expected: "scalar",
                    actual: other.kind_name(),
                },
            ),
            // Scalars, including a to-one attribute read as its foreign key.
            (_, scalar) => push(out, *attribute, path, scalar),
        }
    }
}

fn walk_related(
    registry: &SchemaRegistry,
    relation: AttributeDescriptor,
    path: String,
    related: &dyn Mapped,
    out: &mut Introspection,
) {
    if let Some(target) = registry.get(related.type_name()) {
        walk(registry, related, target, &format!("{path}."), out);
        return;
    }

    // Unregistered related type: read the conventional accessor, non-zero only.
    let identity_path = format!("{path}.{CONVENTIONAL_IDENTITY}");
    match related.read(CONVENTIONAL_IDENTITY) {
        Ok(AttrValue::Integer(id)) if id != 0 => {
            push(out, relation, identity_path, AttrValue::Integer(id))
        }
        Ok(_) | Err(AccessError::Missing) => skip(
            out,
            path,
            SkipReason::UnregisteredType(related.type_name()),
        ),
        Err(AccessError::Failed(message)) => {
            skip(out, identity_path, SkipReason::AccessorFailed(message))
        }
    }
}

fn push(out: &mut Introspection, attribute: AttributeDescriptor, path: String, value: AttrValue<'_>) {
    let Some(value) = value.to_scalar() else {
        return;
    };
    if value.is_blank() {
        return;
    }
    out.entries.push(IntrospectedValue {
        path,
        attribute,
        value,
    });
}

fn skip(out: &mut Introspection, path: String, reason: SkipReason) {
    debug!(
        "event=introspection_skip module=query status=skipped path={} reason={}",
        path, reason
    );
    out.diagnostics.push(IntrospectionSkip { path, reason });
}
