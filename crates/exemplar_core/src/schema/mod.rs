//! Static attribute-descriptor registry.
//!
//! # Responsibility
//! - Declare, per mapped type, which attributes are identities, relations,
//!   embedded values or regular columns.
//! - Resolve inheritance and embedded column layout once, at registration.
//!
//! # Invariants
//! - Every table-backed entity resolves exactly one identity attribute.
//! - Relation targets are table-backed entities; embedded targets are
//!   embeddables.
//! - Identifiers are plain SQL identifiers and safe to quote into statements.
//! - Attribute order is own attributes first, then each ancestor's.

mod verify;

pub use verify::verify_schema;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Role of one attribute in the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Primary key. `generated` keys are assigned by storage when unset (0/NULL).
    Identity { generated: bool },
    Regular,
    /// Foreign key column on the owner pointing at `target`'s identity.
    ToOne { target: &'static str },
    /// Children of `target` whose `mapped_by` column references the owner.
    ToMany {
        target: &'static str,
        mapped_by: &'static str,
    },
    /// Structured value stored inline as `<column>_<inner column>`.
    Embedded { target: &'static str },
}

impl AttributeKind {
    /// Identity and relation attributes follow the zero-is-unset rule.
    pub fn is_key_like(&self) -> bool {
        matches!(
            self,
            Self::Identity { .. } | Self::ToOne { .. } | Self::ToMany { .. }
        )
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, Self::ToOne { .. } | Self::ToMany { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: AttributeKind,
}

/// How a registered type is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Entity { table: &'static str },
    Embeddable,
    /// Ancestor whose attributes are stored in each subtype's table.
    Abstract,
}

/// Declaration of one mapped type.
///
/// Built fluently and handed to [`SchemaRegistryBuilder::register`]:
///
/// ```
/// use exemplar_core::schema::EntitySchema;
///
/// let city = EntitySchema::entity("City", "city")
///     .identity("id", "id")
///     .regular("name", "name");
/// assert_eq!(city.name(), "City");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    name: &'static str,
    kind: SchemaKind,
    parent: Option<&'static str>,
    attributes: Vec<AttributeDescriptor>,
}

impl EntitySchema {
    pub fn entity(name: &'static str, table: &'static str) -> Self {
        Self::with_kind(name, SchemaKind::Entity { table })
    }

    pub fn embeddable(name: &'static str) -> Self {
        Self::with_kind(name, SchemaKind::Embeddable)
    }

    pub fn abstract_base(name: &'static str) -> Self {
        Self::with_kind(name, SchemaKind::Abstract)
    }

    fn with_kind(name: &'static str, kind: SchemaKind) -> Self {
        Self {
            name,
            kind,
            parent: None,
            attributes: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn attribute(mut self, name: &'static str, column: &'static str, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescriptor { name, column, kind });
        self
    }

    /// Generated integer identity.
    pub fn identity(self, name: &'static str, column: &'static str) -> Self {
        self.attribute(name, column, AttributeKind::Identity { generated: true })
    }

    /// Identity always supplied by the caller.
    pub fn assigned_identity(self, name: &'static str, column: &'static str) -> Self {
        self.attribute(name, column, AttributeKind::Identity { generated: false })
    }

    pub fn regular(self, name: &'static str, column: &'static str) -> Self {
        self.attribute(name, column, AttributeKind::Regular)
    }

    pub fn to_one(self, name: &'static str, column: &'static str, target: &'static str) -> Self {
        self.attribute(name, column, AttributeKind::ToOne { target })
    }

    pub fn to_many(self, name: &'static str, target: &'static str, mapped_by: &'static str) -> Self {
        self.attribute(name, name, AttributeKind::ToMany { target, mapped_by })
    }

    pub fn embedded(self, name: &'static str, column: &'static str, target: &'static str) -> Self {
        self.attribute(name, column, AttributeKind::Embedded { target })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }
}

/// One physical column of an entity table, addressed by attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    /// Dotted attribute path (`name`, `address.street`, `city`).
    pub path: String,
    pub column: String,
    pub kind: AttributeKind,
}

/// A registered type with inheritance and embedded layout resolved.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    name: &'static str,
    kind: SchemaKind,
    attributes: Vec<AttributeDescriptor>,
    identity: Option<AttributeDescriptor>,
    columns: Vec<ColumnBinding>,
}

impl EntityMapping {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table(&self) -> Option<&'static str> {
        match self.kind {
            SchemaKind::Entity { table } => Some(table),
            SchemaKind::Embeddable | SchemaKind::Abstract => None,
        }
    }

    pub fn is_embeddable(&self) -> bool {
        self.kind == SchemaKind::Embeddable
    }

    /// Own attributes first, then each ancestor's.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn identity(&self) -> Option<&AttributeDescriptor> {
        self.identity.as_ref()
    }

    /// Flattened physical columns; empty for embeddables and abstract bases.
    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }
}

/// Immutable registry of mapped types. Build once at startup, share freely.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    mappings: HashMap<&'static str, EntityMapping>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&EntityMapping> {
        self.mappings.get(name)
    }

    /// Table-backed entities, sorted by name.
    pub fn entities(&self) -> Vec<&EntityMapping> {
        let mut entities = self
            .mappings
            .values()
            .filter(|mapping| mapping.table().is_some())
            .collect::<Vec<_>>();
        entities.sort_by_key(|mapping| mapping.name);
        entities
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    schemas: Vec<EntitySchema>,
}

impl SchemaRegistryBuilder {
    pub fn register(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Validates all declarations and resolves their layout.
    ///
    /// # Errors
    /// - Returns the first schema inconsistency found; nothing is registered
    ///   partially.
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        // Registration order drives every pass so the reported error is stable.
        let mut order = Vec::with_capacity(self.schemas.len());
        let mut declared: HashMap<&'static str, EntitySchema> = HashMap::new();
        for schema in self.schemas {
            validate_declaration(&schema)?;
            if declared.contains_key(schema.name) {
                return Err(SchemaError::DuplicateType(schema.name));
            }
            order.push(schema.name);
            declared.insert(schema.name, schema);
        }

        let mut resolved: HashMap<&'static str, (SchemaKind, Vec<AttributeDescriptor>)> =
            HashMap::new();
        for &name in &order {
            let schema = &declared[name];
            let attributes = collect_attributes(&declared, schema)?;
            resolved.insert(schema.name, (schema.kind, attributes));
        }

        for &name in &order {
            let (kind, attributes) = &resolved[name];
            check_relations(&resolved, name, *kind, attributes)?;
        }

        let mut mappings = HashMap::new();
        for &name in &order {
            let (kind, attributes) = &resolved[name];
            let identities = attributes
                .iter()
                .filter(|attribute| matches!(attribute.kind, AttributeKind::Identity { .. }))
                .copied()
                .collect::<Vec<_>>();
            let identity = match (kind, identities.as_slice()) {
                (SchemaKind::Entity { .. }, []) => return Err(SchemaError::MissingIdentity(name)),
                (SchemaKind::Embeddable, [_, ..]) => {
                    return Err(SchemaError::EmbeddedIdentity(name))
                }
                (_, [single]) => Some(*single),
                (_, []) => None,
                (_, [_, _, ..]) => return Err(SchemaError::MultipleIdentities(name)),
            };

            let mut columns = Vec::new();
            if matches!(kind, SchemaKind::Entity { .. }) {
                let mut visiting = vec![name];
                flatten_columns(&resolved, attributes, "", "", &mut visiting, &mut columns)?;
            }

            mappings.insert(
                name,
                EntityMapping {
                    name,
                    kind: *kind,
                    attributes: attributes.clone(),
                    identity,
                    columns,
                },
            );
        }

        Ok(SchemaRegistry { mappings })
    }
}

fn validate_declaration(schema: &EntitySchema) -> Result<(), SchemaError> {
    let invalid = |identifier: &'static str| SchemaError::InvalidIdentifier {
        entity: schema.name,
        identifier,
    };

    if !is_identifier(schema.name) {
        return Err(invalid(schema.name));
    }
    if let SchemaKind::Entity { table } = schema.kind {
        if !is_identifier(table) {
            return Err(invalid(table));
        }
    }
    for attribute in &schema.attributes {
        if !is_identifier(attribute.name) {
            return Err(invalid(attribute.name));
        }
        if !is_identifier(attribute.column) {
            return Err(invalid(attribute.column));
        }
        if let AttributeKind::ToMany { mapped_by, .. } = attribute.kind {
            if !is_identifier(mapped_by) {
                return Err(invalid(mapped_by));
            }
        }
    }
    Ok(())
}

fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

fn collect_attributes(
    declared: &HashMap<&'static str, EntitySchema>,
    schema: &EntitySchema,
) -> Result<Vec<AttributeDescriptor>, SchemaError> {
    let mut attributes: Vec<AttributeDescriptor> = Vec::new();
    let mut seen_types = HashSet::new();
    let mut current = Some(schema);

    while let Some(node) = current {
        if !seen_types.insert(node.name) {
            return Err(SchemaError::InheritanceCycle(schema.name));
        }
        for attribute in &node.attributes {
            if attributes.iter().any(|known| known.name == attribute.name) {
                return Err(SchemaError::DuplicateAttribute {
                    entity: schema.name,
                    attribute: attribute.name,
                });
            }
            attributes.push(*attribute);
        }

        current = match node.parent {
            None => None,
            Some(parent) => {
                let parent_schema =
                    declared
                        .get(parent)
                        .ok_or(SchemaError::UnknownParent {
                            entity: node.name,
                            parent,
                        })?;
                if parent_schema.kind == SchemaKind::Embeddable {
                    return Err(SchemaError::TargetKindMismatch {
                        entity: node.name,
                        attribute: "extends",
                        target: parent,
                        expected: "entity or abstract base",
                    });
                }
                Some(parent_schema)
            }
        };
    }

    Ok(attributes)
}

fn check_relations(
    resolved: &HashMap<&'static str, (SchemaKind, Vec<AttributeDescriptor>)>,
    entity: &'static str,
    kind: SchemaKind,
    attributes: &[AttributeDescriptor],
) -> Result<(), SchemaError> {
    for attribute in attributes {
        let (target, expected) = match attribute.kind {
            AttributeKind::ToOne { target } => (target, "entity"),
            AttributeKind::ToMany { target, .. } => {
                if kind == SchemaKind::Embeddable {
                    return Err(SchemaError::TargetKindMismatch {
                        entity,
                        attribute: attribute.name,
                        target,
                        expected: "to-many owner must be an entity",
                    });
                }
                (target, "entity")
            }
            AttributeKind::Embedded { target } => (target, "embeddable"),
            AttributeKind::Identity { .. } | AttributeKind::Regular => continue,
        };

        let (target_kind, _) = resolved.get(target).ok_or(SchemaError::UnknownTarget {
            entity,
            attribute: attribute.name,
            target,
        })?;
        let matches_expected = match expected {
            "embeddable" => *target_kind == SchemaKind::Embeddable,
            _ => matches!(target_kind, SchemaKind::Entity { .. }),
        };
        if !matches_expected {
            return Err(SchemaError::TargetKindMismatch {
                entity,
                attribute: attribute.name,
                target,
                expected,
            });
        }
    }
    Ok(())
}

fn flatten_columns(
    resolved: &HashMap<&'static str, (SchemaKind, Vec<AttributeDescriptor>)>,
    attributes: &[AttributeDescriptor],
    path_prefix: &str,
    column_prefix: &str,
    visiting: &mut Vec<&'static str>,
    columns: &mut Vec<ColumnBinding>,
) -> Result<(), SchemaError> {
    for attribute in attributes {
        let path = format!("{path_prefix}{}", attribute.name);
        let column = format!("{column_prefix}{}", attribute.column);
        match attribute.kind {
            AttributeKind::Identity { .. } | AttributeKind::Regular | AttributeKind::ToOne { .. } => {
                columns.push(ColumnBinding {
                    path,
                    column,
                    kind: attribute.kind,
                });
            }
            AttributeKind::ToMany { .. } => {}
            AttributeKind::Embedded { target } => {
                if visiting.contains(&target) {
                    return Err(SchemaError::EmbeddingCycle {
                        entity: visiting[0],
                        path,
                    });
                }
                let Some((_, inner)) = resolved.get(target) else {
                    return Err(SchemaError::UnknownTarget {
                        entity: visiting[0],
                        attribute: attribute.name,
                        target,
                    });
                };
                visiting.push(target);
                flatten_columns(
                    resolved,
                    inner,
                    &format!("{path}."),
                    &format!("{column}_"),
                    visiting,
                    columns,
                )?;
                visiting.pop();
            }
        }
    }
    Ok(())
}

/// Registration or verification failure of the mapping metadata.
#[derive(Debug)]
pub enum SchemaError {
    DuplicateType(&'static str),
    DuplicateAttribute {
        entity: &'static str,
        attribute: &'static str,
    },
    InvalidIdentifier {
        entity: &'static str,
        identifier: &'static str,
    },
    UnknownParent {
        entity: &'static str,
        parent: &'static str,
    },
    InheritanceCycle(&'static str),
    UnknownTarget {
        entity: &'static str,
        attribute: &'static str,
        target: &'static str,
    },
    TargetKindMismatch {
        entity: &'static str,
        attribute: &'static str,
        target: &'static str,
        expected: &'static str,
    },
    MissingIdentity(&'static str),
    MultipleIdentities(&'static str),
    EmbeddedIdentity(&'static str),
    EmbeddingCycle {
        entity: &'static str,
        path: String,
    },
    /// Registered table does not exist in the connected database.
    MissingTable {
        entity: &'static str,
        table: &'static str,
    },
    /// Registered column does not exist in its table.
    MissingColumn {
        table: &'static str,
        column: String,
    },
    Storage(rusqlite::Error),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateType(name) => write!(f, "type `{name}` registered twice"),
            Self::DuplicateAttribute { entity, attribute } => {
                write!(f, "attribute `{attribute}` declared twice in `{entity}` hierarchy")
            }
            Self::InvalidIdentifier { entity, identifier } => {
                write!(f, "invalid identifier `{identifier}` in `{entity}`")
            }
            Self::UnknownParent { entity, parent } => {
                write!(f, "`{entity}` extends unregistered type `{parent}`")
            }
            Self::InheritanceCycle(entity) => write!(f, "inheritance cycle through `{entity}`"),
            Self::UnknownTarget {
                entity,
                attribute,
                target,
            } => write!(
                f,
                "`{entity}.{attribute}` references unregistered type `{target}`"
            ),
            Self::TargetKindMismatch {
                entity,
                attribute,
                target,
                expected,
            } => write!(
                f,
                "`{entity}.{attribute}` references `{target}`, expected {expected}"
            ),
            Self::MissingIdentity(entity) => write!(f, "entity `{entity}` has no identity"),
            Self::MultipleIdentities(entity) => {
                write!(f, "`{entity}` declares more than one identity")
            }
            Self::EmbeddedIdentity(entity) => {
                write!(f, "embeddable `{entity}` cannot declare an identity")
            }
            Self::EmbeddingCycle { entity, path } => {
                write!(f, "`{entity}` embeds itself through `{path}`")
            }
            Self::MissingTable { entity, table } => {
                write!(f, "entity `{entity}` requires table `{table}`")
            }
            Self::MissingColumn { table, column } => {
                write!(f, "table `{table}` requires column `{column}`")
            }
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SchemaError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value)
    }
}
