//! Write statements built from mapped entities.
//!
//! # Responsibility
//! - Read an entity's column values along the registry's flattened column
//!   table and render INSERT, UPDATE, DELETE and upsert statements.
//!
//! # Invariants
//! - An unset identity (NULL or zero) is never written; storage assigns it.
//! - Update and delete require an identity and expect exactly one row.
//! - A related entity is stored as its identity; an unsaved one as NULL.
//! - Accessor failures are errors here; writes never skip attributes.

use crate::model::value::{AccessError, AttrValue, Mapped};
use crate::query::sql::quote;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::session::{PendingWrite, WriteOp};
use crate::schema::{AttributeKind, ColumnBinding, EntityMapping, SchemaRegistry};
use rusqlite::types::Value;

struct ColumnValue<'m> {
    binding: &'m ColumnBinding,
    value: Value,
}

pub(crate) fn insert_write(
    registry: &SchemaRegistry,
    mapping: &EntityMapping,
    entity: &dyn Mapped,
) -> RepoResult<PendingWrite> {
    let table = table_of(mapping)?;
    let values = column_values(registry, mapping, entity)?
        .into_iter()
        .filter(|column| !is_generated_unset(column))
        .collect::<Vec<_>>();

    let sql = if values.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES;", quote(table))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            quote(table),
            column_list(&values),
            placeholders(values.len())
        )
    };
    Ok(PendingWrite {
        entity: mapping.name(),
        op: WriteOp::Insert,
        sql,
        params: values.into_iter().map(|column| column.value).collect(),
        expect_change: false,
        id: None,
        item: None,
    })
}

pub(crate) fn update_write(
    registry: &SchemaRegistry,
    mapping: &EntityMapping,
    entity: &dyn Mapped,
) -> RepoResult<PendingWrite> {
    let table = table_of(mapping)?;
    let (identity, others) = split_identity(registry, mapping, entity)?;
    let id = identity.ok_or(RepoError::MissingIdentity(mapping.name()))?;

    let assignments = if others.is_empty() {
        format!("{0} = {0}", quote(&id.binding.column))
    } else {
        others
            .iter()
            .map(|column| format!("{} = ?", quote(&column.binding.column)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?;",
        quote(table),
        assignments,
        quote(&id.binding.column)
    );

    let rendered_id = render_value(&id.value);
    let mut params = others.into_iter().map(|column| column.value).collect::<Vec<_>>();
    params.push(id.value);
    Ok(PendingWrite {
        entity: mapping.name(),
        op: WriteOp::Update,
        sql,
        params,
        expect_change: true,
        id: Some(rendered_id),
        item: None,
    })
}

pub(crate) fn delete_write(
    registry: &SchemaRegistry,
    mapping: &EntityMapping,
    entity: &dyn Mapped,
) -> RepoResult<PendingWrite> {
    let table = table_of(mapping)?;
    let (identity, _) = split_identity(registry, mapping, entity)?;
    let id = identity.ok_or(RepoError::MissingIdentity(mapping.name()))?;
    Ok(PendingWrite {
        entity: mapping.name(),
        op: WriteOp::Delete,
        sql: format!(
            "DELETE FROM {} WHERE {} = ?;",
            quote(table),
            quote(&id.binding.column)
        ),
        id: Some(render_value(&id.value)),
        params: vec![id.value],
        expect_change: true,
        item: None,
    })
}

/// Insert when the identity is unset, otherwise insert-or-update on it.
pub(crate) fn upsert_write(
    registry: &SchemaRegistry,
    mapping: &EntityMapping,
    entity: &dyn Mapped,
) -> RepoResult<PendingWrite> {
    let table = table_of(mapping)?;
    let (identity, others) = split_identity(registry, mapping, entity)?;
    let Some(id) = identity else {
        let mut write = insert_write(registry, mapping, entity)?;
        write.op = WriteOp::Upsert;
        return Ok(write);
    };

    let id_column = quote(&id.binding.column);
    let conflict_action = if others.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let updates = others
            .iter()
            .map(|column| {
                let column = quote(&column.binding.column);
                format!("{column} = excluded.{column}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("DO UPDATE SET {updates}")
    };
    let columns = std::iter::once(id_column.clone())
        .chain(others.iter().map(|column| quote(&column.binding.column)))
        .collect::<Vec<_>>();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {};",
        quote(table),
        columns.join(", "),
        placeholders(columns.len()),
        id_column,
        conflict_action
    );

    let rendered_id = render_value(&id.value);
    let mut params = vec![id.value];
    params.extend(others.into_iter().map(|column| column.value));
    Ok(PendingWrite {
        entity: mapping.name(),
        op: WriteOp::Upsert,
        sql,
        params,
        expect_change: false,
        id: Some(rendered_id),
        item: None,
    })
}

/// Identity value of `entity`, or `None` when unset.
pub(crate) fn identity_value(
    registry: &SchemaRegistry,
    mapping: &EntityMapping,
    entity: &dyn Mapped,
) -> RepoResult<Option<Value>> {
    let (identity, _) = split_identity(registry, mapping, entity)?;
    Ok(identity.map(|column| column.value))
}

fn table_of(mapping: &EntityMapping) -> RepoResult<&'static str> {
    mapping
        .table()
        .ok_or(RepoError::UnregisteredEntity(mapping.name()))
}

fn split_identity<'m>(
    registry: &SchemaRegistry,
    mapping: &'m EntityMapping,
    entity: &dyn Mapped,
) -> RepoResult<(Option<ColumnValue<'m>>, Vec<ColumnValue<'m>>)> {
    let mut identity = None;
    let mut others = Vec::new();
    for column in column_values(registry, mapping, entity)? {
        if matches!(column.binding.kind, AttributeKind::Identity { .. }) {
            if !is_unset(&column.value) {
                identity = Some(column);
            }
        } else {
            others.push(column);
        }
    }
    Ok((identity, others))
}

fn column_values<'m>(
    registry: &SchemaRegistry,
    mapping: &'m EntityMapping,
    entity: &dyn Mapped,
) -> RepoResult<Vec<ColumnValue<'m>>> {
    mapping
        .columns()
        .iter()
        .map(|binding| {
            Ok(ColumnValue {
                binding,
                value: read_column(registry, mapping.name(), entity, binding)?,
            })
        })
        .collect()
}

fn read_column(
    registry: &SchemaRegistry,
    entity_name: &'static str,
    entity: &dyn Mapped,
    binding: &ColumnBinding,
) -> RepoResult<Value> {
    let access = |message: String| RepoError::AttributeAccess {
        entity: entity_name,
        path: binding.path.clone(),
        message,
    };

    let mut current = entity;
    let mut segments = binding.path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = current.read(segment).map_err(|err| match err {
            AccessError::Missing => access(format!("no accessor for `{segment}`")),
            AccessError::Failed(message) => access(message),
        })?;

        if segments.peek().is_some() {
            match value {
                AttrValue::Embedded(inner) => current = inner,
                // An absent embedded value stores NULL in all its columns.
                AttrValue::Null => return Ok(Value::Null),
                other => {
                    return Err(access(format!("expected embedded, got {}", other.kind_name())))
                }
            }
            continue;
        }

        return match (binding.kind, value) {
            (AttributeKind::ToOne { .. }, AttrValue::Entity(related)) => {
                related_identity(registry, related).map_err(access)
            }
            (AttributeKind::ToOne { .. }, other) => Ok(match other.to_scalar() {
                Some(scalar) => non_zero(scalar.to_sql_value()),
                None => Value::Null,
            }),
            (_, AttrValue::Null) => Ok(Value::Null),
            (_, other) => other
                .to_scalar()
                .map(|scalar| scalar.to_sql_value())
                .ok_or_else(|| access(format!("expected scalar, got {}", other.kind_name()))),
        };
    }
    Ok(Value::Null)
}

fn related_identity(registry: &SchemaRegistry, related: &dyn Mapped) -> Result<Value, String> {
    let identity = registry
        .get(related.type_name())
        .and_then(EntityMapping::identity)
        .ok_or_else(|| format!("related type `{}` has no identity", related.type_name()))?;
    let value = related
        .read(identity.name)
        .map_err(|err| format!("related identity unreadable: {err}"))?;
    Ok(match value.to_scalar() {
        Some(scalar) => non_zero(scalar.to_sql_value()),
        None => Value::Null,
    })
}

fn non_zero(value: Value) -> Value {
    match value {
        Value::Integer(0) => Value::Null,
        other => other,
    }
}

fn is_unset(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Integer(0))
}

fn is_generated_unset(column: &ColumnValue<'_>) -> bool {
    matches!(
        column.binding.kind,
        AttributeKind::Identity { generated: true }
    ) && is_unset(&column.value)
}

fn column_list(values: &[ColumnValue<'_>]) -> String {
    values
        .iter()
        .map(|column| quote(&column.binding.column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::Text(value) => value.clone(),
        Value::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::{delete_write, insert_write, update_write, upsert_write};
    use crate::model::value::{AccessError, AttrValue, Mapped};
    use crate::repo::error::RepoError;
    use crate::schema::{EntitySchema, SchemaRegistry};
    use rusqlite::types::Value;

    struct Label {
        id: i64,
        text: String,
    }

    impl Mapped for Label {
        fn type_name(&self) -> &'static str {
            "Label"
        }

        fn read(&self, attribute: &str) -> Result<AttrValue<'_>, AccessError> {
            match attribute {
                "id" => Ok(self.id.into()),
                "text" => Ok((&self.text).into()),
                _ => Err(AccessError::Missing),
            }
        }
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .register(
                EntitySchema::entity("Label", "label")
                    .identity("id", "id")
                    .regular("text", "text"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn unset_generated_identity_is_left_to_storage() {
        let registry = registry();
        let mapping = registry.get("Label").unwrap();
        let label = Label {
            id: 0,
            text: "red".to_string(),
        };
        let write = insert_write(&registry, mapping, &label).unwrap();
        assert_eq!(write.sql, "INSERT INTO \"label\" (\"text\") VALUES (?);");
        assert_eq!(write.params, vec![Value::Text("red".to_string())]);
    }

    #[test]
    fn update_and_delete_require_identity() {
        let registry = registry();
        let mapping = registry.get("Label").unwrap();
        let unsaved = Label {
            id: 0,
            text: "red".to_string(),
        };
        assert!(matches!(
            update_write(&registry, mapping, &unsaved),
            Err(RepoError::MissingIdentity("Label"))
        ));
        assert!(matches!(
            delete_write(&registry, mapping, &unsaved),
            Err(RepoError::MissingIdentity("Label"))
        ));

        let saved = Label {
            id: 7,
            text: "red".to_string(),
        };
        let write = update_write(&registry, mapping, &saved).unwrap();
        assert_eq!(write.sql, "UPDATE \"label\" SET \"text\" = ? WHERE \"id\" = ?;");
        assert_eq!(write.id.as_deref(), Some("7"));
    }

    #[test]
    fn upsert_targets_identity_conflicts() {
        let registry = registry();
        let mapping = registry.get("Label").unwrap();
        let saved = Label {
            id: 7,
            text: "red".to_string(),
        };
        let write = upsert_write(&registry, mapping, &saved).unwrap();
        assert_eq!(
            write.sql,
            "INSERT INTO \"label\" (\"id\", \"text\") VALUES (?, ?) \
             ON CONFLICT(\"id\") DO UPDATE SET \"text\" = excluded.\"text\";"
        );
        assert_eq!(
            write.params,
            vec![Value::Integer(7), Value::Text("red".to_string())]
        );
    }
}
