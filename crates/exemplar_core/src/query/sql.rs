//! SQL rendering of query plans.
//!
//! # Responsibility
//! - Resolve plan paths to qualified columns and render one SELECT per
//!   projection with positional parameters.
//!
//! # Invariants
//! - Every identifier is registry-validated and double-quoted.
//! - Embedded prefixes resolve to inline columns of their owner; relation
//!   prefixes become `LEFT OUTER JOIN`s.
//! - Rows are ordered by the sort column, then by root identity.
//! - A to-many join makes row and count projections `DISTINCT` on the root.
//! - Case-insensitive matching folds both sides with `exemplar_fold`, so the
//!   connection must carry the crate's SQL functions.

use crate::db::FOLD_FUNCTION;
use crate::model::value::Scalar;
use crate::query::alias::{AliasBinding, AliasResolver, ROOT_ALIAS};
use crate::query::compiler::{Operator, QueryPlan, SortDirection};
use crate::repo::error::{RepoError, RepoResult};
use crate::schema::{AttributeKind, EntityMapping, SchemaRegistry};
use rusqlite::types::Value;
use std::collections::HashMap;

/// Result shape of a rendered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection<'p> {
    Rows,
    Count,
    Max(&'p str),
    Min(&'p str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

struct Scope<'r> {
    alias: String,
    mapping: &'r EntityMapping,
    column_prefix: String,
}

struct Scopes<'r> {
    registry: &'r SchemaRegistry,
    entity: &'static str,
    by_path: HashMap<String, Scope<'r>>,
    joins: Vec<String>,
    distinct: bool,
}

impl<'r> Scopes<'r> {
    fn new(registry: &'r SchemaRegistry, root: &'r EntityMapping) -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(
            String::new(),
            Scope {
                alias: ROOT_ALIAS.to_string(),
                mapping: root,
                column_prefix: String::new(),
            },
        );
        Self {
            registry,
            entity: root.name(),
            by_path,
            joins: Vec::new(),
            distinct: false,
        }
    }

    fn unknown(&self, path: &str) -> RepoError {
        RepoError::UnknownAttribute {
            entity: self.entity,
            path: path.to_string(),
        }
    }

    fn target(&self, name: &str, path: &str) -> RepoResult<&'r EntityMapping> {
        self.registry.get(name).ok_or_else(|| self.unknown(path))
    }

    fn bind(&mut self, binding: &AliasBinding) -> RepoResult<()> {
        let (parent_path, name) = split_leaf(&binding.path);
        let parent = self
            .by_path
            .get(parent_path)
            .ok_or_else(|| self.unknown(&binding.path))?;
        let attribute = *parent
            .mapping
            .attribute(name)
            .ok_or_else(|| self.unknown(&binding.path))?;

        let scope = match attribute.kind {
            AttributeKind::Embedded { target } => Scope {
                alias: parent.alias.clone(),
                mapping: self.target(target, &binding.path)?,
                column_prefix: format!("{}{}_", parent.column_prefix, attribute.column),
            },
            AttributeKind::ToOne { target } => {
                let mapping = self.target(target, &binding.path)?;
                let (table, identity) = table_and_identity(mapping)
                    .ok_or_else(|| self.unknown(&binding.path))?;
                let join = format!(
                    " LEFT OUTER JOIN {} AS {} ON {} = {}",
                    quote(table),
                    quote(&binding.alias),
                    qualified(&binding.alias, identity),
                    qualified(
                        &parent.alias,
                        &format!("{}{}", parent.column_prefix, attribute.column)
                    ),
                );
                self.joins.push(join);
                Scope {
                    alias: binding.alias.clone(),
                    mapping,
                    column_prefix: String::new(),
                }
            }
            AttributeKind::ToMany { target, mapped_by } => {
                let (_, owner_identity) = table_and_identity(parent.mapping)
                    .ok_or_else(|| self.unknown(&binding.path))?;
                let mapping = self.target(target, &binding.path)?;
                let (table, _) = table_and_identity(mapping)
                    .ok_or_else(|| self.unknown(&binding.path))?;
                let join = format!(
                    " LEFT OUTER JOIN {} AS {} ON {} = {}",
                    quote(table),
                    quote(&binding.alias),
                    qualified(&binding.alias, mapped_by),
                    qualified(&parent.alias, owner_identity),
                );
                self.joins.push(join);
                self.distinct = true;
                Scope {
                    alias: binding.alias.clone(),
                    mapping,
                    column_prefix: String::new(),
                }
            }
            AttributeKind::Identity { .. } | AttributeKind::Regular => {
                return Err(self.unknown(&binding.path))
            }
        };
        self.by_path.insert(binding.path.clone(), scope);
        Ok(())
    }

    /// Qualified column for a leaf path.
    fn column(&self, path: &str) -> RepoResult<String> {
        let (parent_path, name) = split_leaf(path);
        let scope = self.by_path.get(parent_path).ok_or_else(|| self.unknown(path))?;
        let attribute = scope.mapping.attribute(name).ok_or_else(|| self.unknown(path))?;
        match attribute.kind {
            AttributeKind::Identity { .. } | AttributeKind::Regular | AttributeKind::ToOne { .. } => {
                Ok(qualified(
                    &scope.alias,
                    &format!("{}{}", scope.column_prefix, attribute.column),
                ))
            }
            AttributeKind::ToMany { .. } | AttributeKind::Embedded { .. } => Err(self.unknown(path)),
        }
    }
}

/// Renders `plan` as one statement for `projection`.
///
/// # Errors
/// - `UnregisteredEntity` when the plan root is not table-backed.
/// - `UnknownAttribute` when a condition, sort or projection path does not
///   resolve to a column.
pub fn render(
    registry: &SchemaRegistry,
    plan: &QueryPlan,
    projection: Projection<'_>,
) -> RepoResult<SqlStatement> {
    let root = registry
        .get(plan.entity())
        .ok_or(RepoError::UnregisteredEntity(plan.entity()))?;
    let (table, identity) =
        table_and_identity(root).ok_or(RepoError::UnregisteredEntity(plan.entity()))?;

    let mut resolver = AliasResolver::new();
    for condition in plan.conditions() {
        resolver.register(&condition.path);
    }
    if let Some(sort) = plan.sort() {
        resolver.register(&sort.path);
    }
    if let Projection::Max(path) | Projection::Min(path) = projection {
        resolver.register(path);
    }

    let mut scopes = Scopes::new(registry, root);
    for binding in resolver.bindings() {
        scopes.bind(binding)?;
    }

    let mut params = Vec::new();
    let mut clauses = Vec::new();
    for condition in plan.conditions() {
        let column = scopes.column(&condition.path)?;
        match condition.operator {
            Operator::Eq => {
                clauses.push(format!("{column} = ?"));
                params.push(condition.value.to_sql_value());
            }
            Operator::ContainsIgnoreCase => {
                let text = match &condition.value {
                    Scalar::Text(text) => escape_like(text),
                    other => escape_like(&other.to_string()),
                };
                clauses.push(format!(
                    "{FOLD_FUNCTION}({column}) LIKE {FOLD_FUNCTION}(?) ESCAPE '\\'"
                ));
                params.push(Value::Text(format!("%{text}%")));
            }
        }
    }

    let root_identity = qualified(ROOT_ALIAS, identity);
    let select = match projection {
        Projection::Rows if scopes.distinct => format!("SELECT DISTINCT {}.*", quote(ROOT_ALIAS)),
        Projection::Rows => format!("SELECT {}.*", quote(ROOT_ALIAS)),
        Projection::Count if scopes.distinct => format!("SELECT COUNT(DISTINCT {root_identity})"),
        Projection::Count => "SELECT COUNT(*)".to_string(),
        Projection::Max(path) => format!("SELECT MAX({})", scopes.column(path)?),
        Projection::Min(path) => format!("SELECT MIN({})", scopes.column(path)?),
    };

    let mut sql = format!("{select} FROM {} AS {}", quote(table), quote(ROOT_ALIAS));
    for join in &scopes.joins {
        sql.push_str(join);
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if projection == Projection::Rows {
        let mut order = Vec::new();
        if let Some(sort) = plan.sort() {
            let direction = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            order.push(format!("{} {direction}", scopes.column(&sort.path)?));
        }
        order.push(format!("{root_identity} ASC"));
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        if let Some(window) = plan.window() {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(i64::from(window.limit)));
            params.push(Value::Integer(
                i64::try_from(window.offset).unwrap_or(i64::MAX),
            ));
        }
    }
    sql.push(';');

    Ok(SqlStatement { sql, params })
}

pub(crate) fn table_and_identity(mapping: &EntityMapping) -> Option<(&'static str, &'static str)> {
    Some((mapping.table()?, mapping.identity()?.column))
}

pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote(alias), quote(column))
}

fn split_leaf(path: &str) -> (&str, &str) {
    path.rsplit_once('.').unwrap_or(("", path))
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
