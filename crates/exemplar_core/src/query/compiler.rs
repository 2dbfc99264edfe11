//! Filter object to query plan compilation.
//!
//! # Responsibility
//! - Turn a filter object into conditions, join aliases and ordering.
//!
//! # Invariants
//! - The plan root is a table-backed entity.
//! - Text values use case-insensitive containment in `Pattern` mode; every
//!   other value compares by equality.
//! - Aliases cover every condition path and the sort path.

use crate::model::value::{Mapped, Scalar};
use crate::query::alias::{resolve_aliases, AliasBinding};
use crate::query::introspect::{introspect, IntrospectionSkip};
use crate::query::restriction::RestrictionSet;
use crate::repo::error::{RepoError, RepoResult};
use crate::schema::SchemaRegistry;
use log::debug;
use serde::{Deserialize, Serialize};

/// How text values of the filter are matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    /// Case-insensitive "contains" for text, equality otherwise.
    #[default]
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    ContainsIgnoreCase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub path: String,
    pub operator: Operator,
    pub value: Scalar,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortTerm {
    pub path: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortTerm {
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Row window applied to a row query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u32,
}

/// Compiled, storage-independent description of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    entity: &'static str,
    conditions: Vec<Condition>,
    aliases: Vec<AliasBinding>,
    sort: Option<SortTerm>,
    window: Option<Window>,
    diagnostics: Vec<IntrospectionSkip>,
}

impl QueryPlan {
    /// Unrestricted plan over `entity`.
    pub(crate) fn for_entity(entity: &'static str) -> Self {
        Self {
            entity,
            conditions: Vec::new(),
            aliases: Vec::new(),
            sort: None,
            window: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn aliases(&self) -> &[AliasBinding] {
        &self.aliases
    }

    pub fn sort(&self) -> Option<&SortTerm> {
        self.sort.as_ref()
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Attributes skipped during introspection.
    pub fn diagnostics(&self) -> &[IntrospectionSkip] {
        &self.diagnostics
    }

    pub fn with_sort(mut self, sort: Option<SortTerm>) -> Self {
        self.sort = sort;
        self.refresh_aliases();
        self
    }

    pub fn with_window(mut self, window: Option<Window>) -> Self {
        self.window = window;
        self
    }

    /// Adds a condition that did not come from a filter object.
    pub(crate) fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self.refresh_aliases();
        self
    }

    fn refresh_aliases(&mut self) {
        let paths = self
            .conditions
            .iter()
            .map(|condition| condition.path.as_str())
            .chain(self.sort.iter().map(|sort| sort.path.as_str()));
        self.aliases = resolve_aliases(paths);
    }
}

/// Compiles `filter` into a plan over its registered entity.
///
/// # Errors
/// - `UnregisteredEntity` when the filter type is not a table-backed entity.
pub fn compile(
    registry: &SchemaRegistry,
    filter: &dyn Mapped,
    mode: MatchMode,
) -> RepoResult<QueryPlan> {
    let entity = filter.type_name();
    if registry.get(entity).and_then(|mapping| mapping.table()).is_none() {
        return Err(RepoError::UnregisteredEntity(entity));
    }

    let introspection = introspect(registry, filter);
    let mut restrictions = RestrictionSet::new();
    for entry in introspection.entries {
        restrictions.add(&entry.attribute, entry.path, entry.value);
    }

    let conditions = restrictions
        .into_vec()
        .into_iter()
        .map(|restriction| {
            let operator = match (&restriction.value, mode) {
                (Scalar::Text(_), MatchMode::Pattern) => Operator::ContainsIgnoreCase,
                _ => Operator::Eq,
            };
            Condition {
                path: restriction.path,
                operator,
                value: restriction.value,
            }
        })
        .collect::<Vec<_>>();

    let mut plan = QueryPlan::for_entity(entity);
    plan.conditions = conditions;
    plan.diagnostics = introspection.diagnostics;
    plan.refresh_aliases();

    debug!(
        "event=query_compiled module=query status=ok entity={} conditions={} aliases={} skipped={}",
        entity,
        plan.conditions.len(),
        plan.aliases.len(),
        plan.diagnostics.len()
    );
    Ok(plan)
}
