//! Generic CRUD orchestration for one entity type.
//!
//! # Responsibility
//! - Expose single and batch writes wrapped in the session's transaction
//!   guard.
//! - Expose query-by-example reads, pagination and aggregate projections.
//!
//! # Invariants
//! - Writes either commit completely or leave no trace; batch failures name
//!   the zero-based item that failed.
//! - Reads observe the session's own staged writes.
//! - The orchestrator holds no state besides the registry borrow; every call
//!   takes the session explicitly.

use crate::model::value::{Entity, Mapped, Scalar};
use crate::query::compiler::{compile, Condition, MatchMode, Operator, QueryPlan, Window};
use crate::query::paginate::{clamp_offset, Page, PageRequest};
use crate::query::sql::Projection;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::read::{fetch_count, fetch_entities, fetch_value};
use crate::repo::session::{PendingWrite, Session};
use crate::repo::write::{
    delete_write, identity_value, insert_write, render_value, update_write, upsert_write,
};
use crate::schema::{EntityMapping, SchemaRegistry};
use log::{debug, warn};
use rusqlite::types::Value;
use std::marker::PhantomData;

type BuildWrite =
    fn(&SchemaRegistry, &EntityMapping, &dyn Mapped) -> RepoResult<PendingWrite>;

/// Persistence operations for entity type `T`.
pub struct CrudOrchestrator<'r, T: Entity> {
    registry: &'r SchemaRegistry,
    mapping: &'r EntityMapping,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for CrudOrchestrator<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Entity> Copy for CrudOrchestrator<'_, T> {}

impl<'r, T: Entity> CrudOrchestrator<'r, T> {
    /// # Errors
    /// - `UnregisteredEntity` when `T::NAME` is not a table-backed entity.
    pub fn new(registry: &'r SchemaRegistry) -> RepoResult<Self> {
        let mapping = registry
            .get(T::NAME)
            .filter(|mapping| mapping.table().is_some() && mapping.identity().is_some())
            .ok_or(RepoError::UnregisteredEntity(T::NAME))?;
        Ok(Self {
            registry,
            mapping,
            _entity: PhantomData,
        })
    }

    pub fn mapping(&self) -> &'r EntityMapping {
        self.mapping
    }

    pub fn insert(&self, session: &mut Session<'_>, entity: &T) -> RepoResult<bool> {
        self.write_one(session, "insert", entity, insert_write)
    }

    pub fn insert_all(&self, session: &mut Session<'_>, entities: &[T]) -> RepoResult<bool> {
        self.write_all(session, "insert_all", entities, insert_write)
    }

    /// Inserts `entity` and returns it as stored, generated identity included.
    pub fn insert_returning(&self, session: &mut Session<'_>, entity: &T) -> RepoResult<T> {
        session.guarded("insert_returning", |session| {
            let write = insert_write(self.registry, self.mapping, entity)?;
            let rowid = session.execute_now(write)?;
            let id = match identity_value(self.registry, self.mapping, entity)? {
                Some(value) => value,
                None => Value::Integer(rowid),
            };
            let rendered = render_value(&id);
            let id = value_to_scalar(id).ok_or_else(|| self.not_found(&rendered))?;
            self.find_by_id(session, id)?
                .ok_or_else(|| self.not_found(&rendered))
        })
    }

    /// Inserts when the identity is unset, otherwise inserts or updates the
    /// row with that identity.
    pub fn insert_or_update(&self, session: &mut Session<'_>, entity: &T) -> RepoResult<bool> {
        self.write_one(session, "insert_or_update", entity, upsert_write)
    }

    pub fn insert_or_update_all(
        &self,
        session: &mut Session<'_>,
        entities: &[T],
    ) -> RepoResult<bool> {
        self.write_all(session, "insert_or_update_all", entities, upsert_write)
    }

    /// # Errors
    /// - `MissingIdentity` for an unsaved entity, `NotFound` when no row has
    ///   its identity.
    pub fn update(&self, session: &mut Session<'_>, entity: &T) -> RepoResult<bool> {
        self.write_one(session, "update", entity, update_write)
    }

    pub fn update_all(&self, session: &mut Session<'_>, entities: &[T]) -> RepoResult<bool> {
        self.write_all(session, "update_all", entities, update_write)
    }

    pub fn delete(&self, session: &mut Session<'_>, entity: &T) -> RepoResult<bool> {
        self.write_one(session, "delete", entity, delete_write)
    }

    pub fn delete_all(&self, session: &mut Session<'_>, entities: &[T]) -> RepoResult<bool> {
        self.write_all(session, "delete_all", entities, delete_write)
    }

    fn write_one(
        &self,
        session: &mut Session<'_>,
        operation: &'static str,
        entity: &T,
        build: BuildWrite,
    ) -> RepoResult<bool> {
        session.guarded(operation, |session| {
            session.stage(build(self.registry, self.mapping, entity)?);
            Ok(true)
        })
    }

    fn write_all(
        &self,
        session: &mut Session<'_>,
        operation: &'static str,
        entities: &[T],
        build: BuildWrite,
    ) -> RepoResult<bool> {
        session.guarded(operation, |session| {
            for (index, entity) in entities.iter().enumerate() {
                let mut write = build(self.registry, self.mapping, entity)
                    .map_err(|err| RepoError::batch_aborted(index, err))?;
                write.item = Some(index);
                session.stage(write);
            }
            debug!(
                "event=batch_staged module=repo status=ok entity={} op={} items={}",
                T::NAME,
                operation,
                entities.len()
            );
            Ok(true)
        })
    }

    /// Compiles `filter` without executing it.
    pub fn compile(&self, filter: &T, mode: MatchMode) -> RepoResult<QueryPlan> {
        compile(self.registry, filter, mode)
    }

    /// First entity matching `filter`. Several matches are logged, not
    /// rejected.
    pub fn find(
        &self,
        session: &mut Session<'_>,
        filter: &T,
        mode: MatchMode,
    ) -> RepoResult<Option<T>> {
        let plan = self.compile(filter, mode)?.with_window(Some(Window {
            offset: 0,
            limit: 2,
        }));
        let mut items = fetch_entities::<T>(session, self.registry, &plan)?;
        if items.len() > 1 {
            warn!(
                "event=find_ambiguous module=repo status=ok entity={} conditions={}",
                T::NAME,
                plan.conditions().len()
            );
        }
        Ok((!items.is_empty()).then(|| items.swap_remove(0)))
    }

    pub fn find_list(
        &self,
        session: &mut Session<'_>,
        filter: &T,
        mode: MatchMode,
    ) -> RepoResult<Vec<T>> {
        let plan = self.compile(filter, mode)?;
        fetch_entities(session, self.registry, &plan)
    }

    /// One page of the entities matching `filter`.
    ///
    /// # Errors
    /// - `InvalidPageSize` for a zero page size, before any storage access.
    pub fn find_paginate(
        &self,
        session: &mut Session<'_>,
        filter: &T,
        request: &PageRequest,
    ) -> RepoResult<Page<T>> {
        request.validate()?;
        let plan = self
            .compile(filter, request.match_mode)?
            .with_sort(request.sort.clone());
        let total_row_count = fetch_count(session, self.registry, &plan)?;
        let offset = clamp_offset(request.offset, request.page_size, total_row_count);

        let plan = plan.with_window(Some(Window {
            offset,
            limit: request.page_size,
        }));
        let items = fetch_entities(session, self.registry, &plan)?;
        debug!(
            "event=find_paginate module=repo status=ok entity={} total={} offset={} served={}",
            T::NAME,
            total_row_count,
            offset,
            items.len()
        );
        Ok(Page {
            items,
            total_row_count,
            offset,
        })
    }

    /// Number of entities matching `filter` in pattern mode.
    pub fn count(&self, session: &mut Session<'_>, filter: &T) -> RepoResult<u64> {
        let plan = self.compile(filter, MatchMode::Pattern)?;
        fetch_count(session, self.registry, &plan)
    }

    /// Largest `field` value among entities matching `filter`.
    pub fn get_max(
        &self,
        session: &mut Session<'_>,
        filter: &T,
        field: &str,
    ) -> RepoResult<Option<Scalar>> {
        let plan = self.compile(filter, MatchMode::Pattern)?;
        fetch_value(session, self.registry, &plan, Projection::Max(field))
    }

    /// Smallest `field` value among entities matching `filter`.
    pub fn get_min(
        &self,
        session: &mut Session<'_>,
        filter: &T,
        field: &str,
    ) -> RepoResult<Option<Scalar>> {
        let plan = self.compile(filter, MatchMode::Pattern)?;
        fetch_value(session, self.registry, &plan, Projection::Min(field))
    }

    /// Looks an entity up by identity, bypassing filter compilation.
    pub fn find_by_id(
        &self,
        session: &mut Session<'_>,
        id: impl Into<Scalar>,
    ) -> RepoResult<Option<T>> {
        let identity = self
            .mapping
            .identity()
            .ok_or(RepoError::MissingIdentity(T::NAME))?;
        let plan = QueryPlan::for_entity(T::NAME)
            .with_condition(Condition {
                path: identity.name.to_string(),
                operator: Operator::Eq,
                value: id.into(),
            })
            .with_window(Some(Window {
                offset: 0,
                limit: 1,
            }));
        Ok(fetch_entities(session, self.registry, &plan)?.into_iter().next())
    }

    fn not_found(&self, id: &str) -> RepoError {
        RepoError::NotFound {
            entity: T::NAME,
            id: id.to_string(),
        }
    }
}

fn value_to_scalar(value: Value) -> Option<Scalar> {
    match value {
        Value::Integer(value) => Some(Scalar::Integer(value)),
        Value::Real(value) => Some(Scalar::Real(value)),
        Value::Text(value) => Some(Scalar::Text(value)),
        Value::Null | Value::Blob(_) => None,
    }
}
