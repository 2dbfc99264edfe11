//! Execution of rendered read statements.
//!
//! # Invariants
//! - Every read goes through `Session::prepare_read`, so staged writes of the
//!   same session are visible and foreign units of work are refused.

use crate::model::row::{scalar_from_ref, EntityRow};
use crate::model::value::{Entity, Scalar};
use crate::query::compiler::QueryPlan;
use crate::query::sql::{render, Projection};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::session::Session;
use crate::schema::SchemaRegistry;
use rusqlite::params_from_iter;

pub(crate) fn fetch_entities<T: Entity>(
    session: &mut Session<'_>,
    registry: &SchemaRegistry,
    plan: &QueryPlan,
) -> RepoResult<Vec<T>> {
    let mapping = registry
        .get(plan.entity())
        .ok_or(RepoError::UnregisteredEntity(plan.entity()))?;
    let statement = render(registry, plan, Projection::Rows)?;

    let conn = session.prepare_read()?;
    let mut stmt = conn.prepare_cached(&statement.sql)?;
    let mut rows = stmt.query(params_from_iter(statement.params.iter()))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        session.checkpoint()?;
        items.push(T::from_row(&EntityRow::new(row, mapping.columns()))?);
    }
    Ok(items)
}

pub(crate) fn fetch_value(
    session: &mut Session<'_>,
    registry: &SchemaRegistry,
    plan: &QueryPlan,
    projection: Projection<'_>,
) -> RepoResult<Option<Scalar>> {
    let statement = render(registry, plan, projection)?;
    let conn = session.prepare_read()?;
    let mut stmt = conn.prepare_cached(&statement.sql)?;
    let mut rows = stmt.query(params_from_iter(statement.params.iter()))?;
    match rows.next()? {
        Some(row) => Ok(scalar_from_ref("projection", row.get_ref(0)?)?),
        None => Ok(None),
    }
}

pub(crate) fn fetch_count(
    session: &mut Session<'_>,
    registry: &SchemaRegistry,
    plan: &QueryPlan,
) -> RepoResult<u64> {
    match fetch_value(session, registry, plan, Projection::Count)? {
        Some(Scalar::Integer(count)) => Ok(u64::try_from(count).unwrap_or(0)),
        _ => Ok(0),
    }
}
