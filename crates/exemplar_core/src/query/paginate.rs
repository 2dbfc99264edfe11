//! Page requests and offset clamping.
//!
//! # Invariants
//! - `page_size` is positive.
//! - A served page never holds more than `page_size` items.
//! - An offset past the end steps back by whole pages until it is not past
//!   the total, floored at zero.

use crate::query::compiler::{MatchMode, SortTerm};
use crate::repo::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u64,
    pub page_size: u32,
    #[serde(default)]
    pub sort: Option<SortTerm>,
    #[serde(default)]
    pub match_mode: MatchMode,
}

impl PageRequest {
    pub fn new(offset: u64, page_size: u32) -> Self {
        Self {
            offset,
            page_size,
            sort: None,
            match_mode: MatchMode::default(),
        }
    }

    pub fn sorted_by(mut self, sort: SortTerm) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_match_mode(mut self, match_mode: MatchMode) -> Self {
        self.match_mode = match_mode;
        self
    }

    /// # Errors
    /// - `InvalidPageSize` when `page_size` is zero.
    pub fn validate(&self) -> RepoResult<()> {
        if self.page_size == 0 {
            return Err(RepoError::InvalidPageSize(self.page_size));
        }
        Ok(())
    }
}

/// One served page and the total it was cut from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_row_count: u64,
    /// Offset actually served after clamping.
    pub offset: u64,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Steps `offset` back by whole pages while it exceeds `total`.
///
/// Equivalent to `while offset > total { offset -= page_size }`, floored at
/// zero, without looping.
pub fn clamp_offset(offset: u64, page_size: u32, total: u64) -> u64 {
    if offset <= total || page_size == 0 {
        return offset.min(total);
    }
    let page_size = u64::from(page_size);
    let steps = (offset - total).div_ceil(page_size);
    offset.saturating_sub(steps.saturating_mul(page_size))
}
