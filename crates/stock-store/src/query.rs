//! Typed order listing filter and pagination.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::Serialize;

use crate::OrderStatus;

/// Filter for listing orders. All criteria are conjunctive; `None` means
/// "no constraint".
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Match orders whose status is any of these.
    pub statuses: Option<Vec<OrderStatus>>,
    /// Match orders placed by this user.
    pub created_by: Option<UserId>,
    /// Match orders created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn created_by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }
}

/// Limit/offset pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// One page of results plus the total row count for the filter.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> PageResult<T> {
    /// Maps the page's items, keeping the total.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}
