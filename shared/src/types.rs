//! Common types used across the platform

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on page size for list endpoints
pub const MAX_PER_PAGE: u32 = 100;

/// A string that does not name any variant of a status enum
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// A status change that the lifecycle rules forbid
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} a {entity} that is {from}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub action: &'static str,
}

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    /// Build from optional query parameters, clamping to sane bounds
    pub fn from_query(page: Option<u32>, per_page: Option<u32>) -> Self {
        let defaults = Self::default();
        Self {
            page: page.unwrap_or(defaults.page).max(1),
            per_page: per_page
                .unwrap_or(defaults.per_page)
                .clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: &Pagination, total_items: i64) -> Self {
        let total_items = total_items.max(0) as u64;
        let per_page = u64::from(pagination.per_page.max(1));
        let total_pages = total_items.div_ceil(per_page) as u32;
        Self {
            data,
            pagination: PaginationMeta {
                page: pagination.page,
                per_page: pagination.per_page,
                total_items,
                total_pages,
            },
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

/// Date range for queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: chrono::NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Parse an `ordering` query value against a whitelist.
///
/// `-field` sorts descending. Returns the column and direction, or `None`
/// when the field is not in `allowed`.
pub fn parse_ordering<'a>(ordering: &str, allowed: &[&'a str]) -> Option<(&'a str, &'static str)> {
    let (field, direction) = match ordering.strip_prefix('-') {
        Some(rest) => (rest, "DESC"),
        None => (ordering, "ASC"),
    };
    allowed
        .iter()
        .find(|candidate| **candidate == field)
        .map(|column| (*column, direction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::from_query(Some(0), Some(1000));
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, MAX_PER_PAGE);
        assert_eq!(p.offset(), 0);

        let p = Pagination::from_query(Some(3), Some(25));
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn test_paginated_response_total_pages() {
        let p = Pagination::from_query(Some(1), Some(20));
        let resp = PaginatedResponse::new(vec![1, 2, 3], &p, 41);
        assert_eq!(resp.pagination.total_pages, 3);
        assert_eq!(resp.pagination.total_items, 41);

        let empty: PaginatedResponse<i32> = PaginatedResponse::new(vec![], &p, 0);
        assert_eq!(empty.pagination.total_pages, 0);
    }

    #[test]
    fn test_parse_ordering() {
        let allowed = ["created_at", "name"];
        assert_eq!(parse_ordering("name", &allowed), Some(("name", "ASC")));
        assert_eq!(parse_ordering("-created_at", &allowed), Some(("created_at", "DESC")));
        assert_eq!(parse_ordering("password_hash", &allowed), None);
        assert_eq!(parse_ordering("-; DROP TABLE users", &allowed), None);
    }
}
