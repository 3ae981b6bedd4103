//! Query parameters shared by every list endpoint

use serde::Deserialize;
use shared::types::{parse_ordering, Pagination};

/// `page`, `per_page`, `search` and `ordering` from the query string.
///
/// Resource-specific filters are read by a second `Query` extractor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

impl ListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_query(self.page, self.per_page)
    }

    /// `ILIKE` pattern for the search term, `None` when absent or blank
    pub fn search_pattern(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }

    /// `column DIRECTION` for an ORDER BY clause.
    ///
    /// Falls back to `default` when no ordering is given or the field is not
    /// whitelisted.
    pub fn order_by(&self, allowed: &[&str], default: &str) -> String {
        self.ordering
            .as_deref()
            .and_then(|o| parse_ordering(o.trim(), allowed))
            .map(|(column, direction)| format!("{} {}", column, direction))
            .unwrap_or_else(|| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(search: Option<&str>, ordering: Option<&str>) -> ListQuery {
        ListQuery {
            search: search.map(String::from),
            ordering: ordering.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_search_pattern_escapes_wildcards() {
        assert_eq!(query(Some("dupont"), None).search_pattern().as_deref(), Some("%dupont%"));
        assert_eq!(query(Some("50%_"), None).search_pattern().as_deref(), Some("%50\\%\\_%"));
        assert_eq!(query(Some("   "), None).search_pattern(), None);
        assert_eq!(query(None, None).search_pattern(), None);
    }

    #[test]
    fn test_order_by_falls_back_to_default() {
        let allowed = ["created_at", "code"];
        assert_eq!(query(None, Some("-code")).order_by(&allowed, "created_at DESC"), "code DESC");
        assert_eq!(
            query(None, Some("password_hash")).order_by(&allowed, "created_at DESC"),
            "created_at DESC"
        );
        assert_eq!(query(None, None).order_by(&allowed, "code ASC"), "code ASC");
    }
}
