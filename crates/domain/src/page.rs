//! Pagination for list operations.

use serde::{Deserialize, Serialize};
use store::DocumentQuery;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Requested page, one-based. Missing values fall back to defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Adds offset and limit to a query.
    pub fn apply(&self, query: DocumentQuery) -> DocumentQuery {
        query
            .offset((self.page() - 1) * self.limit())
            .limit(self.limit())
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub page: usize,
    pub limit: usize,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total: u64, data: Vec<T>) -> Self {
        Self {
            total,
            page: request.page(),
            limit: request.limit(),
            data,
        }
    }

    /// Number of items on this page.
    pub fn results(&self) -> usize {
        self.data.len()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            page: self.page,
            limit: self.limit,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let request = PageRequest::default();
        assert_eq!((request.page(), request.limit()), (1, DEFAULT_LIMIT));

        let request = PageRequest::new(0, 1000);
        assert_eq!((request.page(), request.limit()), (1, MAX_LIMIT));
    }

    #[test]
    fn apply_sets_offset() {
        let query = PageRequest::new(3, 10).apply(DocumentQuery::new());
        assert_eq!(query.offset, Some(20));
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn map_keeps_counts() {
        let page = Page::new(PageRequest::default(), 7, vec![1, 2]).map(|n| n * 10);
        assert_eq!(page.data, vec![10, 20]);
        assert_eq!((page.total, page.results()), (7, 2));
    }
}
