//! Shared response shapes for the HTTP surface.
//!
//! Error bodies are produced by `AppError`'s `IntoResponse` and carry
//! `{ "error": KIND, "message", "details"? }`. This module holds the
//! success-side shapes that repeat across endpoints.

use serde::Serialize;

use crate::store::PageOf;

/// Pagination block for list endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// `{ "data": [...], "pagination": {...} }`
#[derive(Debug, Serialize)]
pub struct ListResponse<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T: Serialize> From<PageOf<T>> for ListResponse<T> {
    fn from(page: PageOf<T>) -> Self {
        let total_pages = if page.limit == 0 {
            0
        } else {
            page.total.div_ceil(u64::from(page.limit))
        };
        Self {
            pagination: Pagination {
                page: page.page,
                limit: page.limit,
                total: page.total,
                total_pages,
            },
            data: page.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_up() {
        let page = PageOf {
            data: vec![1, 2, 3],
            page: 1,
            limit: 20,
            total: 41,
        };
        let response: ListResponse<i32> = page.into();
        assert_eq!(response.pagination.total_pages, 3);
        assert_eq!(response.data.len(), 3);
    }
}
