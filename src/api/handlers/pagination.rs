//! Response wrapper for list endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standardized paginated response wrapper for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    /// The list of items for the current page
    pub items: Vec<T>,
    /// Total number of items matching the filters (across all pages)
    pub total: i64,
    /// Applied limit
    pub limit: i64,
    /// Applied offset
    pub offset: i64,
    /// Applied sort expression, e.g. `name.asc`
    #[schema(example = "name.asc")]
    pub sort: String,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64, sort: String) -> Self {
        Self { items, total, limit, offset, sort }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, ToSchema)]
    struct TestItem {
        name: String,
    }

    #[test]
    fn test_paginated_response_serialization() {
        let resp = PaginatedResponse::new(
            vec![TestItem { name: "test".to_string() }],
            1,
            50,
            0,
            "name.asc".to_string(),
        );
        let json = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(json["items"][0]["name"], "test");
        assert_eq!(json["total"], 1);
        assert_eq!(json["limit"], 50);
        assert_eq!(json["offset"], 0);
        assert_eq!(json["sort"], "name.asc");
    }
}
