use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemSortBy {
    CreatedAt,
    Price,
    Name,
}

impl ItemSortBy {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ItemSortBy::CreatedAt => "created_at",
            ItemSortBy::Price => "price",
            ItemSortBy::Name => "name",
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub sort_by: Option<ItemSortBy>,
    pub sort_order: Option<SortOrder>,
    /// Admin only; non-admin callers always get active items.
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub status: Option<String>,
    pub sort_order: Option<SortOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let default = Pagination {
            page: None,
            per_page: None,
        };
        assert_eq!(default.normalize(), (1, 20, 0));

        let oversized = Pagination {
            page: Some(3),
            per_page: Some(1000),
        };
        assert_eq!(oversized.normalize(), (3, 100, 200));

        let negative = Pagination {
            page: Some(-2),
            per_page: Some(0),
        };
        assert_eq!(negative.normalize(), (1, 1, 0));
    }
}
