use serde::Deserialize;
use utoipa::ToSchema;

use crate::{dto::inventory::InventoryFilter, models::OrderStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Upper bound on page numbers; keeps the computed OFFSET far from overflow.
const MAX_PAGE: i64 = 1_000_000;

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    /// Substring match on the product name.
    pub q: Option<String>,
    /// Restrict to members of this collection slug.
    pub collection: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryQuery {
    pub filter: Option<InventoryFilter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let p = Pagination {
            page: None,
            per_page: None,
        };
        assert_eq!(p.normalize(), (1, 20, 0));
    }

    #[test]
    fn per_page_is_clamped() {
        let p = Pagination {
            page: Some(2),
            per_page: Some(1000),
        };
        assert_eq!(p.normalize(), (2, 100, 100));
    }

    #[test]
    fn hostile_page_values_cannot_overflow_the_offset() {
        let p = Pagination {
            page: Some(i64::MAX),
            per_page: Some(100),
        };
        let (page, per_page, offset) = p.normalize();
        assert_eq!(page, MAX_PAGE);
        assert_eq!(offset, (MAX_PAGE - 1) * per_page);
        assert!(offset >= 0);

        let p = Pagination {
            page: Some(i64::MIN),
            per_page: Some(10),
        };
        assert_eq!(p.normalize(), (1, 10, 0));
    }
}
