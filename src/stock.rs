//! Stock admission policy, applied at cart-add, cart-update, cart-merge and
//! order creation. The same rule everywhere: a requested total may never
//! exceed the variant's current stock.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Variants with fewer units than this are flagged low in the inventory view.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// Admit `requested` units against `stock`, naming the variant on rejection.
/// `requested` is the resulting total for the line, not the increment.
pub fn check(variant_sku: &str, requested: i32, stock: i32) -> AppResult<()> {
    if requested > stock {
        return Err(AppError::InsufficientStock(variant_sku.to_string()));
    }
    Ok(())
}

/// Cap a requested quantity at the available stock; used by cart merge,
/// which silently clamps instead of rejecting.
pub fn cap(requested: i32, stock: i32) -> i32 {
    requested.min(stock)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn classify(stock: i32) -> Self {
        if stock == 0 {
            StockStatus::OutOfStock
        } else if stock < LOW_STOCK_THRESHOLD {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_stock() {
        assert!(check("SKU-RED-M", 2, 2).is_ok());
        assert!(check("SKU-RED-M", 0, 0).is_ok());
    }

    #[test]
    fn rejects_over_stock_naming_the_sku() {
        let err = check("SKU-RED-M", 3, 2).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock for variant SKU-RED-M");
    }

    #[test]
    fn cap_clamps_to_available() {
        assert_eq!(cap(10, 3), 3);
        assert_eq!(cap(2, 3), 2);
        assert_eq!(cap(5, 0), 0);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(StockStatus::classify(0), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(3), StockStatus::LowStock);
        assert_eq!(StockStatus::classify(4), StockStatus::LowStock);
        // Exactly at the threshold counts as in stock.
        assert_eq!(StockStatus::classify(5), StockStatus::InStock);
    }
}
