use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{models::ProductStatus, stock::StockStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InventoryFilter {
    LowStock,
    OutOfStock,
}

/// One flattened row per product variant.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRow {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_status: ProductStatus,
    #[serde(rename = "variantSKU")]
    pub variant_sku: String,
    pub size: String,
    pub color: String,
    pub stock: i32,
    pub derived_status: StockStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryList {
    pub items: Vec<InventoryRow>,
}
