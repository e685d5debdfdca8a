use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::ProductStatus;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(rename = "variantSKU")]
    pub variant_sku: String,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeCartLine {
    pub product_id: Uuid,
    #[serde(rename = "variantSKU")]
    pub variant_sku: String,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MergeCartRequest {
    pub items: Vec<MergeCartLine>,
}

/// Compact product projection embedded in hydrated cart lines.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub status: ProductStatus,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemDto {
    pub id: Uuid,
    pub product_id: Uuid,
    #[serde(rename = "variantSKU")]
    pub variant_sku: String,
    pub quantity: i32,
    /// None when the product has been deleted since the line was added.
    pub product: Option<CartProduct>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartDto {
    /// None until the user's cart row has been materialized by a mutation.
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub items: Vec<CartItemDto>,
    pub updated_at: Option<DateTime<Utc>>,
}
