use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Product, ProductStatus};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    pub url: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantInput {
    pub size: String,
    pub color: String,
    pub stock: i32,
    #[serde(rename = "variantSKU")]
    pub variant_sku: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub material: Option<String>,
    pub rating: Option<f64>,
    pub sku: String,
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub images: Vec<ImageInput>,
    #[serde(default)]
    pub variants: Vec<VariantInput>,
}

/// Partial update; `images`/`variants` replace the child rows wholesale
/// when present.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub sale_price: Option<i64>,
    pub material: Option<String>,
    pub rating: Option<f64>,
    pub sku: Option<String>,
    pub status: Option<ProductStatus>,
    pub images: Option<Vec<ImageInput>>,
    pub variants: Option<Vec<VariantInput>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}
