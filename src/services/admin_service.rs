use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::inventory::{InventoryFilter, InventoryList, InventoryRow},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::ProductStatus,
    response::ApiResponse,
    stock::StockStatus,
};

#[derive(FromRow)]
struct FlatVariantRow {
    product_id: Uuid,
    product_name: String,
    product_status: String,
    variant_sku: String,
    size: String,
    color: String,
    stock: i32,
}

/// Flatten every variant of every product into one row, classify each by
/// stock level and optionally filter on the derived status.
pub async fn inventory(
    pool: &DbPool,
    user: &AuthUser,
    filter: Option<InventoryFilter>,
) -> AppResult<ApiResponse<InventoryList>> {
    ensure_admin(user)?;

    let rows: Vec<FlatVariantRow> = sqlx::query_as(
        r#"
        SELECT p.id AS product_id, p.name AS product_name, p.status AS product_status,
               v.variant_sku, v.size, v.color, v.stock
        FROM products p
        JOIN product_variants v ON v.product_id = p.id
        ORDER BY p.name, v.variant_sku
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let product_status = ProductStatus::parse(&row.product_status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown product status {}",
                row.product_status
            ))
        })?;
        let derived_status = StockStatus::classify(row.stock);

        let keep = match filter {
            Some(InventoryFilter::LowStock) => derived_status == StockStatus::LowStock,
            Some(InventoryFilter::OutOfStock) => derived_status == StockStatus::OutOfStock,
            None => true,
        };
        if !keep {
            continue;
        }

        items.push(InventoryRow {
            product_id: row.product_id,
            product_name: row.product_name,
            product_status,
            variant_sku: row.variant_sku,
            size: row.size,
            color: row.color,
            stock: row.stock,
            derived_status,
        });
    }

    Ok(ApiResponse::new(InventoryList { items }))
}
