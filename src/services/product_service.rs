use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    db::DbPool,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest, VariantInput},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, ProductImage, ProductStatus, ProductVariant},
    response::{ApiResponse, Meta},
    routes::params::ProductQuery,
};

#[derive(FromRow)]
pub(crate) struct ProductRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub material: Option<String>,
    pub rating: f64,
    pub sku: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ImageRow {
    id: Uuid,
    product_id: Uuid,
    url: String,
    alt: String,
    display_order: i32,
}

#[derive(FromRow)]
struct VariantRow {
    id: Uuid,
    product_id: Uuid,
    size: String,
    color: String,
    stock: i32,
    variant_sku: String,
}

pub async fn list_products(
    pool: &DbPool,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let collection_id = match query.collection.as_deref().filter(|s| !s.is_empty()) {
        Some(slug) => {
            let found: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM collections WHERE slug = $1")
                    .bind(slug)
                    .fetch_optional(pool)
                    .await?;
            match found {
                Some((id,)) => Some(id),
                None => return Err(AppError::not_found("Collection not found")),
            }
        }
        None => None,
    };

    let q = query.q.as_deref().filter(|s| !s.is_empty());

    let rows: Vec<ProductRow> = sqlx::query_as(
        r#"
        SELECT * FROM products
        WHERE status = 'ACTIVE'
          AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
          AND ($2::uuid IS NULL OR id IN
               (SELECT product_id FROM collection_products WHERE collection_id = $2))
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(q)
    .bind(collection_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT count(*) FROM products
        WHERE status = 'ACTIVE'
          AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
          AND ($2::uuid IS NULL OR id IN
               (SELECT product_id FROM collection_products WHERE collection_id = $2))
        "#,
    )
    .bind(q)
    .bind(collection_id)
    .fetch_one(pool)
    .await?;

    let items = hydrate_products(pool, rows).await?;
    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::paginated(ProductList { items }, meta))
}

pub async fn get_product_by_slug(pool: &DbPool, slug: &str) -> AppResult<ApiResponse<Product>> {
    let row: Option<ProductRow> = sqlx::query_as("SELECT * FROM products WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    let row = match row {
        Some(r) => r,
        None => return Err(AppError::not_found("Product not found")),
    };

    let mut products = hydrate_products(pool, vec![row]).await?;
    Ok(ApiResponse::new(products.remove(0)))
}

pub async fn create_product(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_pricing(payload.price, payload.sale_price, payload.rating)?;
    validate_variant_skus(&payload.variants)?;

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE slug = $1")
        .bind(payload.slug.as_str())
        .fetch_optional(pool)
        .await?;
    if exist.is_some() {
        return Err(AppError::BadRequest("Slug is already taken".to_string()));
    }

    let id = Uuid::new_v4();
    let status = payload.status.unwrap_or(ProductStatus::Draft);

    let mut txn = pool.begin().await?;

    let row: ProductRow = sqlx::query_as(
        r#"
        INSERT INTO products
            (id, name, slug, description, price, sale_price, material, rating, sku, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.name)
    .bind(payload.slug)
    .bind(payload.description)
    .bind(payload.price)
    .bind(payload.sale_price)
    .bind(payload.material)
    .bind(payload.rating.unwrap_or(0.0))
    .bind(payload.sku)
    .bind(status.as_str())
    .fetch_one(&mut *txn)
    .await?;

    for image in &payload.images {
        sqlx::query(
            "INSERT INTO product_images (id, product_id, url, alt, display_order) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(&image.url)
        .bind(&image.alt)
        .bind(image.display_order)
        .execute(&mut *txn)
        .await?;
    }

    for variant in &payload.variants {
        if variant.stock < 0 {
            return Err(AppError::BadRequest("stock cannot be negative".into()));
        }
        sqlx::query(
            "INSERT INTO product_variants (id, product_id, size, color, stock, variant_sku) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(&variant.size)
        .bind(&variant.color)
        .bind(variant.stock)
        .bind(&variant.variant_sku)
        .execute(&mut *txn)
        .await?;
    }

    txn.commit().await?;

    audit::record(
        pool,
        user.user_id,
        AuditAction::ProductCreate,
        serde_json::json!({ "product_id": id }),
    )
    .await;

    let mut products = hydrate_products(pool, vec![row]).await?;
    Ok(ApiResponse::new(products.remove(0)))
}

pub async fn update_product(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if let Some(variants) = &payload.variants {
        validate_variant_skus(variants)?;
    }

    let existing: Option<ProductRow> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::not_found("Product not found")),
    };

    let slug = payload.slug.unwrap_or(existing.slug);
    if !slug.is_empty() {
        let clash: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM products WHERE slug = $1 AND id <> $2")
                .bind(slug.as_str())
                .bind(id)
                .fetch_optional(pool)
                .await?;
        if clash.is_some() {
            return Err(AppError::BadRequest("Slug is already taken".to_string()));
        }
    }

    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.or(existing.description);
    let price = payload.price.unwrap_or(existing.price);
    let sale_price = payload.sale_price.or(existing.sale_price);
    let material = payload.material.or(existing.material);
    let rating = payload.rating.unwrap_or(existing.rating);
    let sku = payload.sku.unwrap_or(existing.sku);
    let status = match payload.status {
        Some(s) => s,
        None => ProductStatus::parse(&existing.status)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown product status")))?,
    };
    validate_pricing(price, sale_price, Some(rating))?;

    let mut txn = pool.begin().await?;

    let row: ProductRow = sqlx::query_as(
        r#"
        UPDATE products
        SET name = $2, slug = $3, description = $4, price = $5, sale_price = $6,
            material = $7, rating = $8, sku = $9, status = $10, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(slug)
    .bind(description)
    .bind(price)
    .bind(sale_price)
    .bind(material)
    .bind(rating)
    .bind(sku)
    .bind(status.as_str())
    .fetch_one(&mut *txn)
    .await?;

    if let Some(images) = &payload.images {
        sqlx::query("DELETE FROM product_images WHERE product_id = $1")
            .bind(id)
            .execute(&mut *txn)
            .await?;
        for image in images {
            sqlx::query(
                "INSERT INTO product_images (id, product_id, url, alt, display_order) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(&image.url)
            .bind(&image.alt)
            .bind(image.display_order)
            .execute(&mut *txn)
            .await?;
        }
    }

    if let Some(variants) = &payload.variants {
        sqlx::query("DELETE FROM product_variants WHERE product_id = $1")
            .bind(id)
            .execute(&mut *txn)
            .await?;
        for variant in variants {
            if variant.stock < 0 {
                return Err(AppError::BadRequest("stock cannot be negative".into()));
            }
            sqlx::query(
                "INSERT INTO product_variants (id, product_id, size, color, stock, variant_sku) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(&variant.size)
            .bind(&variant.color)
            .bind(variant.stock)
            .bind(&variant.variant_sku)
            .execute(&mut *txn)
            .await?;
        }
    }

    txn.commit().await?;

    audit::record(
        pool,
        user.user_id,
        AuditAction::ProductUpdate,
        serde_json::json!({ "product_id": id }),
    )
    .await;

    let mut products = hydrate_products(pool, vec![row]).await?;
    Ok(ApiResponse::new(products.remove(0)))
}

pub async fn delete_product(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Product not found"));
    }

    audit::record(
        pool,
        user.user_id,
        AuditAction::ProductDelete,
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::new(serde_json::json!({})))
}

fn validate_pricing(price: i64, sale_price: Option<i64>, rating: Option<f64>) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::BadRequest("price cannot be negative".into()));
    }
    if sale_price.is_some_and(|p| p < 0) {
        return Err(AppError::BadRequest("salePrice cannot be negative".into()));
    }
    if rating.is_some_and(|r| !(0.0..=5.0).contains(&r)) {
        return Err(AppError::BadRequest("rating must be between 0 and 5".into()));
    }
    Ok(())
}

fn validate_variant_skus(variants: &[VariantInput]) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for variant in variants {
        if !seen.insert(variant.variant_sku.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Duplicate variant SKU {}",
                variant.variant_sku
            )));
        }
    }
    Ok(())
}

/// Attach images and variants to a batch of product rows in two queries.
pub(crate) async fn hydrate_products(
    pool: &DbPool,
    rows: Vec<ProductRow>,
) -> AppResult<Vec<Product>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let image_rows: Vec<ImageRow> = sqlx::query_as(
        "SELECT * FROM product_images WHERE product_id = ANY($1) ORDER BY display_order",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let variant_rows: Vec<VariantRow> = sqlx::query_as(
        "SELECT * FROM product_variants WHERE product_id = ANY($1) ORDER BY variant_sku",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut images: HashMap<Uuid, Vec<ProductImage>> = HashMap::new();
    for row in image_rows {
        images.entry(row.product_id).or_default().push(ProductImage {
            id: row.id,
            url: row.url,
            alt: row.alt,
            display_order: row.display_order,
        });
    }

    let mut variants: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
    for row in variant_rows {
        variants
            .entry(row.product_id)
            .or_default()
            .push(ProductVariant {
                id: row.id,
                size: row.size,
                color: row.color,
                stock: row.stock,
                variant_sku: row.variant_sku,
            });
    }

    rows.into_iter()
        .map(|row| {
            let status = ProductStatus::parse(&row.status).ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("unknown product status {}", row.status))
            })?;
            Ok(Product {
                id: row.id,
                name: row.name,
                slug: row.slug,
                description: row.description,
                price: row.price,
                sale_price: row.sale_price,
                material: row.material,
                rating: row.rating,
                sku: row.sku,
                status,
                images: images.remove(&row.id).unwrap_or_default(),
                variants: variants.remove(&row.id).unwrap_or_default(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .collect()
}
