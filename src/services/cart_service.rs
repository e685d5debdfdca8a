use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    db::DbPool,
    dto::cart::{
        AddToCartRequest, CartDto, CartItemDto, CartProduct, MergeCartRequest,
        UpdateCartItemRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::ProductStatus,
    response::ApiResponse,
    stock,
};

#[derive(FromRow)]
struct CartRow {
    id: Uuid,
    updated_at: DateTime<Utc>,
}

// LEFT JOIN against products: the product columns are NULL when the product
// has been deleted since the line was added.
#[derive(FromRow)]
struct CartLineRow {
    id: Uuid,
    product_id: Uuid,
    variant_sku: String,
    quantity: i32,
    name: Option<String>,
    slug: Option<String>,
    price: Option<i64>,
    sale_price: Option<i64>,
    status: Option<String>,
}

#[derive(FromRow)]
struct VariantRef {
    stock: i32,
}

/// The caller's cart with hydrated lines. "No cart yet" is an empty shape,
/// never an error.
pub async fn get_cart(pool: &DbPool, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let cart: Option<CartRow> =
        sqlx::query_as("SELECT id, updated_at FROM carts WHERE user_id = $1")
            .bind(user.user_id)
            .fetch_optional(pool)
            .await?;

    let cart = match cart {
        Some(c) => c,
        None => {
            return Ok(ApiResponse::new(CartDto {
                id: None,
                user_id: user.user_id,
                items: Vec::new(),
                updated_at: None,
            }));
        }
    };

    let rows: Vec<CartLineRow> = sqlx::query_as(
        r#"
        SELECT ci.id, ci.product_id, ci.variant_sku, ci.quantity,
               p.name, p.slug, p.price, p.sale_price, p.status
        FROM cart_items ci
        LEFT JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.id
        "#,
    )
    .bind(cart.id)
    .fetch_all(pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|row| {
            let product = match (row.name, row.slug, row.price, row.status) {
                (Some(name), Some(slug), Some(price), Some(status)) => {
                    ProductStatus::parse(&status).map(|status| CartProduct {
                        id: row.product_id,
                        name,
                        slug,
                        price,
                        sale_price: row.sale_price,
                        status,
                    })
                }
                _ => None,
            };
            CartItemDto {
                id: row.id,
                product_id: row.product_id,
                variant_sku: row.variant_sku,
                quantity: row.quantity,
                product,
            }
        })
        .collect();

    Ok(ApiResponse::new(CartDto {
        id: Some(cart.id),
        user_id: user.user_id,
        items,
        updated_at: Some(cart.updated_at),
    }))
}

pub async fn add_item(
    pool: &DbPool,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartDto>> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let variant = resolve_active_variant(pool, payload.product_id, &payload.variant_sku).await?;

    let cart_id = ensure_cart(pool, user.user_id).await?;

    let existing: Option<(i32,)> = sqlx::query_as(
        "SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2 AND variant_sku = $3",
    )
    .bind(cart_id)
    .bind(payload.product_id)
    .bind(&payload.variant_sku)
    .fetch_optional(pool)
    .await?;

    // The check is against the resulting line total, not the increment alone.
    let new_total = existing.map(|(q,)| q).unwrap_or(0) + payload.quantity;
    stock::check(&payload.variant_sku, new_total, variant.stock)?;

    sqlx::query(
        r#"
        INSERT INTO cart_items (id, cart_id, product_id, variant_sku, quantity)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (cart_id, product_id, variant_sku)
        DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(cart_id)
    .bind(payload.product_id)
    .bind(&payload.variant_sku)
    .bind(payload.quantity)
    .execute(pool)
    .await?;

    touch_cart(pool, cart_id).await?;

    audit::record(
        pool,
        user.user_id,
        AuditAction::CartUpdate,
        serde_json::json!({
            "product_id": payload.product_id,
            "variant_sku": payload.variant_sku,
            "quantity": payload.quantity,
        }),
    )
    .await;

    get_cart(pool, user).await
}

pub async fn update_item(
    pool: &DbPool,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartDto>> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let line: Option<(Uuid, Uuid, String)> = sqlx::query_as(
        r#"
        SELECT ci.cart_id, ci.product_id, ci.variant_sku
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        WHERE ci.id = $1 AND c.user_id = $2
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .fetch_optional(pool)
    .await?;

    let (cart_id, product_id, variant_sku) = match line {
        Some(l) => l,
        None => return Err(AppError::not_found("Cart item not found")),
    };

    let variant: Option<VariantRef> = sqlx::query_as(
        "SELECT stock FROM product_variants WHERE product_id = $1 AND variant_sku = $2",
    )
    .bind(product_id)
    .bind(&variant_sku)
    .fetch_optional(pool)
    .await?;
    let variant = match variant {
        Some(v) => v,
        None => return Err(AppError::not_found("Variant not found")),
    };

    stock::check(&variant_sku, payload.quantity, variant.stock)?;

    sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
        .bind(item_id)
        .bind(payload.quantity)
        .execute(pool)
        .await?;

    touch_cart(pool, cart_id).await?;

    get_cart(pool, user).await
}

/// Idempotent: removing an unknown line just returns the unchanged cart.
pub async fn remove_item(
    pool: &DbPool,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartDto>> {
    let removed = sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.cart_id = c.id AND ci.id = $1 AND c.user_id = $2
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .execute(pool)
    .await?;

    if removed.rows_affected() > 0 {
        sqlx::query("UPDATE carts SET updated_at = now() WHERE user_id = $1")
            .bind(user.user_id)
            .execute(pool)
            .await?;

        audit::record(
            pool,
            user.user_id,
            AuditAction::CartRemove,
            serde_json::json!({ "item_id": item_id }),
        )
        .await;
    }

    get_cart(pool, user).await
}

pub async fn clear_cart(pool: &DbPool, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.cart_id = c.id AND c.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE carts SET updated_at = now() WHERE user_id = $1")
        .bind(user.user_id)
        .execute(pool)
        .await?;

    get_cart(pool, user).await
}

/// Fold the client-held anonymous cart into the server cart after login.
///
/// Best-effort per line: unknown or inactive products, unknown variants and
/// zero-stock variants are skipped without failing the merge. The client cart
/// is treated as a target state — each surviving line becomes
/// `min(max(existing, requested), stock)` — so replaying the same payload is
/// a no-op and network retries cannot double-merge.
pub async fn merge_cart(
    pool: &DbPool,
    user: &AuthUser,
    payload: MergeCartRequest,
) -> AppResult<ApiResponse<CartDto>> {
    let cart_id = ensure_cart(pool, user.user_id).await?;

    for line in &payload.items {
        if line.quantity < 1 {
            continue;
        }
        let variant = match resolve_active_variant(pool, line.product_id, &line.variant_sku).await
        {
            Ok(v) => v,
            Err(_) => continue,
        };
        if variant.stock == 0 {
            continue;
        }

        let existing: Option<(i32,)> = sqlx::query_as(
            "SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2 AND variant_sku = $3",
        )
        .bind(cart_id)
        .bind(line.product_id)
        .bind(&line.variant_sku)
        .fetch_optional(pool)
        .await?;

        let existing_qty = existing.map(|(q,)| q).unwrap_or(0);
        let target = stock::cap(existing_qty.max(line.quantity), variant.stock);
        if target == existing_qty {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, variant_sku, quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cart_id, product_id, variant_sku)
            DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(cart_id)
        .bind(line.product_id)
        .bind(&line.variant_sku)
        .bind(target)
        .execute(pool)
        .await?;
    }

    touch_cart(pool, cart_id).await?;

    audit::record(
        pool,
        user.user_id,
        AuditAction::CartMerge,
        serde_json::json!({ "lines": payload.items.len() }),
    )
    .await;

    get_cart(pool, user).await
}

async fn ensure_cart(pool: &DbPool, user_id: Uuid) -> AppResult<Uuid> {
    let (cart_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO carts (id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(cart_id)
}

async fn touch_cart(pool: &DbPool, cart_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE carts SET updated_at = now() WHERE id = $1")
        .bind(cart_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Look up a variant on an ACTIVE product; both misses are not-found errors.
async fn resolve_active_variant(
    pool: &DbPool,
    product_id: Uuid,
    variant_sku: &str,
) -> AppResult<VariantRef> {
    let product: Option<(String,)> = sqlx::query_as("SELECT status FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    match product {
        Some((status,)) if status == ProductStatus::Active.as_str() => {}
        _ => return Err(AppError::not_found("Product not found or inactive")),
    }

    let variant: Option<VariantRef> = sqlx::query_as(
        "SELECT stock FROM product_variants WHERE product_id = $1 AND variant_sku = $2",
    )
    .bind(product_id)
    .bind(variant_sku)
    .fetch_optional(pool)
    .await?;

    variant.ok_or_else(|| AppError::not_found("Variant not found"))
}
