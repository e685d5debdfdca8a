use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    db::DbPool,
    dto::collections::{
        CollectionList, CollectionWithProducts, CreateCollectionRequest, UpdateCollectionRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Collection,
    response::ApiResponse,
    services::product_service::{self, ProductRow},
};

#[derive(FromRow)]
struct CollectionRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    image: Option<String>,
    display_order: i32,
    created_at: DateTime<Utc>,
}

async fn member_ids(pool: &DbPool, collection_id: Uuid) -> AppResult<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT product_id FROM collection_products WHERE collection_id = $1")
            .bind(collection_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn collection_from_row(pool: &DbPool, row: CollectionRow) -> AppResult<Collection> {
    let product_ids = member_ids(pool, row.id).await?;
    Ok(Collection {
        id: row.id,
        name: row.name,
        slug: row.slug,
        description: row.description,
        image: row.image,
        display_order: row.display_order,
        product_ids,
        created_at: row.created_at,
    })
}

pub async fn list_collections(pool: &DbPool) -> AppResult<ApiResponse<CollectionList>> {
    let rows: Vec<CollectionRow> =
        sqlx::query_as("SELECT * FROM collections ORDER BY display_order, name")
            .fetch_all(pool)
            .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(collection_from_row(pool, row).await?);
    }
    Ok(ApiResponse::new(CollectionList { items }))
}

/// Collection detail with its member products. Members are loose references:
/// ids pointing at deleted or non-ACTIVE products are skipped.
pub async fn get_collection_by_slug(
    pool: &DbPool,
    slug: &str,
) -> AppResult<ApiResponse<CollectionWithProducts>> {
    let row: Option<CollectionRow> = sqlx::query_as("SELECT * FROM collections WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    let row = match row {
        Some(c) => c,
        None => return Err(AppError::not_found("Collection not found")),
    };

    let collection = collection_from_row(pool, row).await?;

    let product_rows: Vec<ProductRow> = sqlx::query_as(
        "SELECT * FROM products WHERE id = ANY($1) AND status = 'ACTIVE' ORDER BY created_at DESC",
    )
    .bind(&collection.product_ids)
    .fetch_all(pool)
    .await?;

    let products = product_service::hydrate_products(pool, product_rows).await?;

    Ok(ApiResponse::new(CollectionWithProducts {
        collection,
        products,
    }))
}

pub async fn create_collection(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateCollectionRequest,
) -> AppResult<ApiResponse<Collection>> {
    ensure_admin(user)?;

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM collections WHERE slug = $1")
        .bind(payload.slug.as_str())
        .fetch_optional(pool)
        .await?;
    if exist.is_some() {
        return Err(AppError::BadRequest("Slug is already taken".to_string()));
    }

    let id = Uuid::new_v4();
    let mut txn = pool.begin().await?;

    let row: CollectionRow = sqlx::query_as(
        r#"
        INSERT INTO collections (id, name, slug, description, image, display_order)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.name)
    .bind(payload.slug)
    .bind(payload.description)
    .bind(payload.image)
    .bind(payload.display_order)
    .fetch_one(&mut *txn)
    .await?;

    for product_id in &payload.product_ids {
        sqlx::query(
            "INSERT INTO collection_products (collection_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(product_id)
        .execute(&mut *txn)
        .await?;
    }

    txn.commit().await?;

    audit::record(
        pool,
        user.user_id,
        AuditAction::CollectionCreate,
        serde_json::json!({ "collection_id": id }),
    )
    .await;

    let collection = collection_from_row(pool, row).await?;
    Ok(ApiResponse::new(collection))
}

pub async fn update_collection(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCollectionRequest,
) -> AppResult<ApiResponse<Collection>> {
    ensure_admin(user)?;

    let existing: Option<CollectionRow> = sqlx::query_as("SELECT * FROM collections WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::not_found("Collection not found")),
    };

    let slug = payload.slug.unwrap_or(existing.slug);
    let clash: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM collections WHERE slug = $1 AND id <> $2")
            .bind(slug.as_str())
            .bind(id)
            .fetch_optional(pool)
            .await?;
    if clash.is_some() {
        return Err(AppError::BadRequest("Slug is already taken".to_string()));
    }

    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.or(existing.description);
    let image = payload.image.or(existing.image);
    let display_order = payload.display_order.unwrap_or(existing.display_order);

    let mut txn = pool.begin().await?;

    let row: CollectionRow = sqlx::query_as(
        r#"
        UPDATE collections
        SET name = $2, slug = $3, description = $4, image = $5, display_order = $6
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(slug)
    .bind(description)
    .bind(image)
    .bind(display_order)
    .fetch_one(&mut *txn)
    .await?;

    if let Some(product_ids) = &payload.product_ids {
        sqlx::query("DELETE FROM collection_products WHERE collection_id = $1")
            .bind(id)
            .execute(&mut *txn)
            .await?;
        for product_id in product_ids {
            sqlx::query(
                "INSERT INTO collection_products (collection_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(product_id)
            .execute(&mut *txn)
            .await?;
        }
    }

    txn.commit().await?;

    audit::record(
        pool,
        user.user_id,
        AuditAction::CollectionUpdate,
        serde_json::json!({ "collection_id": id }),
    )
    .await;

    let collection = collection_from_row(pool, row).await?;
    Ok(ApiResponse::new(collection))
}

/// Deleting a collection removes the grouping only; member products survive.
pub async fn delete_collection(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = sqlx::query("DELETE FROM collections WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Collection not found"));
    }

    audit::record(
        pool,
        user.user_id,
        AuditAction::CollectionDelete,
        serde_json::json!({ "collection_id": id }),
    )
    .await;

    Ok(ApiResponse::new(serde_json::json!({})))
}
