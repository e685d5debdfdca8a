use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::cart::{AddToCartRequest, MergeCartLine, MergeCartRequest, UpdateCartItemRequest},
    error::AppError,
    middleware::auth::AuthUser,
    models::Role,
    state::AppState,
};
use uuid::Uuid;

// Integration flow: add lines, hit the stock ceiling, remove twice, then fold
// in an anonymous cart and replay the merge.
#[tokio::test]
async fn cart_mutations_and_merge_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(());
            }
        };

    let state = setup_state(&database_url).await?;
    let user_id = seed_user(&state, "Shopper", "shopper@example.com", "CUSTOMER").await?;
    let user = AuthUser {
        user_id,
        role: Role::Customer,
    };

    let active = seed_product(&state, "Linen Shirt", "linen-shirt", 550000, "ACTIVE").await?;
    seed_variant(&state, active, "SHIRT-M-WHITE", "M", "White", 5).await?;
    seed_variant(&state, active, "SHIRT-L-NAVY", "L", "Navy", 0).await?;

    let draft = seed_product(&state, "Wool Beanie", "wool-beanie", 90000, "DRAFT").await?;
    seed_variant(&state, draft, "BEANIE-ONE-GREY", "ONE", "Grey", 10).await?;

    // First add creates the line.
    let cart = cart_add(&state, &user, active, "SHIRT-M-WHITE", 3).await?;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 3);

    // Same (product, variant) pair folds into the existing line.
    let cart = cart_add(&state, &user, active, "SHIRT-M-WHITE", 2).await?;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 5);

    // One more would push the line total past the stock of 5.
    let err = cart_add(&state, &user, active, "SHIRT-M-WHITE", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));

    // Draft products are invisible to the cart.
    let err = cart_add(&state, &user, draft, "BEANIE-ONE-GREY", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Absolute quantity update is checked against stock as well.
    let item_id = cart.items[0].id;
    let err = storefront_api::services::cart_service::update_item(
        &state.pool,
        &user,
        item_id,
        UpdateCartItemRequest { quantity: 6 },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));

    let resp = storefront_api::services::cart_service::update_item(
        &state.pool,
        &user,
        item_id,
        UpdateCartItemRequest { quantity: 2 },
    )
    .await?;
    assert_eq!(resp.data.items[0].quantity, 2);

    // Removing is idempotent; the second call just returns the cart.
    let resp = storefront_api::services::cart_service::remove_item(&state.pool, &user, item_id)
        .await?;
    assert!(resp.data.items.is_empty());
    let resp = storefront_api::services::cart_service::remove_item(&state.pool, &user, item_id)
        .await?;
    assert!(resp.data.items.is_empty());

    // Merge skips junk lines and caps the surviving one at stock.
    let payload = MergeCartRequest {
        items: vec![
            MergeCartLine {
                product_id: active,
                variant_sku: "SHIRT-M-WHITE".into(),
                quantity: 10,
            },
            MergeCartLine {
                product_id: active,
                variant_sku: "SHIRT-L-NAVY".into(),
                quantity: 2,
            },
            MergeCartLine {
                product_id: Uuid::new_v4(),
                variant_sku: "GHOST".into(),
                quantity: 1,
            },
            MergeCartLine {
                product_id: active,
                variant_sku: "SHIRT-M-WHITE".into(),
                quantity: 0,
            },
        ],
    };
    let resp =
        storefront_api::services::cart_service::merge_cart(&state.pool, &user, payload).await?;
    assert_eq!(resp.data.items.len(), 1);
    assert_eq!(resp.data.items[0].quantity, 5);

    // Replaying the same payload is a no-op.
    let payload = MergeCartRequest {
        items: vec![MergeCartLine {
            product_id: active,
            variant_sku: "SHIRT-M-WHITE".into(),
            quantity: 10,
        }],
    };
    let resp =
        storefront_api::services::cart_service::merge_cart(&state.pool, &user, payload).await?;
    assert_eq!(resp.data.items.len(), 1);
    assert_eq!(resp.data.items[0].quantity, 5);

    let resp = storefront_api::services::cart_service::clear_cart(&state.pool, &user).await?;
    assert!(resp.data.items.is_empty());

    Ok(())
}

async fn cart_add(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    variant_sku: &str,
    quantity: i32,
) -> Result<storefront_api::dto::cart::CartDto, AppError> {
    let resp = storefront_api::services::cart_service::add_item(
        &state.pool,
        user,
        AddToCartRequest {
            product_id,
            variant_sku: variant_sku.to_string(),
            quantity,
        },
    )
    .await?;
    Ok(resp.data)
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&pool).await?;

    // Clean tables between runs.
    sqlx::query(
        "TRUNCATE TABLE payments, order_items, orders, cart_items, carts, collection_products, collections, product_variants, product_images, products, audit_logs, users CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        shipping_fee: 250,
    };
    Ok(AppState { pool, orm, config })
}

async fn seed_user(
    state: &AppState,
    name: &str,
    email: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO users (id, name, email, role) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(role)
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

async fn seed_product(
    state: &AppState,
    name: &str,
    slug: &str,
    price: i64,
    status: &str,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO products (id, name, slug, price, sku, status) VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slug)
    .bind(price)
    .bind(slug.to_uppercase())
    .bind(status)
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

async fn seed_variant(
    state: &AppState,
    product_id: Uuid,
    variant_sku: &str,
    size: &str,
    color: &str,
    stock: i32,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO product_variants (id, product_id, size, color, stock, variant_sku) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(size)
    .bind(color)
    .bind(stock)
    .bind(variant_sku)
    .execute(&state.pool)
    .await?;
    Ok(())
}
