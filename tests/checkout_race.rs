use std::collections::HashSet;

use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::{CreateOrderRequest, OrderLineInput},
    error::AppError,
    middleware::auth::AuthUser,
    models::{PaymentMethod, Role, ShippingAddress},
    services::order_service,
    state::AppState,
};
use uuid::Uuid;

// Two checkouts racing for the last unit: the conditional decrement lets
// exactly one through. Afterwards, a batch of checkouts shows order numbers
// never repeat.
#[tokio::test]
async fn concurrent_checkouts_and_order_number_uniqueness() -> anyhow::Result<()> {
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
    let user_id = seed_user(&state, "Racer", "racer@example.com").await?;
    let user = AuthUser {
        user_id,
        role: Role::Customer,
    };

    let product = seed_product(&state, "Wool Beanie", "wool-beanie", 90000).await?;
    seed_variant(&state, product, "BEANIE-ONE-GREY", 1).await?;

    // Both requests target the single remaining unit.
    let request = |qty: i32| CreateOrderRequest {
        items: vec![OrderLineInput {
            product_id: product,
            variant_sku: "BEANIE-ONE-GREY".into(),
            quantity: qty,
        }],
        shipping_address: shipping_address(),
        payment_method: PaymentMethod::Easypaisa,
    };

    let (first, second) = tokio::join!(
        order_service::create_order(&state, &user, request(1)),
        order_service::create_order(&state, &user, request(1)),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of the racing checkouts may win");
    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser.unwrap_err(), AppError::InsufficientStock(_)));
    assert_eq!(variant_stock(&state, product, "BEANIE-ONE-GREY").await?, 0);

    // Order numbers stay distinct across a batch of checkouts.
    seed_variant(&state, product, "BEANIE-ONE-BLACK", 50).await?;
    let mut numbers = HashSet::new();
    for _ in 0..25 {
        let order = order_service::create_order(
            &state,
            &user,
            CreateOrderRequest {
                items: vec![OrderLineInput {
                    product_id: product,
                    variant_sku: "BEANIE-ONE-BLACK".into(),
                    quantity: 1,
                }],
                shipping_address: shipping_address(),
                payment_method: PaymentMethod::Easypaisa,
            },
        )
        .await?
        .data;
        assert_eq!(order.order_number.len(), 8);
        assert!(
            numbers.insert(order.order_number.clone()),
            "duplicate order number {}",
            order.order_number
        );
    }
    assert_eq!(numbers.len(), 25);

    Ok(())
}

fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Test Customer".into(),
        phone: "+920000000000".into(),
        street: "1 Test Street".into(),
        city: "Lahore".into(),
        state: "Punjab".into(),
        postal_code: "54000".into(),
        country: "PK".into(),
    }
}

async fn variant_stock(
    state: &AppState,
    product_id: Uuid,
    variant_sku: &str,
) -> anyhow::Result<i32> {
    let (stock,): (i32,) = sqlx::query_as(
        "SELECT stock FROM product_variants WHERE product_id = $1 AND variant_sku = $2",
    )
    .bind(product_id)
    .bind(variant_sku)
    .fetch_one(&state.pool)
    .await?;
    Ok(stock)
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

async fn seed_user(state: &AppState, name: &str, email: &str) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO users (id, name, email, role) VALUES ($1, $2, $3, 'CUSTOMER') RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

async fn seed_product(
    state: &AppState,
    name: &str,
    slug: &str,
    price: i64,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO products (id, name, slug, price, sku, status) VALUES ($1, $2, $3, $4, $5, 'ACTIVE') RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slug)
    .bind(price)
    .bind(slug.to_uppercase())
    .fetch_one(&state.pool)
    .await?;
    Ok(id)
}

async fn seed_variant(
    state: &AppState,
    product_id: Uuid,
    variant_sku: &str,
    stock: i32,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO product_variants (id, product_id, size, color, stock, variant_sku) VALUES ($1, $2, 'ONE', 'Grey', $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(stock)
    .bind(variant_sku)
    .execute(&state.pool)
    .await?;
    Ok(())
}
