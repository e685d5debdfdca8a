use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let admin_id = ensure_user_with_role(&pool, "Admin", "admin@example.com", "admin123", "ADMIN").await?;
    let user_id =
        ensure_user_with_role(&pool, "Customer", "customer@example.com", "customer123", "CUSTOMER")
            .await?;
    let product_ids = seed_products(&pool).await?;
    seed_collections(&pool, &product_ids).await?;

    println!("Seed completed. Admin ID: {admin_id}, Customer ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(row.0)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Uuid>> {
    // (name, slug, description, price, sale_price, sku, variants)
    let products: Vec<(&str, &str, &str, i64, Option<i64>, &str, Vec<(&str, &str, i32)>)> = vec![
        (
            "Linen Shirt",
            "linen-shirt",
            "Breathable linen shirt for warm days",
            550000,
            Some(450000),
            "SHIRT-LINEN",
            vec![("S", "White", 20), ("M", "White", 12), ("L", "Navy", 3)],
        ),
        (
            "Canvas Tote",
            "canvas-tote",
            "Heavy duty canvas tote bag",
            120000,
            None,
            "TOTE-CANVAS",
            vec![("ONE", "Natural", 100)],
        ),
        (
            "Wool Beanie",
            "wool-beanie",
            "Merino wool beanie",
            90000,
            None,
            "BEANIE-WOOL",
            vec![("ONE", "Grey", 0), ("ONE", "Black", 4)],
        ),
    ];

    let mut ids = Vec::new();
    for (name, slug, desc, price, sale_price, sku, variants) in products {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO products (id, name, slug, description, price, sale_price, sku, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'ACTIVE')
            ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .bind(desc)
        .bind(price)
        .bind(sale_price)
        .bind(sku)
        .fetch_one(pool)
        .await?;
        let product_id = row.0;
        ids.push(product_id);

        sqlx::query("DELETE FROM product_images WHERE product_id = $1")
            .bind(product_id)
            .execute(pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO product_images (id, product_id, url, alt, display_order)
            VALUES ($1, $2, $3, $4, 0)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(format!("https://cdn.example.com/{slug}.jpg"))
        .bind(name)
        .execute(pool)
        .await?;

        for (size, color, stock) in variants {
            let variant_sku = format!("{sku}-{size}-{}", color.to_uppercase());
            sqlx::query(
                r#"
                INSERT INTO product_variants (id, product_id, size, color, stock, variant_sku)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (product_id, variant_sku) DO UPDATE SET stock = EXCLUDED.stock
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(size)
            .bind(color)
            .bind(stock)
            .bind(variant_sku)
            .execute(pool)
            .await?;
        }
    }

    println!("Seeded products");
    Ok(ids)
}

async fn seed_collections(pool: &sqlx::PgPool, product_ids: &[Uuid]) -> anyhow::Result<()> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO collections (id, name, slug, description, display_order)
        VALUES ($1, 'New Arrivals', 'new-arrivals', 'Fresh in the shop', 0)
        ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .fetch_one(pool)
    .await?;

    for product_id in product_ids {
        sqlx::query(
            r#"
            INSERT INTO collection_products (collection_id, product_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(row.0)
        .bind(product_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded collections");
    Ok(())
}
