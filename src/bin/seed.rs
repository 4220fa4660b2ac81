use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use storefront_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user_with_role(&pool, "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "user@example.com", "user123", "user").await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
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

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = vec![
        (
            "Classic Tee",
            "Everyday cotton tee",
            150000_i64,
            "apparel",
            vec![("black", "M", 40), ("black", "L", 30), ("white", "M", 25)],
        ),
        (
            "Canvas Tote",
            "Sturdy carry-all",
            90000,
            "accessories",
            vec![("natural", "one-size", 60)],
        ),
        (
            "Trail Sneaker",
            "Grippy outsole, light upper",
            750000,
            "footwear",
            vec![("grey", "42", 12), ("grey", "43", 8), ("blue", "42", 10)],
        ),
    ];

    for (name, desc, price, category, variants) in products {
        let product_id = Uuid::new_v4();
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO products (id, name, description, price, category, stock)
            VALUES ($1, $2, $3, $4, $5, 0)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(product_id)
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(category)
        .fetch_optional(pool)
        .await?;

        let Some((product_id,)) = inserted else {
            continue;
        };

        let mut total = 0;
        for (color, size, stock) in variants {
            sqlx::query(
                r#"
                INSERT INTO product_variants (id, product_id, color, size, stock)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(color)
            .bind(size)
            .bind(stock)
            .execute(pool)
            .await?;
            total += stock;
        }

        sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(product_id)
            .bind(total)
            .execute(pool)
            .await?;
    }

    println!("Seeded catalog");
    Ok(())
}
