use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use arcana_shop_api::{
    config::AppConfig,
    db::{MIGRATOR, create_pool},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    MIGRATOR.run(&pool).await?;

    let admin_id = ensure_user_with_role(&pool, "admin@arcana.example", "admin-seed-pw", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "reader@arcana.example", "reader-seed-pw", "user").await?;
    seed_items(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, email_verified) VALUES ($1, $2, $3, $4, TRUE)",
    )
    .bind(id)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .execute(pool)
    .await?;

    Ok(id)
}

async fn seed_items(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let items: &[(&str, &str, i64, &str, i32)] = &[
        (
            "Rider-Waite Tarot Deck",
            "The classic 78-card deck, standard size.",
            2999,
            "decks",
            40,
        ),
        (
            "Marseille Tarot Deck",
            "Traditional French deck with woodcut artwork.",
            3499,
            "decks",
            25,
        ),
        (
            "Celtic Cross Reading (60 min)",
            "In-depth ten-card spread session, held over video call.",
            8500,
            "readings",
            12,
        ),
        (
            "Three-Card Reading (20 min)",
            "Past, present, future. A focused introductory session.",
            3500,
            "readings",
            30,
        ),
        (
            "Beeswax Altar Candle",
            "Hand-poured, burns roughly six hours.",
            1200,
            "accessories",
            80,
        ),
        (
            "Silk Reading Cloth",
            "70x70cm, deep indigo with gold trim.",
            2400,
            "accessories",
            15,
        ),
    ];

    for (name, description, price, category, stock) in items {
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM shop_items WHERE name = $1")
                .bind(name)
                .fetch_optional(pool)
                .await?;
        if existing.is_some() {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO shop_items (id, name, description, price, category, stock)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(category)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    Ok(())
}
