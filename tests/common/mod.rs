use std::path::PathBuf;

use tokio::sync::{Mutex, MutexGuard};

use arcana_shop_api::{
    config::AppConfig,
    db::{MIGRATOR, create_pool},
    state::AppState,
};

static DB_LOCK: Mutex<()> = Mutex::const_new(());

/// Handle on the shared test database. It holds a lock that serializes the
/// tests within a binary, so one test's truncation cannot delete another
/// test's rows mid-flow. Drop it only when the test is done with the database.
pub struct TestDb {
    pub state: AppState,
    _guard: MutexGuard<'static, ()>,
}

/// Returns `None` (and prints a skip notice) when no database is configured,
/// so the suite passes in environments without Postgres.
pub async fn setup_state() -> anyhow::Result<Option<TestDb>> {
    let guard = DB_LOCK.lock().await;

    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests."
            );
            return Ok(None);
        }
    };

    let pool = create_pool(&database_url).await?;
    MIGRATOR.run(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE order_items, orders, cart_items, user_tokens, audit_logs, shop_items, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: "http://localhost".to_string(),
        store_provider: "postgres".to_string(),
        upload_dir: PathBuf::from("target/test-uploads"),
        cookie_secure: false,
        smtp: None,
        stripe_secret_key: None,
    };

    Ok(Some(TestDb {
        state: AppState::build(config, pool)?,
        _guard: guard,
    }))
}
