use std::path::PathBuf;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use arcana_shop_api::{
    config::AppConfig, dto::auth::Claims, middleware::auth::refresh_session,
    routes::auth::logout, state::AppState,
};

const SECRET: &str = "session-refresh-test-secret";

// The refresh middleware only reads config, so a lazy pool that never connects
// is enough to build state; no database is needed for these tests.
fn app() -> anyhow::Result<Router> {
    unsafe { std::env::set_var("JWT_SECRET", SECRET) };

    let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/unused")?;
    let config = AppConfig {
        database_url: "postgres://localhost/unused".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: "http://localhost".to_string(),
        store_provider: "postgres".to_string(),
        upload_dir: PathBuf::from("target/test-uploads"),
        cookie_secure: false,
        smtp: None,
        stripe_secret_key: None,
    };
    let state = AppState::build(config, pool)?;

    Ok(Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/ping", get(|| async { "pong" }))
        .layer(from_fn_with_state(state.clone(), refresh_session))
        .with_state(state))
}

fn token_expiring_in(secs: i64) -> String {
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        role: "user".to_string(),
        exp: (Utc::now().timestamp() + secs) as usize,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn session_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| value.starts_with("arcana_session="))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn logout_is_not_undone_by_near_expiry_refresh() -> anyhow::Result<()> {
    let token = token_expiring_in(3600);
    let response = app()?
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, format!("arcana_session={token}"))
                .body(Body::empty())?,
        )
        .await?;

    let cookies = session_set_cookies(&response);
    assert!(!cookies.is_empty(), "logout must clear the session cookie");
    for cookie in &cookies {
        assert!(
            cookie.starts_with("arcana_session=;"),
            "logout response must not carry a live session cookie, got {cookie:?}"
        );
    }

    Ok(())
}

#[tokio::test]
async fn near_expiry_token_is_reissued() -> anyhow::Result<()> {
    let token = token_expiring_in(3600);
    let response = app()?
        .oneshot(
            Request::builder()
                .uri("/ping")
                .header(header::COOKIE, format!("arcana_session={token}"))
                .body(Body::empty())?,
        )
        .await?;

    let cookies = session_set_cookies(&response);
    assert_eq!(cookies.len(), 1, "expected exactly one refreshed cookie");
    assert!(
        !cookies[0].starts_with("arcana_session=;"),
        "refreshed cookie must carry a token"
    );

    Ok(())
}

#[tokio::test]
async fn fresh_token_is_left_alone() -> anyhow::Result<()> {
    let token = token_expiring_in(20 * 3600);
    let response = app()?
        .oneshot(
            Request::builder()
                .uri("/ping")
                .header(header::COOKIE, format!("arcana_session={token}"))
                .body(Body::empty())?,
        )
        .await?;

    assert!(
        session_set_cookies(&response).is_empty(),
        "a token far from expiry must not be re-issued"
    );

    Ok(())
}
