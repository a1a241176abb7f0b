use arcana_shop_api::{
    dto::auth::{LoginRequest, RegisterRequest, ResetConfirmRequest, ResetRequest},
    services::auth_service,
};

mod common;

#[tokio::test]
async fn register_validates_and_login_issues_token() -> anyhow::Result<()> {
    let Some(db) = common::setup_state().await? else {
        return Ok(());
    };
    let state = db.state.clone();
    // login_user signs the JWT with this
    unsafe { std::env::set_var("JWT_SECRET", "integration-test-secret") };

    // Weak password rejected before any row is written
    let weak = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "weak@arcana.example".into(),
            password: "short".into(),
            wallet_address: None,
        },
    )
    .await;
    assert!(weak.is_err());

    let bad_email = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "not-an-email".into(),
            password: "a-fine-password".into(),
            wallet_address: None,
        },
    )
    .await;
    assert!(bad_email.is_err());

    let created = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "reader@arcana.example".into(),
            password: "a-fine-password".into(),
            wallet_address: Some("0xabc123".into()),
        },
    )
    .await?;
    let user = created.data.unwrap();
    assert_eq!(user.role, "user");
    assert!(!user.email_verified);

    // Duplicate email rejected
    let dup = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "reader@arcana.example".into(),
            password: "another-password".into(),
            wallet_address: None,
        },
    )
    .await;
    assert!(dup.is_err());

    // Login succeeds with the right password only
    let login = auth_service::login_user(
        &state,
        LoginRequest {
            email: "reader@arcana.example".into(),
            password: "a-fine-password".into(),
        },
    )
    .await?;
    assert!(!login.token.is_empty());
    assert_eq!(login.user.id, user.id);

    let wrong = auth_service::login_user(
        &state,
        LoginRequest {
            email: "reader@arcana.example".into(),
            password: "wrong-password".into(),
        },
    )
    .await;
    assert!(wrong.is_err());

    Ok(())
}

#[tokio::test]
async fn password_reset_round_trip() -> anyhow::Result<()> {
    let Some(db) = common::setup_state().await? else {
        return Ok(());
    };
    let state = db.state.clone();
    unsafe { std::env::set_var("JWT_SECRET", "integration-test-secret") };

    auth_service::register_user(
        &state,
        RegisterRequest {
            email: "forgetful@arcana.example".into(),
            password: "original-password".into(),
            wallet_address: None,
        },
    )
    .await?;

    // Unknown emails still get a 200-shaped answer
    let unknown = auth_service::request_password_reset(
        &state,
        ResetRequest {
            email: "ghost@arcana.example".into(),
        },
    )
    .await?;
    assert!(unknown.data.is_some());

    auth_service::request_password_reset(
        &state,
        ResetRequest {
            email: "forgetful@arcana.example".into(),
        },
    )
    .await?;

    // No SMTP in tests; read the token straight from the table
    let (token,): (String,) = sqlx::query_as(
        r#"
        SELECT t.token FROM user_tokens t
        JOIN users u ON u.id = t.user_id
        WHERE u.email = $1 AND t.purpose = 'password_reset'
        "#,
    )
    .bind("forgetful@arcana.example")
    .fetch_one(&state.pool)
    .await?;

    auth_service::confirm_password_reset(
        &state,
        ResetConfirmRequest {
            token: token.clone(),
            new_password: "brand-new-password".into(),
        },
    )
    .await?;

    // Token is single use
    let reuse = auth_service::confirm_password_reset(
        &state,
        ResetConfirmRequest {
            token,
            new_password: "yet-another-password".into(),
        },
    )
    .await;
    assert!(reuse.is_err());

    // Old password no longer works, new one does
    let old = auth_service::login_user(
        &state,
        LoginRequest {
            email: "forgetful@arcana.example".into(),
            password: "original-password".into(),
        },
    )
    .await;
    assert!(old.is_err());

    let fresh = auth_service::login_user(
        &state,
        LoginRequest {
            email: "forgetful@arcana.example".into(),
            password: "brand-new-password".into(),
        },
    )
    .await?;
    assert_eq!(fresh.user.email, "forgetful@arcana.example");

    Ok(())
}

#[tokio::test]
async fn email_verification_marks_user() -> anyhow::Result<()> {
    let Some(db) = common::setup_state().await? else {
        return Ok(());
    };
    let state = db.state.clone();

    let created = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "verify@arcana.example".into(),
            password: "a-fine-password".into(),
            wallet_address: None,
        },
    )
    .await?;
    let user = created.data.unwrap();

    let (token,): (String,) = sqlx::query_as(
        "SELECT token FROM user_tokens WHERE user_id = $1 AND purpose = 'verify_email'",
    )
    .bind(user.id)
    .fetch_one(&state.pool)
    .await?;

    auth_service::verify_email(
        &state,
        arcana_shop_api::dto::auth::VerifyEmailRequest { token },
    )
    .await?;

    let (verified,): (bool,) =
        sqlx::query_as("SELECT email_verified FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_one(&state.pool)
            .await?;
    assert!(verified);

    Ok(())
}
