use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use password_hash::rand_core::OsRng;
use rand::{Rng, distr::Alphanumeric};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::auth::{
        LoginRequest, LoginResponse, RegisterRequest, ResetConfirmRequest, ResetRequest,
        VerifyEmailRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, sign_token},
    models::{User, UserToken},
    response::{ApiResponse, Meta},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;
const VERIFY_TOKEN_TTL_HOURS: i64 = 48;
const RESET_TOKEN_TTL_HOURS: i64 = 1;

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let RegisterRequest {
        email,
        password,
        wallet_address,
    } = payload;

    validate_email(&email)?;
    validate_password(&password)?;

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email.as_str())
        .fetch_optional(&state.pool)
        .await?;

    if exist.is_some() {
        return Err(AppError::BadRequest("Email is already taken".to_string()));
    }

    let password_hash = hash_password(&password)?;
    let id = Uuid::new_v4();

    let user: User = sqlx::query_as(
        "INSERT INTO users (id, email, password_hash, wallet_address) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(id)
    .bind(email.as_str())
    .bind(password_hash)
    .bind(wallet_address)
    .fetch_one(&state.pool)
    .await?;

    let token = issue_token(state, user.id, "verify_email", VERIFY_TOKEN_TTL_HOURS).await?;
    if let Some(mailer) = &state.mailer {
        if let Err(err) = mailer.send_verification(&user.email, &token).await {
            tracing::warn!(error = %err, "verification email failed");
        }
    } else {
        tracing::warn!("SMTP not configured, skipping verification email");
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("User created", user, None))
}

pub async fn login_user(state: &AppState, payload: LoginRequest) -> AppResult<LoginResponse> {
    let LoginRequest { email, password } = payload;
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email.as_str())
        .fetch_optional(&state.pool)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;
    let token = sign_token(&user.id.to_string(), &user.role, &secret)?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(LoginResponse { token, user })
}

pub async fn current_user(state: &AppState, auth: &AuthUser) -> AppResult<ApiResponse<User>> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth.user_id)
        .fetch_optional(&state.pool)
        .await?;

    match user {
        Some(user) => Ok(ApiResponse::success("OK", user, None)),
        None => Err(AppError::Unauthorized),
    }
}

pub async fn verify_email(
    state: &AppState,
    payload: VerifyEmailRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let token = consume_token(state, &payload.token, "verify_email").await?;

    sqlx::query("UPDATE users SET email_verified = TRUE WHERE id = $1")
        .bind(token.user_id)
        .execute(&state.pool)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(token.user_id),
        "email_verified",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Email verified",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Always answers 200 so the endpoint cannot be used to enumerate accounts.
pub async fn request_password_reset(
    state: &AppState,
    payload: ResetRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(payload.email.as_str())
        .fetch_optional(&state.pool)
        .await?;

    if let Some(user) = user {
        let token = issue_token(state, user.id, "password_reset", RESET_TOKEN_TTL_HOURS).await?;
        if let Some(mailer) = &state.mailer {
            if let Err(err) = mailer.send_password_reset(&user.email, &token).await {
                tracing::warn!(error = %err, "password reset email failed");
            }
        } else {
            tracing::warn!("SMTP not configured, skipping password reset email");
        }
    }

    Ok(ApiResponse::success(
        "If the account exists, a reset email has been sent",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn confirm_password_reset(
    state: &AppState,
    payload: ResetConfirmRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    validate_password(&payload.new_password)?;

    let token = consume_token(state, &payload.token, "password_reset").await?;
    let password_hash = hash_password(&payload.new_password)?;

    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(token.user_id)
        .bind(password_hash)
        .execute(&state.pool)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(token.user_id),
        "password_reset",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Password updated",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn issue_token(
    state: &AppState,
    user_id: Uuid,
    purpose: &str,
    ttl_hours: i64,
) -> AppResult<String> {
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);

    sqlx::query(
        r#"
        INSERT INTO user_tokens (id, user_id, token, purpose, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token.as_str())
    .bind(purpose)
    .bind(expires_at)
    .execute(&state.pool)
    .await?;

    Ok(token)
}

/// Single use: the token row is deleted on successful lookup.
async fn consume_token(state: &AppState, token: &str, purpose: &str) -> AppResult<UserToken> {
    let row: Option<UserToken> = sqlx::query_as(
        "DELETE FROM user_tokens WHERE token = $1 AND purpose = $2 RETURNING *",
    )
    .bind(token)
    .bind(purpose)
    .fetch_optional(&state.pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Err(AppError::BadRequest("Invalid or expired token".into())),
    };

    if row.expires_at < Utc::now() {
        return Err(AppError::BadRequest("Invalid or expired token".into()));
    }

    Ok(row)
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn validate_email(email: &str) -> AppResult<()> {
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if !valid {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("reader@arcana.example").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@arcana.example").is_err());
        assert!(validate_email("reader@nodot").is_err());
    }

    #[test]
    fn weak_passwords_are_rejected() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long-enough-password").is_ok());
    }
}
