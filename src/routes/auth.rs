use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    dto::auth::{
        LoginRequest, LoginResponse, RegisterRequest, ResetConfirmRequest, ResetRequest,
        VerifyEmailRequest,
    },
    error::AppResult,
    middleware::auth::{AuthUser, auth_cookie, removal_cookie},
    models::User,
    response::{ApiResponse, Meta},
    services::auth_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/verify", post(verify))
        .route("/reset/request", post(reset_request))
        .route("/reset/confirm", post(reset_confirm))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Register user", body = ApiResponse<User>),
        (status = 400, description = "Invalid email or weak password")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = auth_service::register_user(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login user, sets the session cookie", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse<LoginResponse>>)> {
    let resp = auth_service::login_user(&state, payload).await?;
    let jar = jar.add(auth_cookie(resp.token.clone(), state.config.cookie_secure));
    Ok((
        jar,
        Json(ApiResponse::success("Logged in", resp, Some(Meta::empty()))),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Clears the session cookie")
    ),
    tag = "Auth"
)]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<ApiResponse<serde_json::Value>>) {
    let jar = jar.remove(removal_cookie());
    (
        jar,
        Json(ApiResponse::success(
            "Logged out",
            serde_json::json!({}),
            Some(Meta::empty()),
        )),
    )
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 401, description = "Not logged in")
    ),
    security(("cookie_auth" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = auth_service::current_user(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified"),
        (status = 400, description = "Invalid or expired token")
    ),
    tag = "Auth"
)]
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = auth_service::verify_email(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset/request",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Reset email sent when the account exists")
    ),
    tag = "Auth"
)]
pub async fn reset_request(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = auth_service::request_password_reset(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset/confirm",
    request_body = ResetConfirmRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid or expired token")
    ),
    tag = "Auth"
)]
pub async fn reset_confirm(
    State(state): State<AppState>,
    Json(payload): Json<ResetConfirmRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = auth_service::confirm_password_reset(&state, payload).await?;
    Ok(Json(resp))
}
