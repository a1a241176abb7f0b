use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, state::AppState};

pub const AUTH_COOKIE: &str = "arcana_session";

const TOKEN_TTL_HOURS: i64 = 24;

/// A token inside this window of its expiry gets transparently re-issued.
const REFRESH_WINDOW_SECS: i64 = 6 * 60 * 60;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, "admin")
}

pub fn sign_token(sub: &str, role: &str, secret: &str) -> Result<String, AppError> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(TOKEN_TTL_HOURS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("failed to set expiration")))?;

    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

pub fn auth_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, "")).path("/").build()
}

fn jwt_secret() -> Result<String, AppError> {
    std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))
}

/// Pull the session token out of the cookie, falling back to a bearer header
/// for non-browser clients.
fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(AUTH_COOKIE) {
        let value = cookie.value();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        let secret = jwt_secret()?;
        let claims = decode_claims(&token, &secret)?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

        Ok(AuthUser {
            user_id,
            role: claims.role,
        })
    }
}

/// Anonymous requests extract as `None`; a present but invalid token is still
/// an error so expired sessions do not silently downgrade to guest views.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if token_from_headers(&parts.headers).is_none() {
            return Ok(None);
        }
        <AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

fn response_sets_auth_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| {
            value
                .strip_prefix(AUTH_COOKIE)
                .is_some_and(|rest| rest.starts_with('='))
        })
}

/// Opportunistic token refresh: when a request carries a valid token close to
/// expiry, the response re-sets the cookie with a fresh one.
pub async fn refresh_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let token = token_from_headers(request.headers());
    let mut response = next.run(request).await;

    // A handler that set or cleared the session cookie wins; logout must not
    // be undone by a re-issued token.
    if response_sets_auth_cookie(response.headers()) {
        return response;
    }

    let Some(token) = token else {
        return response;
    };
    let Ok(secret) = jwt_secret() else {
        return response;
    };
    let Ok(claims) = decode_claims(&token, &secret) else {
        return response;
    };

    let remaining = claims.exp as i64 - Utc::now().timestamp();
    if remaining > REFRESH_WINDOW_SECS {
        return response;
    }

    if let Ok(fresh) = sign_token(&claims.sub, &claims.role, &secret) {
        let cookie = auth_cookie(fresh, state.config.cookie_secure);
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trips() {
        let id = Uuid::new_v4();
        let token = sign_token(&id.to_string(), "admin", SECRET).unwrap();
        let claims = decode_claims(&token, SECRET).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.role, "admin");
        assert!(claims.exp > Utc::now().timestamp() as usize);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_token("someone", "user", SECRET).unwrap();
        assert!(matches!(
            decode_claims(&token, "other-secret"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn role_gate_admits_only_matching_role() {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            role: "user".into(),
        };
        assert!(ensure_role(&user, "user").is_ok());
        assert!(matches!(ensure_admin(&user), Err(AppError::Forbidden)));
    }

    #[test]
    fn cookie_detection_sees_existing_session_set_cookies() {
        let empty = HeaderMap::new();
        assert!(!response_sets_auth_cookie(&empty));

        let mut logout = HeaderMap::new();
        logout.append(
            header::SET_COOKIE,
            HeaderValue::from_str(&removal_cookie().to_string()).unwrap(),
        );
        assert!(response_sets_auth_cookie(&logout));

        let mut unrelated = HeaderMap::new();
        unrelated.append(header::SET_COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(!response_sets_auth_cookie(&unrelated));
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = auth_cookie("tok".into(), true);
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
    }
}
