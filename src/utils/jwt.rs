// src/utils/jwt.rs

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::user::Role, state::AppState};

/// Access token claims.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role at login time. Admin routes re-check the database.
    pub role: Role,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> i64 {
        self.sub.parse::<i64>().unwrap_or(0)
    }
}

/// Refresh token claims. Carries no role; the role is re-read from the
/// database when the token is redeemed.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub exp: usize,
}

/// Attempt token claims, issued by the password-gated quiz fetch.
/// Expiry is the quiz duration plus a small grace period, so the server
/// rejects submissions after the time limit.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AttemptClaims {
    pub sub: String,
    pub quiz_id: i64,
    pub exp: usize,
}

fn now_secs() -> Result<usize, AppError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize)
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String, AppError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

fn verify<T: for<'de> Deserialize<'de>>(token: &str, secret: &str) -> Result<T, AppError> {
    let token_data = decode::<T>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Signs a short-lived access token for the user.
pub fn sign_access_token(
    id: i64,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: id.to_string(),
        role,
        exp: now_secs()? + expiration_seconds as usize,
    };
    sign(&claims, secret)
}

/// Signs a longer-lived refresh token for the user.
pub fn sign_refresh_token(
    id: i64,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let claims = RefreshClaims {
        sub: id.to_string(),
        exp: now_secs()? + expiration_seconds as usize,
    };
    sign(&claims, secret)
}

/// Signs an attempt token bounding one quiz-taking window.
pub fn sign_attempt_token(
    user_id: i64,
    quiz_id: i64,
    secret: &str,
    window_seconds: u64,
) -> Result<String, AppError> {
    let claims = AttemptClaims {
        sub: user_id.to_string(),
        quiz_id,
        exp: now_secs()? + window_seconds as usize,
    };
    sign(&claims, secret)
}

pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    verify(token, secret)
}

pub fn verify_refresh_token(token: &str, secret: &str) -> Result<RefreshClaims, AppError> {
    verify(token, secret)
}

pub fn verify_attempt_token(token: &str, secret: &str) -> Result<AttemptClaims, AppError> {
    verify::<AttemptClaims>(token, secret)
        .map_err(|_| AppError::AuthError("Attempt token invalid or expired".to_string()))
}

/// Axum Middleware: Authentication.
///
/// Intercepts requests, validates the 'Authorization: Bearer <token>' header.
/// If valid, injects `Claims` into the request extensions for handlers to use.
/// If invalid, returns 401 Unauthorized.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => return Err(AppError::AuthError("No token provided".to_string())),
    };

    let claims = verify_access_token(token, &state.config.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Axum Middleware: Admin Authorization.
///
/// Must be used AFTER `auth_middleware`. The role claim alone is not
/// trusted here: a demoted admin keeps a stale token until expiry, so the
/// current role is re-read from the database on every request.
pub async fn admin_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(AppError::AuthError("No token provided".to_string()))?;

    let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
        .bind(claims.user_id())
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Admin role check failed: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::AuthError("User not found".to_string()))?;

    if Role::from_str(&role) != Ok(Role::Admin) {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(req).await)
}
