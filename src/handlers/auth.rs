// src/handlers/auth.rs

use std::str::FromStr;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use rand::Rng;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        user::{LoginRequest, RefreshRequest, RegisterRequest, Role, SubscribeRequest, User},
        verification_code::{SendCodeRequest, VerificationCode, VerifyAndRegisterRequest},
    },
    utils::{
        hash::{hash_password, verify_password},
        jwt::{sign_access_token, sign_refresh_token, verify_refresh_token},
        mailer::Mailer,
    },
};

/// Resolves the requested role for registration. Defaults to 'student';
/// 'admin' is never allowed through the public endpoints.
fn registration_role(requested: Option<&str>) -> Result<Role, AppError> {
    match requested {
        None => Ok(Role::Student),
        Some(raw) => match Role::from_str(raw) {
            Ok(Role::Admin) => Err(AppError::BadRequest(
                "Cannot self-register as admin".to_string(),
            )),
            Ok(role) => Ok(role),
            Err(_) => Err(AppError::BadRequest(format!("Unknown role '{}'", raw))),
        },
    }
}

fn map_duplicate_email(e: sqlx::Error, email: &str) -> AppError {
    AppError::from_unique_violation(e, format!("Email '{}' is already registered", email))
}

/// Registers a new user directly (no email verification).
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let role = registration_role(payload.role.as_deref())?;
    let email = payload.email.trim().to_lowercase();
    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, email, password, role, last_score, created_at
        "#,
    )
    .bind(payload.name.trim())
    .bind(&email)
    .bind(&hashed_password)
    .bind(role.as_str())
    .fetch_one(&pool)
    .await
    .map_err(|e| map_duplicate_email(e, &email))?;

    tracing::info!("User registered: {}", user.email);

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns access and refresh tokens.
///
/// Verifies the email and password against the database. If valid, signs
/// a short-lived access token carrying the role and a longer-lived
/// refresh token carrying only the user id.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password, role, last_score, created_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let user = user.ok_or(AppError::AuthError("User not found".to_string()))?;

    let is_valid = verify_password(&payload.password, &user.password)?;

    if !is_valid {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let token = sign_access_token(
        user.id,
        user.role(),
        &config.jwt_secret,
        config.jwt_expiration,
    )?;
    let refresh_token = sign_refresh_token(
        user.id,
        &config.jwt_refresh_secret,
        config.refresh_expiration,
    )?;

    tracing::info!("User logged in: {}", user.email);

    Ok(Json(json!({
        "token": token,
        "refresh_token": refresh_token,
        "type": "Bearer",
        "role": user.role,
    })))
}

/// Exchanges a valid refresh token for a fresh access token.
///
/// The role is re-read from the database, so a demotion takes effect no
/// later than the next refresh.
pub async fn refresh(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_refresh_token(&payload.refresh_token, &config.jwt_refresh_secret)?;
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password, role, last_score, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::AuthError("User not found".to_string()))?;

    let token = sign_access_token(
        user.id,
        user.role(),
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "role": user.role,
    })))
}

/// Stores a pending registration and mails a 6-digit verification code.
///
/// One pending row per email; re-requesting replaces the code and resets
/// the 10-minute expiry. Already-registered emails are rejected up front.
pub async fn send_verification_code(
    State(pool): State<PgPool>,
    State(mailer): State<Mailer>,
    Json(payload): Json<SendCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let role = registration_role(payload.role.as_deref())?;
    let email = payload.email.trim().to_lowercase();

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Email '{}' is already registered",
            email
        )));
    }

    let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
    let hashed_password = hash_password(&payload.password)?;
    let expires_at = chrono::Utc::now() + chrono::Duration::minutes(10);

    sqlx::query(
        r#"
        INSERT INTO verification_codes (email, code, name, password, role, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO UPDATE SET
            code = EXCLUDED.code,
            name = EXCLUDED.name,
            password = EXCLUDED.password,
            role = EXCLUDED.role,
            expires_at = EXCLUDED.expires_at
        "#,
    )
    .bind(&email)
    .bind(&code)
    .bind(payload.name.trim())
    .bind(&hashed_password)
    .bind(role.as_str())
    .bind(expires_at)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store verification code: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    mailer.send_verification_code(&email, &code).await?;

    Ok(Json(json!({
        "message": "Verification code sent"
    })))
}

/// Completes a pending registration by checking the mailed code.
pub async fn verify_and_register(
    State(pool): State<PgPool>,
    Json(payload): Json<VerifyAndRegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.trim().to_lowercase();

    let pending = sqlx::query_as::<_, VerificationCode>(
        "SELECT email, code, name, password, role, expires_at FROM verification_codes WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound(
        "No pending registration for this email".to_string(),
    ))?;

    if pending.expires_at < chrono::Utc::now() {
        sqlx::query("DELETE FROM verification_codes WHERE email = $1")
            .bind(&email)
            .execute(&pool)
            .await?;
        return Err(AppError::AuthError(
            "Verification code expired".to_string(),
        ));
    }

    if pending.code != payload.code {
        return Err(AppError::AuthError(
            "Incorrect verification code".to_string(),
        ));
    }

    // Password was hashed when the code was requested.
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, email, password, role, last_score, created_at
        "#,
    )
    .bind(&pending.name)
    .bind(&email)
    .bind(&pending.password)
    .bind(&pending.role)
    .fetch_one(&pool)
    .await
    .map_err(|e| map_duplicate_email(e, &email))?;

    sqlx::query("DELETE FROM verification_codes WHERE email = $1")
        .bind(&email)
        .execute(&pool)
        .await?;

    tracing::info!("User registered via email verification: {}", user.email);

    Ok((StatusCode::CREATED, Json(user)))
}

/// Adds an email to the mailing list. Idempotent.
pub async fn subscribe(
    State(pool): State<PgPool>,
    Json(payload): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.trim().to_lowercase();

    sqlx::query("INSERT INTO subscribers (email) VALUES ($1) ON CONFLICT (email) DO NOTHING")
        .bind(&email)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store subscriber: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(json!({
        "message": "Subscribed successfully"
    })))
}
