// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{AdminUpdateUserRequest, Role, User},
    utils::{hash::hash_password, jwt::Claims},
};

/// Lists all users in the system.
/// Admin only. Password hashes are excluded by serde.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password, role, last_score, created_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// Fetches a single user by ID.
/// Admin only.
pub async fn get_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = fetch_user(&pool, id).await?;
    Ok(Json(user))
}

/// Updates user information (name, email, password).
/// Admin only. Role changes go through promote/demote.
pub async fn update_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    // Check existence
    let _exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    // Perform updates sequentially if fields are present
    if let Some(new_name) = payload.name {
        if new_name.trim().is_empty() {
            return Err(AppError::BadRequest("Name cannot be empty".to_string()));
        }
        sqlx::query("UPDATE users SET name = $1 WHERE id = $2")
            .bind(new_name.trim())
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    if let Some(new_email) = payload.email {
        let new_email = new_email.trim().to_lowercase();
        sqlx::query("UPDATE users SET email = $1 WHERE id = $2")
            .bind(&new_email)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| {
                AppError::from_unique_violation(
                    e,
                    format!("Email '{}' is already registered", new_email),
                )
            })?;
    }

    if let Some(new_password) = payload.password {
        let hashed = hash_password(&new_password)?;
        sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(&hashed)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    Ok(StatusCode::OK)
}

/// Deletes a user by ID.
/// Admin only. Prevents deleting self and deleting the last admin.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    // Prevent self-deletion
    if id == claims.user_id() {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let user = fetch_user(&pool, id).await?;

    if user.role() == Role::Admin {
        ensure_not_last_admin(&pool, "Cannot delete the last remaining admin").await?;
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Raises a user's role one step: student -> teacher -> admin.
/// Admin only.
pub async fn promote_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = fetch_user(&pool, id).await?;

    let new_role = user
        .role()
        .promoted()
        .ok_or(AppError::BadRequest("User is already an admin".to_string()))?;

    set_role(&pool, id, new_role).await?;

    tracing::info!("User {} promoted to {}", id, new_role);

    Ok(Json(serde_json::json!({
        "message": format!("User promoted to {} successfully", new_role)
    })))
}

/// Lowers a user's role one step: admin -> teacher -> student.
/// Admin only. The last remaining admin cannot be demoted.
pub async fn demote_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = fetch_user(&pool, id).await?;

    let new_role = user
        .role()
        .demoted()
        .ok_or(AppError::BadRequest("User is already a student".to_string()))?;

    if user.role() == Role::Admin {
        ensure_not_last_admin(&pool, "Cannot demote the last remaining admin").await?;
    }

    set_role(&pool, id, new_role).await?;

    tracing::info!("User {} demoted to {}", id, new_role);

    Ok(Json(serde_json::json!({
        "message": format!("User demoted to {} successfully", new_role)
    })))
}

async fn fetch_user(pool: &PgPool, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password, role, last_score, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))
}

async fn set_role(pool: &PgPool, id: i64, role: Role) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
        .bind(role.as_str())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update role: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
    Ok(())
}

async fn ensure_not_last_admin(pool: &PgPool, message: &str) -> Result<(), AppError> {
    let admin_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(pool)
            .await?;

    if admin_count <= 1 {
        return Err(AppError::BadRequest(message.to_string()));
    }

    Ok(())
}
