// src/handlers/superadmin.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::user::{
        CreateUserRequest, Role, USER_COLUMNS, UpdateRoleRequest, UpdateStatusRequest, User,
        normalize_email,
    },
    utils::{hash::hash_password, jwt::Claims},
};

/// Creates an account with any role.
/// Superadmin only.
pub async fn create_user(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    let hashed_password = hash_password(&payload.password)?;

    let sql = format!(
        r#"
        INSERT INTO users (name, email, password, role)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        USER_COLUMNS
    );
    let user: User = sqlx::query_as(&sql)
        .bind(payload.name.trim())
        .bind(&email)
        .bind(hashed_password)
        .bind(payload.role.as_str())
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Email '{}' is already registered", email))
            } else {
                tracing::error!("Failed to create user: {:?}", e);
                AppError::InternalServerError(e.to_string())
            }
        })?;

    tracing::info!("Created {} account {}", payload.role, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Changes a user's role. A superadmin cannot demote themselves.
pub async fn update_role(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? && payload.role != Role::Superadmin {
        return Err(AppError::BadRequest(
            "You cannot change your own role".to_string(),
        ));
    }

    let sql = format!(
        "UPDATE users SET role = $1 WHERE id = $2 RETURNING {}",
        USER_COLUMNS
    );
    let user: User = sqlx::query_as(&sql)
        .bind(payload.role.as_str())
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    tracing::info!("User {} is now {}", user.id, payload.role);
    Ok(Json(user))
}

/// Activates or deactivates an account. A superadmin cannot deactivate
/// themselves.
pub async fn update_status(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? && !payload.is_active {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    let sql = format!(
        "UPDATE users SET is_active = $1 WHERE id = $2 RETURNING {}",
        USER_COLUMNS
    );
    let user: User = sqlx::query_as(&sql)
        .bind(payload.is_active)
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Deletes an account and everything it owns.
/// Superadmin only, and never their own account.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!("Deleted user {}", id);
    Ok(StatusCode::NO_CONTENT)
}
