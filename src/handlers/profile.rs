// src/handlers/profile.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::auth::load_user,
    models::{
        address::{ADDRESS_COLUMNS, Address, CreateAddressRequest, UpdateAddressRequest},
        user::{ChangePasswordRequest, USER_COLUMNS, UpdateProfileRequest, User},
    },
    utils::{
        hash::{hash_password, verify_password},
        jwt::Claims,
    },
};

/// Get current user's profile.
pub async fn get_profile(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = load_user(&pool, claims.user_id()?).await?;
    Ok(Json(user))
}

/// Update name and/or profile image.
pub async fn update_profile(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let sql = format!(
        r#"
        UPDATE users
        SET name = COALESCE($1, name),
            profile_image = COALESCE($2, profile_image)
        WHERE id = $3
        RETURNING {}
        "#,
        USER_COLUMNS
    );
    let user: User = sqlx::query_as(&sql)
        .bind(payload.name.as_deref().map(str::trim))
        .bind(payload.profile_image)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Change password after re-checking the current one.
pub async fn change_password(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user = load_user(&pool, claims.user_id()?).await?;

    if !verify_password(&payload.current_password, &user.password)? {
        return Err(AppError::AuthError("Current password is incorrect".to_string()));
    }

    let hashed = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(hashed)
        .bind(user.id)
        .execute(&pool)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Password updated" })))
}

async fn list_for_user(conn: &mut PgConnection, user_id: i64) -> Result<Vec<Address>, AppError> {
    let sql = format!(
        "SELECT {} FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, created_at DESC, id DESC",
        ADDRESS_COLUMNS
    );
    let addresses = sqlx::query_as(&sql).bind(user_id).fetch_all(conn).await?;
    Ok(addresses)
}

/// Clears the user's current default so another address can take it.
async fn unset_default(conn: &mut PgConnection, user_id: i64) -> Result<(), AppError> {
    sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND is_default")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Makes the most recently added address the default when none is.
/// `demoted` is only picked when it is the user's last address.
async fn ensure_default(
    conn: &mut PgConnection,
    user_id: i64,
    demoted: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE addresses SET is_default = TRUE
        WHERE id = (
            SELECT id FROM addresses WHERE user_id = $1
            ORDER BY (id = $2), created_at DESC, id DESC LIMIT 1
        )
        AND NOT EXISTS (SELECT 1 FROM addresses WHERE user_id = $1 AND is_default)
        "#,
    )
    .bind(user_id)
    .bind(demoted)
    .execute(conn)
    .await?;
    Ok(())
}

/// List the current user's address book, default first.
pub async fn list_addresses(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let addresses = list_for_user(&mut conn, claims.user_id()?).await?;
    Ok(Json(addresses))
}

/// Add an address. The first address, or one flagged `is_default`, becomes
/// the default.
pub async fn add_address(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAddressRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    // Serializes concurrent adds so only one of them sees an empty book.
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    let make_default = payload.is_default || existing == 0;
    if make_default {
        unset_default(&mut tx, user_id).await?;
    }

    let sql = format!(
        r#"
        INSERT INTO addresses
        (user_id, first_name, last_name, phone, street, city, state, zipcode, country, is_default)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        ADDRESS_COLUMNS
    );
    let address: Address = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(payload.first_name.trim())
        .bind(payload.last_name.trim())
        .bind(payload.phone.trim())
        .bind(payload.street.trim())
        .bind(payload.city.trim())
        .bind(payload.state.trim())
        .bind(payload.zipcode.trim())
        .bind(payload.country.trim())
        .bind(make_default)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(address)))
}

/// Edit an address. Setting `is_default: true` moves the default here;
/// clearing it on the current default promotes another address, if any.
pub async fn update_address(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAddressRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let current: bool = sqlx::query_scalar(
        "SELECT is_default FROM addresses WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Address not found".to_string()))?;

    if payload.is_default == Some(true) && !current {
        unset_default(&mut tx, user_id).await?;
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE addresses SET ");
    let mut separated = builder.separated(", ");

    let text_fields = [
        ("first_name", &payload.first_name),
        ("last_name", &payload.last_name),
        ("phone", &payload.phone),
        ("street", &payload.street),
        ("city", &payload.city),
        ("state", &payload.state),
        ("zipcode", &payload.zipcode),
        ("country", &payload.country),
    ];
    for (column, value) in text_fields {
        if let Some(value) = value {
            separated.push(format!("{} = ", column));
            separated.push_bind_unseparated(value.trim().to_string());
        }
    }

    let is_default = payload.is_default.unwrap_or(current);
    separated.push("is_default = ");
    separated.push_bind_unseparated(is_default);

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(format!(" RETURNING {}", ADDRESS_COLUMNS));

    let mut address: Address = builder.build_query_as().fetch_one(&mut *tx).await?;

    if current && !is_default {
        ensure_default(&mut tx, user_id, id).await?;
        let sql = format!("SELECT {} FROM addresses WHERE id = $1", ADDRESS_COLUMNS);
        address = sqlx::query_as(&sql).bind(id).fetch_one(&mut *tx).await?;
    }

    tx.commit().await?;

    Ok(Json(address))
}

/// Delete an address. Deleting the default promotes the most recent
/// remaining address.
pub async fn delete_address(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let was_default: bool = sqlx::query_scalar(
        "DELETE FROM addresses WHERE id = $1 AND user_id = $2 RETURNING is_default",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Address not found".to_string()))?;

    if was_default {
        ensure_default(&mut tx, user_id, id).await?;
    }

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Make an address the default, unsetting the previous one.
pub async fn set_default_address(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM addresses WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Address not found".to_string()));
    }

    unset_default(&mut tx, user_id).await?;
    sqlx::query("UPDATE addresses SET is_default = TRUE WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let addresses = list_for_user(&mut tx, user_id).await?;
    tx.commit().await?;

    Ok(Json(addresses))
}
