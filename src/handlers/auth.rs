// src/handlers/auth.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::{Config, RESET_TOKEN_TTL_SECS},
    error::{AppError, is_unique_violation},
    models::user::{
        AuthResponse, ForgotPasswordRequest, GoogleLoginRequest, LoginRequest, RegisterRequest,
        ResetPasswordRequest, USER_COLUMNS, User, normalize_email,
    },
    services::mailer::{Mailer, password_reset_email, send_in_background},
    state::AppState,
    utils::{
        cookie::{clear_session_cookie, session_cookie},
        hash::{hash_password, random_token, sha256_hex, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

/// Loads a user by id or fails with 404.
pub(crate) async fn load_user(pool: &PgPool, id: i64) -> Result<User, AppError> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, AppError> {
    let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
    let user = sqlx::query_as(&sql).bind(email).fetch_optional(pool).await?;
    Ok(user)
}

/// Stamps `last_login` and returns the refreshed row.
async fn touch_last_login(pool: &PgPool, id: i64) -> Result<User, AppError> {
    let sql = format!(
        "UPDATE users SET last_login = NOW() WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    );
    let user = sqlx::query_as(&sql).bind(id).fetch_one(pool).await?;
    Ok(user)
}

/// Signs a session for `user` and returns it both in the body and as the
/// session cookie.
fn session_response(user: User, config: &Config, status: StatusCode) -> Result<Response, AppError> {
    let token = sign_jwt(user.id, user.role(), &config.jwt_secret, config.jwt_expiration)?;
    let cookie =
        session_cookie(&token, config).map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let body = AuthResponse {
        token,
        token_type: "Bearer",
        user,
    };

    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Checks credentials and account state shared by user and admin logins.
async fn authenticate(pool: &PgPool, payload: &LoginRequest) -> Result<User, AppError> {
    let user = find_by_email(pool, &normalize_email(&payload.email))
        .await?
        .ok_or(AppError::AuthError("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid email or password".to_string()));
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Your account has been deactivated".to_string()));
    }

    Ok(user)
}

/// Registers a new customer account.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created with a session (token + cookie).
pub async fn register(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    let hashed_password = hash_password(&payload.password)?;

    let sql = format!(
        r#"
        INSERT INTO users (name, email, password, last_login)
        VALUES ($1, $2, $3, NOW())
        RETURNING {}
        "#,
        USER_COLUMNS
    );
    let user: User = sqlx::query_as(&sql)
        .bind(payload.name.trim())
        .bind(&email)
        .bind(hashed_password)
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("An account with this email already exists".to_string())
            } else {
                tracing::error!("Failed to register user: {:?}", e);
                AppError::from(e)
            }
        })?;

    tracing::info!("Registered user {}", user.id);
    session_response(user, &config, StatusCode::CREATED)
}

/// Authenticates a customer and returns a session.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let user = authenticate(&pool, &payload).await?;
    let user = touch_last_login(&pool, user.id).await?;

    session_response(user, &config, StatusCode::OK)
}

/// Login for the admin panel. Same as `login` but only admins and
/// superadmins get a session.
pub async fn admin_login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let user = authenticate(&pool, &payload).await?;
    if !user.role().is_admin() {
        tracing::warn!("Non-admin user {} attempted admin login", user.id);
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    let user = touch_last_login(&pool, user.id).await?;

    session_response(user, &config, StatusCode::OK)
}

/// Signs in with a Firebase (Google) ID token, creating the account on
/// first use.
pub async fn google_login(
    State(state): State<AppState>,
    Json(payload): Json<GoogleLoginRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let verifier = state
        .firebase
        .as_ref()
        .ok_or(AppError::ServiceUnavailable("Google login is not configured".to_string()))?;

    let identity = verifier.verify(&payload.id_token).await?;
    let email = normalize_email(&identity.email);

    let user = match find_by_email(&state.pool, &email).await? {
        Some(user) => user,
        None => {
            let name = identity
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or("Customer").to_string());
            // Google accounts get an unguessable password; they sign in via Google
            // or reset it by email.
            let placeholder = hash_password(&random_token(32))?;

            let sql = format!(
                r#"
                INSERT INTO users (name, email, password, profile_image)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
                RETURNING {}
                "#,
                USER_COLUMNS
            );
            let user: User = sqlx::query_as(&sql)
                .bind(name)
                .bind(&email)
                .bind(placeholder)
                .bind(identity.picture.clone())
                .fetch_one(&state.pool)
                .await?;
            tracing::info!("Created user {} from Google account {}", user.id, identity.uid);
            user
        }
    };

    if !user.is_active {
        return Err(AppError::Forbidden("Your account has been deactivated".to_string()));
    }

    let user = touch_last_login(&state.pool, user.id).await?;
    session_response(user, &state.config, StatusCode::OK)
}

/// Clears the session cookie.
pub async fn logout(State(config): State<Config>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_session_cookie(&config))],
        Json(json!({ "message": "Logged out" })),
    )
}

/// Starts a password reset. Always answers 200 so the endpoint cannot be
/// used to probe which emails are registered.
pub async fn forgot_password(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(mailer): State<Arc<dyn Mailer>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    if let Some(user) = find_by_email(&pool, &email).await? {
        let token = random_token(32);
        let expires = chrono::Utc::now() + chrono::Duration::seconds(RESET_TOKEN_TTL_SECS);

        sqlx::query(
            "UPDATE users SET reset_token_hash = $1, reset_token_expires = $2 WHERE id = $3",
        )
        .bind(sha256_hex(&token))
        .bind(expires)
        .bind(user.id)
        .execute(&pool)
        .await?;

        let link = format!(
            "{}/reset-password/{}",
            config.frontend_url.trim_end_matches('/'),
            token
        );
        send_in_background(mailer, password_reset_email(&user.email, &user.name, &link));
        tracing::info!("Password reset requested for user {}", user.id);
    }

    Ok(Json(json!({
        "message": "If an account exists for that email, a reset link has been sent"
    })))
}

/// Completes a password reset with the emailed token.
pub async fn reset_password(
    State(pool): State<PgPool>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed_password = hash_password(&payload.password)?;

    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users
        SET password = $1, reset_token_hash = NULL, reset_token_expires = NULL
        WHERE reset_token_hash = $2 AND reset_token_expires > NOW()
        RETURNING id
        "#,
    )
    .bind(hashed_password)
    .bind(sha256_hex(payload.token.trim()))
    .fetch_optional(&pool)
    .await?;

    let user_id =
        updated.ok_or(AppError::BadRequest("Invalid or expired reset token".to_string()))?;
    tracing::info!("Password reset completed for user {}", user_id);

    Ok(Json(json!({ "message": "Password has been reset" })))
}

/// Returns the authenticated user.
pub async fn me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = load_user(&pool, claims.user_id()?).await?;
    Ok(Json(user))
}
