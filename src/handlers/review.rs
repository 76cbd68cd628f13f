// src/handlers/review.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::review::{CreateReviewRequest, RatingSummary, ReviewResponse, UpdateReviewRequest},
    utils::{html::clean_html, jwt::Claims},
};

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.product_id, r.user_id, u.name AS user_name,
           r.rating, r.comment, r.created_at, r.updated_at
    FROM reviews r
    JOIN users u ON u.id = r.user_id
"#;

/// Locks the product row so concurrent review writes recompute in turn.
async fn lock_product(conn: &mut PgConnection, product_id: i64) -> Result<(), AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    found
        .map(|_| ())
        .ok_or(AppError::NotFound("Product not found".to_string()))
}

/// Rewrites `average_rating` (one decimal) and `total_reviews` from the
/// reviews table.
async fn recompute_rating(
    conn: &mut PgConnection,
    product_id: i64,
) -> Result<RatingSummary, AppError> {
    let summary = sqlx::query_as(
        r#"
        UPDATE products SET
            average_rating = COALESCE(
                (SELECT ROUND(AVG(rating)::numeric, 1) FROM reviews WHERE product_id = $1),
                0
            )::float8,
            total_reviews = (SELECT COUNT(*) FROM reviews WHERE product_id = $1)
        WHERE id = $1
        RETURNING average_rating, total_reviews
        "#,
    )
    .bind(product_id)
    .fetch_one(conn)
    .await?;
    Ok(summary)
}

async fn fetch_review(
    conn: &mut PgConnection,
    product_id: i64,
    review_id: i64,
) -> Result<ReviewResponse, AppError> {
    let sql = format!("{} WHERE r.id = $1 AND r.product_id = $2", REVIEW_SELECT);
    sqlx::query_as(&sql)
        .bind(review_id)
        .bind(product_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::NotFound("Review not found".to_string()))
}

/// Posts a review. One review per user and product.
pub async fn create_review(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(product_id): Path<i64>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let comment = clean_html(payload.comment.trim());
    if comment.trim().is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".to_string()));
    }

    let mut tx = pool.begin().await?;
    lock_product(&mut tx, product_id).await?;

    let review_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO reviews (product_id, user_id, rating, comment)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(product_id)
    .bind(user_id)
    .bind(payload.rating)
    .bind(comment)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("You have already reviewed this product".to_string())
        } else {
            tracing::error!("Failed to create review: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    let rating = recompute_rating(&mut tx, product_id).await?;
    let review = fetch_review(&mut tx, product_id, review_id).await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "review": review, "rating": rating })),
    ))
}

/// Edits a review.
/// Author only.
pub async fn update_review(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((product_id, review_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let comment = match payload.comment.as_deref() {
        Some(raw) => {
            let cleaned = clean_html(raw.trim());
            if cleaned.trim().is_empty() {
                return Err(AppError::BadRequest("Comment cannot be empty".to_string()));
            }
            Some(cleaned)
        }
        None => None,
    };

    let mut tx = pool.begin().await?;
    lock_product(&mut tx, product_id).await?;

    let existing = fetch_review(&mut tx, product_id, review_id).await?;
    if existing.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only edit your own reviews".to_string(),
        ));
    }

    sqlx::query(
        r#"
        UPDATE reviews
        SET rating = COALESCE($1, rating),
            comment = COALESCE($2, comment),
            updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(payload.rating)
    .bind(comment)
    .bind(review_id)
    .execute(&mut *tx)
    .await?;

    let rating = recompute_rating(&mut tx, product_id).await?;
    let review = fetch_review(&mut tx, product_id, review_id).await?;
    tx.commit().await?;

    Ok(Json(json!({ "review": review, "rating": rating })))
}

/// Deletes a review.
/// Author, admin or superadmin.
pub async fn delete_review(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((product_id, review_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    lock_product(&mut tx, product_id).await?;

    let existing = fetch_review(&mut tx, product_id, review_id).await?;
    if existing.user_id != user_id && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "You can only delete your own reviews".to_string(),
        ));
    }

    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(review_id)
        .execute(&mut *tx)
        .await?;

    let rating = recompute_rating(&mut tx, product_id).await?;
    tx.commit().await?;

    if existing.user_id != user_id {
        tracing::info!("Admin {} removed review {}", user_id, review_id);
    }

    Ok(Json(json!({ "message": "Review deleted", "rating": rating })))
}
