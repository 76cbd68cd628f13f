// src/models/review.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A review joined with its author's name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReviewResponse {
    pub id: i64,
    pub product_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub rating: i16,
    pub comment: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for posting a review.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment length must be between 1 and 1000 chars"
    ))]
    pub comment: String,
}

/// DTO for editing a review. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i16>,
    #[validate(length(min = 1, max = 1000))]
    pub comment: Option<String>,
}

/// Denormalized rating summary written back to the product row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, FromRow)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub total_reviews: i64,
}
