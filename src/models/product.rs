// src/models/product.rs

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::{Validate, ValidationError};

use crate::utils::validation::{validate_image_urls, validate_sizes};

pub const PRODUCT_COLUMNS: &str = "id, name, description, price, images, category, sub_category, sizes, bestseller, average_rating, total_reviews, created_at";

/// Represents the 'products' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Decimal,

    /// Up to four hosted image URLs, stored as a JSON array.
    pub images: Json<Vec<String>>,

    pub category: String,
    pub sub_category: String,

    /// Sizes offered, stored as a JSON array.
    pub sizes: Json<Vec<String>>,

    pub bestseller: bool,

    /// Recomputed from `reviews` on every review mutation.
    pub average_rating: f64,
    pub total_reviews: i64,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Product {
    pub fn offers_size(&self, size: &str) -> bool {
        self.sizes.iter().any(|s| s == size)
    }

    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// One row of 'product_inventory'.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryRow {
    pub product_id: i64,
    pub size: String,
    pub stock: i32,
    pub available: bool,
}

/// Stock level of one size, as exposed in the inventory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub stock: i32,
    pub available: bool,
}

/// Product plus its per-size inventory map.
#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub inventory: BTreeMap<String, InventoryLevel>,
}

impl ProductDetail {
    pub fn new(product: Product, rows: Vec<InventoryRow>) -> Self {
        let inventory = rows
            .into_iter()
            .map(|r| {
                (
                    r.size,
                    InventoryLevel {
                        stock: r.stock,
                        available: r.available,
                    },
                )
            })
            .collect();
        Self { product, inventory }
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || price.scale() > 2 && price.round_dp(2) != *price {
        return Err(ValidationError::new("invalid_price"));
    }
    Ok(())
}

/// DTO for creating a product (admin).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    #[validate(custom(function = validate_price))]
    pub price: Decimal,
    #[validate(custom(function = validate_image_urls))]
    pub images: Vec<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
    #[validate(length(min = 1, max = 50))]
    pub sub_category: String,
    #[validate(custom(function = validate_sizes))]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub bestseller: bool,
    /// Initial stock per size; sizes left out start at zero.
    #[serde(default)]
    pub inventory: BTreeMap<String, i32>,
}

/// DTO for updating a product. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub description: Option<String>,
    #[validate(custom(function = validate_price))]
    pub price: Option<Decimal>,
    #[validate(custom(function = validate_image_urls))]
    pub images: Option<Vec<String>>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub sub_category: Option<String>,
    #[validate(custom(function = validate_sizes))]
    pub sizes: Option<Vec<String>>,
    pub bestseller: Option<bool>,
}

impl UpdateProductRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.images.is_none()
            && self.category.is_none()
            && self.sub_category.is_none()
            && self.sizes.is_none()
            && self.bestseller.is_none()
    }
}

/// Body of the inventory update: `{ "<size>": { "stock": n, "available": b } }`.
#[derive(Debug, Deserialize)]
pub struct InventoryUpdate {
    pub stock: i32,
    pub available: Option<bool>,
}

const MAX_PAGE: i64 = i64::MAX / 100;

/// Query parameters for listing products.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub bestseller: Option<bool>,
    /// Case-insensitive name search.
    pub q: Option<String>,
    /// 'newest' (default), 'price_asc', 'price_desc' or 'rating'.
    pub sort: Option<String>,
    pub page: Option<i64>,
    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
}

impl ProductListParams {
    pub fn order_by(&self) -> &'static str {
        match self.sort.as_deref() {
            Some("price_asc") => "price ASC, id DESC",
            Some("price_desc") => "price DESC, id DESC",
            Some("rating") => "average_rating DESC, total_reviews DESC, id DESC",
            _ => "created_at DESC, id DESC",
        }
    }

    /// Returns (page, limit, offset) with page >= 1 and limit in 1..=100.
    /// The page is capped so the offset always fits in an i64.
    pub fn paging(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        (page, limit, (page - 1) * limit)
    }
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}
