// src/handlers/cart.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::cart::{AddToCartRequest, Cart, CartLine, CartSummary, UpdateCartRequest},
    services::{
        checkout::{clear_cart, load_cart, save_cart},
        inventory::load_products,
    },
    utils::jwt::Claims,
};

/// Loads the cart and locks the owning user row until the transaction ends.
async fn load_cart_for_update(conn: &mut PgConnection, user_id: i64) -> Result<Cart, AppError> {
    let cart: Option<SqlJson<Cart>> =
        sqlx::query_scalar("SELECT cart_data FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(conn)
            .await?;
    cart.map(|c| c.0)
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// Joins cart lines with current product data. Lines for deleted products
/// are left out.
async fn summarize(conn: &mut PgConnection, cart: &Cart) -> Result<CartSummary, AppError> {
    let lines = cart.lines();
    let ids: Vec<i64> = lines.iter().map(|(id, _, _)| *id).collect();
    let products = load_products(conn, &ids).await?;

    let items = lines
        .into_iter()
        .filter_map(|(product_id, size, quantity)| {
            let product = products.get(&product_id)?;
            Some(CartLine {
                product_id,
                name: product.name.clone(),
                image: product.primary_image().map(str::to_string),
                size,
                quantity,
                price: product.price,
                line_total: product.price * Decimal::from(quantity),
            })
        })
        .collect();

    Ok(CartSummary::from_lines(items))
}

/// Rejects unknown products (404) and sizes the product does not offer (400).
async fn check_product_size(
    conn: &mut PgConnection,
    product_id: i64,
    size: &str,
) -> Result<(), AppError> {
    let products = load_products(conn, &[product_id]).await?;
    let product = products
        .get(&product_id)
        .ok_or(AppError::NotFound("Product not found".to_string()))?;
    if !product.offers_size(size) {
        return Err(AppError::BadRequest(format!(
            "Size '{}' is not available for this product",
            size
        )));
    }
    Ok(())
}

/// Gets the caller's cart with totals.
pub async fn get_cart(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let cart = load_cart(&mut conn, claims.user_id()?).await?;
    let summary = summarize(&mut conn, &cart).await?;
    Ok(Json(summary))
}

/// Adds one unit of a product size.
pub async fn add_to_cart(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AddToCartRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    let size = payload.size.trim();

    let mut tx = pool.begin().await?;
    check_product_size(&mut tx, payload.product_id, size).await?;

    let mut cart = load_cart_for_update(&mut tx, user_id).await?;
    cart.add(payload.product_id, size);
    save_cart(&mut tx, user_id, &cart).await?;

    let summary = summarize(&mut tx, &cart).await?;
    tx.commit().await?;

    Ok(Json(summary))
}

/// Sets the quantity of a line; zero removes it.
pub async fn update_cart(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateCartRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    let size = payload.size.trim();

    let mut tx = pool.begin().await?;
    if payload.quantity > 0 {
        check_product_size(&mut tx, payload.product_id, size).await?;
    }

    let mut cart = load_cart_for_update(&mut tx, user_id).await?;
    cart.set_quantity(payload.product_id, size, payload.quantity);
    save_cart(&mut tx, user_id, &cart).await?;

    let summary = summarize(&mut tx, &cart).await?;
    tx.commit().await?;

    Ok(Json(summary))
}

/// Removes one (product, size) line.
pub async fn remove_item(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((product_id, size)): Path<(i64, String)>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let mut cart = load_cart_for_update(&mut tx, user_id).await?;
    if !cart.remove(product_id, &size) {
        return Err(AppError::NotFound("Item not in cart".to_string()));
    }
    save_cart(&mut tx, user_id, &cart).await?;

    let summary = summarize(&mut tx, &cart).await?;
    tx.commit().await?;

    Ok(Json(summary))
}

/// Empties the cart.
pub async fn clear(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    clear_cart(&mut conn, claims.user_id()?).await?;
    Ok(Json(CartSummary::from_lines(Vec::new())))
}
