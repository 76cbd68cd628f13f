// src/handlers/admin.rs

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::product::load_detail,
    models::{
        order::{ORDER_COLUMNS, Order, OrderListParams, OrderStatus, UpdateOrderStatusRequest},
        product::{
            CreateProductRequest, InventoryLevel, InventoryUpdate, UpdateProductRequest,
        },
        user::{USER_COLUMNS, User},
    },
    services::inventory::set_levels,
    utils::html::clean_html,
};

/// Starting stock for every offered size. Entries for sizes the product
/// does not offer are rejected.
fn initial_levels(
    sizes: &[String],
    inventory: &BTreeMap<String, i32>,
) -> Result<BTreeMap<String, InventoryLevel>, AppError> {
    if let Some(unknown) = inventory.keys().find(|k| !sizes.contains(k)) {
        return Err(AppError::BadRequest(format!(
            "Inventory given for unknown size '{}'",
            unknown
        )));
    }
    Ok(sizes
        .iter()
        .map(|size| {
            let stock = inventory.get(size).copied().unwrap_or(0).max(0);
            (
                size.clone(),
                InventoryLevel {
                    stock,
                    available: stock > 0,
                },
            )
        })
        .collect())
}

fn trimmed(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_string()).collect()
}

/// Creates a product with one inventory row per size.
/// Admin only.
pub async fn create_product(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let sizes = trimmed(&payload.sizes);
    let levels = initial_levels(&sizes, &payload.inventory)?;

    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO products
        (name, description, price, images, category, sub_category, sizes, bestseller)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(payload.name.trim())
    .bind(clean_html(&payload.description))
    .bind(payload.price)
    .bind(SqlJson(trimmed(&payload.images)))
    .bind(payload.category.trim())
    .bind(payload.sub_category.trim())
    .bind(SqlJson(&sizes))
    .bind(payload.bestseller)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create product: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    set_levels(&mut tx, id, &levels).await?;
    tx.commit().await?;

    tracing::info!("Created product {}", id);
    let detail = load_detail(&pool, id).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Updates product fields. Only the fields present in the body change.
/// Admin only.
pub async fn update_product(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let mut tx = pool.begin().await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE products SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = &payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name.trim().to_string());
    }
    if let Some(description) = &payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(description));
    }
    if let Some(price) = payload.price {
        separated.push("price = ");
        separated.push_bind_unseparated(price);
    }
    if let Some(images) = &payload.images {
        separated.push("images = ");
        separated.push_bind_unseparated(SqlJson(trimmed(images)));
    }
    if let Some(category) = &payload.category {
        separated.push("category = ");
        separated.push_bind_unseparated(category.trim().to_string());
    }
    if let Some(sub_category) = &payload.sub_category {
        separated.push("sub_category = ");
        separated.push_bind_unseparated(sub_category.trim().to_string());
    }
    let sizes = payload.sizes.as_deref().map(trimmed);
    if let Some(sizes) = &sizes {
        separated.push("sizes = ");
        separated.push_bind_unseparated(SqlJson(sizes.clone()));
    }
    if let Some(bestseller) = payload.bestseller {
        separated.push("bestseller = ");
        separated.push_bind_unseparated(bestseller);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&mut *tx).await.map_err(|e| {
        tracing::error!("Failed to update product {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    // Keep one inventory row per offered size.
    if let Some(sizes) = &sizes {
        sqlx::query("DELETE FROM product_inventory WHERE product_id = $1 AND NOT (size = ANY($2))")
            .bind(id)
            .bind(sizes)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO product_inventory (product_id, size, stock, available)
            SELECT $1, s, 0, FALSE FROM UNNEST($2::text[]) AS s
            ON CONFLICT (product_id, size) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(sizes)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let detail = load_detail(&pool, id).await?;
    Ok(Json(detail))
}

/// Deletes a product with its inventory and reviews.
/// Admin only.
pub async fn delete_product(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete product {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    tracing::info!("Deleted product {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Sets absolute stock for some of a product's sizes.
/// Body: `{ "M": { "stock": 5 }, "L": { "stock": 0, "available": false } }`.
pub async fn update_inventory(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<BTreeMap<String, InventoryUpdate>>,
) -> Result<impl IntoResponse, AppError> {
    if payload.is_empty() {
        return Err(AppError::BadRequest("No inventory changes given".to_string()));
    }

    let mut tx = pool.begin().await?;

    let sizes: Option<SqlJson<Vec<String>>> =
        sqlx::query_scalar("SELECT sizes FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let sizes = sizes
        .ok_or(AppError::NotFound("Product not found".to_string()))?
        .0;

    let mut levels = BTreeMap::new();
    for (size, update) in payload {
        if !sizes.contains(&size) {
            return Err(AppError::BadRequest(format!(
                "Product has no size '{}'",
                size
            )));
        }
        let stock = update.stock.max(0);
        levels.insert(
            size,
            InventoryLevel {
                stock,
                available: update.available.unwrap_or(stock > 0),
            },
        );
    }

    set_levels(&mut tx, id, &levels).await?;
    tx.commit().await?;

    let detail = load_detail(&pool, id).await?;
    Ok(Json(detail))
}

/// Lists all orders, optionally filtered by status.
/// Admin only.
pub async fn list_orders(
    State(pool): State<PgPool>,
    Query(params): Query<OrderListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));

    if let Some(raw) = params.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status: OrderStatus = raw.parse().map_err(AppError::BadRequest)?;
        builder.push(" WHERE status = ");
        builder.push_bind(status.as_str());
    }
    builder.push(" ORDER BY date DESC, id DESC");

    let orders: Vec<Order> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list orders: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(orders))
}

/// Moves an order to any status.
/// Admin only.
pub async fn update_order_status(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let status: OrderStatus = payload.status.parse().map_err(AppError::BadRequest)?;

    let sql = format!(
        "UPDATE orders SET status = $1 WHERE id = $2 RETURNING {}",
        ORDER_COLUMNS
    );
    let order: Order = sqlx::query_as(&sql)
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Order not found".to_string()))?;

    tracing::info!("Order {} moved to '{}'", order.id, status);
    Ok(Json(order))
}

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let sql = format!("SELECT {} FROM users ORDER BY id DESC", USER_COLUMNS);
    let users: Vec<User> = sqlx::query_as(&sql).fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

#[derive(Debug, Serialize, FromRow)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_products: i64,
    pub total_orders: i64,
    pub pending_orders: i64,
    /// Sum of paid order amounts.
    pub revenue: Decimal,
    /// Inventory rows with no stock left.
    pub out_of_stock: i64,
}

/// Store-wide totals for the admin dashboard.
pub async fn dashboard(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let stats: DashboardStats = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS total_users,
            (SELECT COUNT(*) FROM products) AS total_products,
            (SELECT COUNT(*) FROM orders) AS total_orders,
            (SELECT COUNT(*) FROM orders
                WHERE status NOT IN ('Delivered', 'Cancelled')) AS pending_orders,
            (SELECT COALESCE(SUM(amount), 0) FROM orders WHERE payment) AS revenue,
            (SELECT COUNT(*) FROM product_inventory WHERE stock = 0) AS out_of_stock
        "#,
    )
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load dashboard stats: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_levels_default_to_zero_stock() {
        let sizes = vec!["S".to_string(), "M".to_string()];
        let inventory: BTreeMap<String, i32> = [("M".to_string(), 4)].into_iter().collect();

        let levels = initial_levels(&sizes, &inventory).unwrap();
        assert_eq!(
            levels["S"],
            InventoryLevel {
                stock: 0,
                available: false
            }
        );
        assert_eq!(
            levels["M"],
            InventoryLevel {
                stock: 4,
                available: true
            }
        );
    }

    #[test]
    fn initial_levels_reject_unknown_sizes() {
        let sizes = vec!["S".to_string()];
        let inventory: BTreeMap<String, i32> = [("XXL".to_string(), 1)].into_iter().collect();
        assert!(matches!(
            initial_levels(&sizes, &inventory),
            Err(AppError::BadRequest(_))
        ));
    }
}
