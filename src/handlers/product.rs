// src/handlers/product.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::AppError,
    models::{
        product::{PRODUCT_COLUMNS, Product, ProductDetail, ProductListParams, ProductPage},
        review::ReviewResponse,
    },
    services::inventory::load_product_inventory,
};

/// Escapes LIKE wildcards so the search term is matched literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &ProductListParams) {
    builder.push(" WHERE TRUE");

    if let Some(category) = params.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        builder.push(" AND category = ");
        builder.push_bind(category.to_string());
    }
    if let Some(sub) = params
        .sub_category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        builder.push(" AND sub_category = ");
        builder.push_bind(sub.to_string());
    }
    if let Some(bestseller) = params.bestseller {
        builder.push(" AND bestseller = ");
        builder.push_bind(bestseller);
    }
    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        builder.push(" AND name ILIKE ");
        builder.push_bind(like_pattern(q));
    }
}

/// Lists products with filters, sorting and pagination.
///
/// Query params: `category`, `sub_category`, `bestseller`, `q`, `sort`,
/// `page`, `limit`.
pub async fn list_products(
    State(pool): State<PgPool>,
    Query(params): Query<ProductListParams>,
) -> Result<impl IntoResponse, AppError> {
    let (page, limit, offset) = params.paging();

    let mut count_query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM products");
    push_filters(&mut count_query, &params);
    let total: i64 = count_query
        .build_query_scalar()
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count products: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM products", PRODUCT_COLUMNS));
    push_filters(&mut query, &params);
    // order_by() only ever yields whitelisted column lists.
    query.push(format!(" ORDER BY {}", params.order_by()));
    query.push(" LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    let products: Vec<Product> = query.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list products: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(ProductPage {
        products,
        total,
        page,
        limit,
    }))
}

/// Loads a product together with its inventory map, or 404.
pub(crate) async fn load_detail(pool: &PgPool, id: i64) -> Result<ProductDetail, AppError> {
    let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
    let product: Product = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Product not found".to_string()))?;

    let mut conn = pool.acquire().await?;
    let rows = load_product_inventory(&mut conn, id).await?;

    Ok(ProductDetail::new(product, rows))
}

/// Gets one product with per-size stock.
pub async fn get_product(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = load_detail(&pool, id).await?;
    Ok(Json(detail))
}

/// Lists a product's reviews, newest first.
pub async fn list_reviews(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    let reviews: Vec<ReviewResponse> = sqlx::query_as(
        r#"
        SELECT r.id, r.product_id, r.user_id, u.name AS user_name,
               r.rating, r.comment, r.created_at, r.updated_at
        FROM reviews r
        JOIN users u ON u.id = r.user_id
        WHERE r.product_id = $1
        ORDER BY r.created_at DESC, r.id DESC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(reviews))
}
