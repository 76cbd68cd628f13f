// src/handlers/order.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::CURRENCY,
    error::AppError,
    handlers::auth::load_user,
    models::order::{ORDER_COLUMNS, Order, PaymentMethod, PlaceOrderRequest, VerifyPaymentRequest},
    services::{
        checkout::{self, OrderRef, PaymentOutcome},
        inventory,
        mailer::{order_confirmation_email, send_in_background},
        razorpay::to_paise,
    },
    state::AppState,
    utils::jwt::Claims,
};

/// Emails the order owner a confirmation. Failures are logged only.
pub(crate) async fn notify_order_confirmed(state: &AppState, order: &Order) {
    match load_user(&state.pool, order.user_id).await {
        Ok(user) => send_in_background(
            state.mailer.clone(),
            order_confirmation_email(&user.email, &user.name, order),
        ),
        Err(e) => tracing::warn!("No confirmation email for order {}: {}", order.id, e),
    }
}

/// Logs what a payment confirmation did.
pub(crate) fn log_payment_outcome(outcome: &PaymentOutcome, source: &str) {
    match outcome {
        PaymentOutcome::AlreadyPaid(order) => {
            tracing::info!("Order {} already processed ({})", order.id, source);
        }
        PaymentOutcome::Confirmed { order, short_items } => {
            tracing::info!("Order {} marked paid ({})", order.id, source);
            if !short_items.is_empty() {
                tracing::warn!(
                    "Order {} paid with {} line(s) lacking stock",
                    order.id,
                    short_items.len()
                );
            }
        }
    }
}

/// Places a cash-on-delivery order.
///
/// Stock is decremented in the same transaction as the order insert. Any
/// line that no longer has enough stock rolls the whole order back.
pub async fn place_cod(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = state.pool.begin().await?;

    let prepared = checkout::prepare_order(&mut tx, user_id, &payload).await?;
    let order = checkout::insert_order(&mut tx, user_id, &prepared, PaymentMethod::Cod).await?;
    inventory::reserve_stock(&mut tx, &prepared.items).await?;
    checkout::clear_cart(&mut tx, user_id).await?;

    tx.commit().await.map_err(|e| {
        tracing::error!("Failed to commit COD order: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!("COD order {} placed by user {}", order.id, user_id);
    notify_order_confirmed(&state, &order).await;

    Ok((StatusCode::CREATED, Json(order)))
}

/// Starts an online payment: creates an unpaid order and the matching
/// Razorpay order. Stock is taken only once payment is captured.
pub async fn place_razorpay(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let razorpay = state
        .razorpay
        .clone()
        .ok_or(AppError::ServiceUnavailable("Online payments are not configured".to_string()))?;

    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = state.pool.begin().await?;

    let prepared = checkout::prepare_order(&mut tx, user_id, &payload).await?;
    let order =
        checkout::insert_order(&mut tx, user_id, &prepared, PaymentMethod::Razorpay).await?;

    // Still inside the transaction: a failed Razorpay call rolls the order back.
    let rzp_order = razorpay
        .create_order(to_paise(order.amount)?, CURRENCY, order.id)
        .await?;

    let sql = format!(
        "UPDATE orders SET razorpay_order_id = $1 WHERE id = $2 RETURNING {}",
        ORDER_COLUMNS
    );
    let order: Order = sqlx::query_as(&sql)
        .bind(&rzp_order.id)
        .bind(order.id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "Razorpay order {} created for order {}",
        rzp_order.id,
        order.id
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "order": order,
            "razorpay_order": rzp_order,
            "key_id": razorpay.key_id(),
        })),
    ))
}

/// Confirms a payment reported by the checkout widget.
pub async fn verify_razorpay(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let razorpay = state
        .razorpay
        .clone()
        .ok_or(AppError::ServiceUnavailable("Online payments are not configured".to_string()))?;

    payload.validate()?;
    let user_id = claims.user_id()?;

    if !razorpay.verify_payment_signature(
        &payload.razorpay_order_id,
        &payload.razorpay_payment_id,
        &payload.razorpay_signature,
    ) {
        tracing::warn!("Invalid payment signature for order {}", payload.order_id);
        return Err(AppError::BadRequest("Invalid payment signature".to_string()));
    }

    let row: Option<(i64, Option<String>)> =
        sqlx::query_as("SELECT user_id, razorpay_order_id FROM orders WHERE id = $1")
            .bind(payload.order_id)
            .fetch_optional(&state.pool)
            .await?;

    let (_, rzp_order_id) = row
        .filter(|(owner, _)| *owner == user_id)
        .ok_or(AppError::NotFound("Order not found".to_string()))?;

    if rzp_order_id.as_deref() != Some(payload.razorpay_order_id.as_str()) {
        return Err(AppError::BadRequest(
            "Payment does not belong to this order".to_string(),
        ));
    }

    let outcome = checkout::confirm_payment(
        &state.pool,
        &OrderRef::Id(payload.order_id),
        &payload.razorpay_payment_id,
    )
    .await?;

    log_payment_outcome(&outcome, "client verification");
    if let PaymentOutcome::Confirmed { order, .. } = &outcome {
        notify_order_confirmed(&state, order).await;
    }

    Ok(Json(json!({ "success": true, "order": outcome.order() })))
}

/// Lists the caller's orders, newest first.
pub async fn list_my_orders(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let sql = format!(
        "SELECT {} FROM orders WHERE user_id = $1 ORDER BY date DESC, id DESC",
        ORDER_COLUMNS
    );
    let orders: Vec<Order> = sqlx::query_as(&sql)
        .bind(claims.user_id()?)
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list orders: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(orders))
}

/// Gets one of the caller's orders. Other users' orders are reported as 404.
pub async fn get_my_order(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let sql = format!(
        "SELECT {} FROM orders WHERE id = $1 AND user_id = $2",
        ORDER_COLUMNS
    );
    let order: Order = sqlx::query_as(&sql)
        .bind(id)
        .bind(claims.user_id()?)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Order not found".to_string()))?;

    Ok(Json(order))
}
