// src/handlers/webhook.rs

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    handlers::order::{log_payment_outcome, notify_order_confirmed},
    services::{
        checkout::{OrderRef, PaymentOutcome, confirm_payment},
        razorpay::{PaymentEntity, WebhookEvent},
    },
    state::AppState,
};

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

async fn on_payment_captured(state: &AppState, payment: &PaymentEntity) -> Result<(), AppError> {
    let order_ref = match (payment.local_order_id(), payment.order_id.as_ref()) {
        (Some(id), _) => OrderRef::Id(id),
        (None, Some(rzp_id)) => OrderRef::RazorpayOrderId(rzp_id.clone()),
        (None, None) => {
            return Err(AppError::BadRequest(format!(
                "Payment {} carries no order reference",
                payment.id
            )));
        }
    };

    let outcome = confirm_payment(&state.pool, &order_ref, &payment.id).await?;
    log_payment_outcome(&outcome, "webhook");

    if let PaymentOutcome::Confirmed { order, .. } = &outcome {
        notify_order_confirmed(state, order).await;
    }
    Ok(())
}

/// Razorpay webhook receiver.
///
/// The signature is checked against the raw body. Once it is valid the
/// endpoint always acknowledges with 200; processing errors are logged so
/// Razorpay does not keep redelivering.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let razorpay = state
        .razorpay
        .as_ref()
        .ok_or(AppError::ServiceUnavailable("Online payments are not configured".to_string()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::BadRequest("Missing webhook signature".to_string()))?;

    if !razorpay.verify_webhook_signature(&body, signature) {
        tracing::warn!("Rejected Razorpay webhook with invalid signature");
        return Err(AppError::BadRequest("Invalid webhook signature".to_string()));
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!("Unreadable Razorpay webhook payload: {}", e);
            return Ok(Json(json!({ "status": "ignored" })));
        }
    };

    let payment = event.payload.payment.as_ref().map(|p| &p.entity);

    match (event.event.as_str(), payment) {
        ("payment.captured", Some(payment)) => {
            if let Err(e) = on_payment_captured(&state, payment).await {
                tracing::error!("Failed to process captured payment {}: {}", payment.id, e);
            }
        }
        ("payment.failed", Some(payment)) => {
            tracing::warn!(
                "Payment {} failed for order {:?}: {}",
                payment.id,
                payment.order_id,
                payment.error_description.as_deref().unwrap_or("no reason given")
            );
        }
        (other, _) => {
            tracing::debug!("Ignoring Razorpay event {}", other);
        }
    }

    Ok(Json(json!({ "status": "ok" })))
}
