// src/services/razorpay.rs

use hmac::{Hmac, Mac};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{config::RazorpayConfig, error::AppError};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.razorpay.com/v1";

/// Order object returned by `POST /v1/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: serde_json::Value,
}

/// Webhook envelope. Only the parts we act on are modelled.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<PaymentWrapper>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWrapper {
    pub entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: i64,
    /// Razorpay sends `[]` when empty and an object otherwise.
    #[serde(default)]
    pub notes: serde_json::Value,
    pub error_description: Option<String>,
}

impl PaymentEntity {
    /// Our order id, copied into the Razorpay order notes at creation.
    pub fn local_order_id(&self) -> Option<i64> {
        match self.notes.get("order_id")? {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

/// Converts a rupee amount into paise.
pub fn to_paise(amount: Decimal) -> Result<i64, AppError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| AppError::BadRequest("Order amount out of range".to_string()))
}

/// Hex HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of a hex signature against HMAC(secret, payload).
pub fn signature_matches(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

pub struct RazorpayClient {
    http: reqwest::Client,
    config: RazorpayConfig,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            base_url: API_BASE.to_string(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Creates a Razorpay order for `amount_paise`, tagging it with our order id.
    pub async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        local_order_id: i64,
    ) -> Result<RazorpayOrder, AppError> {
        let receipt = format!("order_{}", local_order_id);
        let body = CreateOrderBody {
            amount: amount_paise,
            currency,
            receipt: &receipt,
            notes: serde_json::json!({ "order_id": local_order_id.to_string() }),
        };

        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::InternalServerError(format!("Razorpay request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::InternalServerError(format!(
                "Razorpay order creation failed ({}): {}",
                status, text
            )));
        }

        response
            .json::<RazorpayOrder>()
            .await
            .map_err(|e| AppError::InternalServerError(format!("Invalid Razorpay response: {}", e)))
    }

    /// Checkout signature: HMAC(key_secret, "<order_id>|<payment_id>").
    pub fn verify_payment_signature(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
        signature: &str,
    ) -> bool {
        let payload = format!("{}|{}", razorpay_order_id, razorpay_payment_id);
        signature_matches(&self.config.key_secret, payload.as_bytes(), signature)
    }

    /// Webhook signature: HMAC(webhook_secret, raw body).
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        signature_matches(&self.config.webhook_secret, body, signature)
    }
}
