// src/models/order.rs

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::{Validate, ValidationError};

pub const ORDER_COLUMNS: &str = "id, user_id, items, amount, address, status, payment_method, payment, razorpay_order_id, razorpay_payment_id, date";

/// Fulfilment status. Any status may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "Order Placed")]
    OrderPlaced,
    #[serde(rename = "Packing")]
    Packing,
    #[serde(rename = "Shipped")]
    Shipped,
    #[serde(rename = "Out for delivery")]
    OutForDelivery,
    #[serde(rename = "Delivered")]
    Delivered,
    #[serde(rename = "Cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::OrderPlaced,
        OrderStatus::Packing,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::OrderPlaced => "Order Placed",
            OrderStatus::Packing => "Packing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::OutForDelivery => "Out for delivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown order status '{}'", s))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "COD")]
    Cod,
    Razorpay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::Razorpay => "Razorpay",
        }
    }
}

/// Product snapshot stored on the order at checkout time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub name: String,
    pub size: String,
    pub quantity: i32,
    pub price: Decimal,
    pub image: Option<String>,
}

/// Represents the 'orders' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub items: Json<Vec<OrderItem>>,
    pub amount: Decimal,
    /// Free-form address object captured at checkout.
    pub address: Json<serde_json::Value>,
    pub status: String,
    pub payment_method: String,
    pub payment: bool,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub date: chrono::DateTime<chrono::Utc>,
}

/// One requested line at checkout.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct OrderLineRequest {
    pub product_id: i64,
    #[validate(length(min = 1, max = 20))]
    pub size: String,
    #[validate(range(min = 1, max = 99, message = "Quantity must be between 1 and 99"))]
    pub quantity: i32,
}

fn validate_address_object(address: &serde_json::Value) -> Result<(), ValidationError> {
    match address.as_object() {
        Some(map) if !map.is_empty() => Ok(()),
        _ => Err(ValidationError::new("address_must_be_an_object")),
    }
}

/// Checkout body shared by COD and Razorpay.
///
/// `items` defaults to the caller's cart. The address is either a saved
/// address id or a free-form object.
#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    #[validate(nested)]
    pub items: Option<Vec<OrderLineRequest>>,
    #[validate(custom(function = validate_address_object))]
    pub address: Option<serde_json::Value>,
    pub address_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderListParams {
    pub status: Option<String>,
}

/// Client-side confirmation after the Razorpay checkout widget succeeds.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    pub order_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, max = 100))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, max = 200))]
    pub razorpay_signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_parse_case_insensitively() {
        assert_eq!(
            "out for delivery".parse::<OrderStatus>().unwrap(),
            OrderStatus::OutForDelivery
        );
        assert_eq!("Shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("Lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_serializes_with_display_name() {
        let json = serde_json::to_value(OrderStatus::OrderPlaced).unwrap();
        assert_eq!(json, serde_json::json!("Order Placed"));
    }

    #[test]
    fn address_must_be_a_non_empty_object() {
        let req = PlaceOrderRequest {
            items: None,
            address: Some(serde_json::json!("221B Baker Street")),
            address_id: None,
        };
        assert!(req.validate().is_err());

        let req = PlaceOrderRequest {
            items: Some(vec![OrderLineRequest {
                product_id: 1,
                size: "M".into(),
                quantity: 0,
            }]),
            address: Some(serde_json::json!({"street": "221B Baker Street"})),
            address_id: None,
        };
        assert!(req.validate().is_err());
    }
}
