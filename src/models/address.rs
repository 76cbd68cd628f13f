// src/models/address.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::utils::validation::{validate_phone, validate_zipcode};

pub const ADDRESS_COLUMNS: &str = "id, user_id, first_name, last_name, phone, street, city, state, zipcode, country, is_default, created_at";

/// Represents the 'addresses' table (a user's address book).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub country: String,
    /// At most one default per user.
    pub is_default: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Address {
    /// Snapshot stored on an order. Later edits to the address book do not
    /// change past orders.
    pub fn to_order_snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "firstName": self.first_name,
            "lastName": self.last_name,
            "phone": self.phone,
            "street": self.street,
            "city": self.city,
            "state": self.state,
            "zipcode": self.zipcode,
            "country": self.country,
        })
    }
}

/// DTO for adding an address.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAddressRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
    #[validate(custom(function = validate_phone))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(custom(function = validate_zipcode))]
    pub zipcode: String,
    #[validate(length(min = 1, max = 100))]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

/// DTO for editing an address. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAddressRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(custom(function = validate_phone))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub street: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub state: Option<String>,
    #[validate(custom(function = validate_zipcode))]
    pub zipcode: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub country: Option<String>,
    pub is_default: Option<bool>,
}
