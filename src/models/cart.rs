// src/models/cart.rs

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::DELIVERY_FEE;

/// Largest quantity of a single (product, size) line.
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Contents of `users.cart_data`: `{ "<product_id>": { "<size>": quantity } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart(pub BTreeMap<String, BTreeMap<String, i32>>);

impl Cart {
    pub fn quantity(&self, product_id: i64, size: &str) -> i32 {
        self.0
            .get(&product_id.to_string())
            .and_then(|sizes| sizes.get(size))
            .copied()
            .unwrap_or(0)
    }

    /// Adds one unit of (product, size) and returns the new quantity.
    pub fn add(&mut self, product_id: i64, size: &str) -> i32 {
        let qty = self
            .0
            .entry(product_id.to_string())
            .or_default()
            .entry(size.to_string())
            .or_insert(0);
        *qty = (*qty + 1).min(MAX_LINE_QUANTITY);
        *qty
    }

    /// Sets the quantity of a line. Zero (or less) removes it.
    pub fn set_quantity(&mut self, product_id: i64, size: &str, quantity: i32) {
        if quantity <= 0 {
            self.remove(product_id, size);
            return;
        }
        self.0
            .entry(product_id.to_string())
            .or_default()
            .insert(size.to_string(), quantity.min(MAX_LINE_QUANTITY));
    }

    /// Removes a line; returns whether it existed.
    pub fn remove(&mut self, product_id: i64, size: &str) -> bool {
        let key = product_id.to_string();
        let Some(sizes) = self.0.get_mut(&key) else {
            return false;
        };
        let removed = sizes.remove(size).is_some();
        if sizes.is_empty() {
            self.0.remove(&key);
        }
        removed
    }

    /// Positive lines as (product_id, size, quantity). Malformed keys are skipped.
    pub fn lines(&self) -> Vec<(i64, String, i32)> {
        self.0
            .iter()
            .filter_map(|(pid, sizes)| pid.parse::<i64>().ok().map(|pid| (pid, sizes)))
            .flat_map(|(pid, sizes)| {
                sizes
                    .iter()
                    .filter(|(_, qty)| **qty > 0)
                    .map(move |(size, qty)| (pid, size.clone(), *qty))
            })
            .collect()
    }

    pub fn total_items(&self) -> i32 {
        self.lines().iter().map(|(_, _, qty)| qty).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }
}

/// A cart line joined with current product data.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub image: Option<String>,
    pub size: String,
    pub quantity: i32,
    pub price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CartSummary {
    pub items: Vec<CartLine>,
    pub total_items: i32,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

impl CartSummary {
    /// Delivery is charged only on a non-empty cart.
    pub fn from_lines(items: Vec<CartLine>) -> Self {
        let subtotal: Decimal = items.iter().map(|l| l.line_total).sum();
        let total_items = items.iter().map(|l| l.quantity).sum();
        let delivery_fee = if items.is_empty() {
            Decimal::ZERO
        } else {
            DELIVERY_FEE
        };
        Self {
            items,
            total_items,
            subtotal,
            delivery_fee,
            total: subtotal + delivery_fee,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: i64,
    #[validate(length(min = 1, max = 20))]
    pub size: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartRequest {
    pub product_id: i64,
    #[validate(length(min = 1, max = 20))]
    pub size: String,
    #[validate(range(min = 0, max = 99, message = "Quantity must be between 0 and 99"))]
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_increments_and_remove_drops_empty_products() {
        let mut cart = Cart::default();
        assert_eq!(cart.add(7, "M"), 1);
        assert_eq!(cart.add(7, "M"), 2);
        cart.add(7, "L");
        assert_eq!(cart.total_items(), 3);

        assert!(cart.remove(7, "M"));
        assert!(!cart.remove(7, "M"));
        assert!(cart.remove(7, "L"));
        assert!(cart.0.is_empty());
    }

    #[test]
    fn zero_quantity_removes_line() {
        let mut cart = Cart::default();
        cart.set_quantity(3, "S", 4);
        assert_eq!(cart.quantity(3, "S"), 4);
        cart.set_quantity(3, "S", 0);
        assert_eq!(cart.quantity(3, "S"), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn quantities_are_capped() {
        let mut cart = Cart::default();
        cart.set_quantity(1, "M", 500);
        assert_eq!(cart.quantity(1, "M"), MAX_LINE_QUANTITY);
        assert_eq!(cart.add(1, "M"), MAX_LINE_QUANTITY);
    }

    #[test]
    fn malformed_entries_are_ignored() {
        let cart: Cart =
            serde_json::from_value(serde_json::json!({"abc": {"M": 2}, "5": {"L": 1, "S": 0}}))
                .unwrap();
        assert_eq!(cart.lines(), vec![(5, "L".to_string(), 1)]);
    }

    #[test]
    fn summary_adds_delivery_only_when_not_empty() {
        let empty = CartSummary::from_lines(vec![]);
        assert_eq!(empty.total, Decimal::ZERO);

        let line = CartLine {
            product_id: 1,
            name: "Tee".into(),
            image: None,
            size: "M".into(),
            quantity: 2,
            price: Decimal::new(2500, 2),
            line_total: Decimal::new(5000, 2),
        };
        let summary = CartSummary::from_lines(vec![line]);
        assert_eq!(summary.subtotal, Decimal::new(5000, 2));
        assert_eq!(summary.total, Decimal::new(6000, 2));
        assert_eq!(summary.total_items, 2);
    }
}
