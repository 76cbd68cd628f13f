// src/services/checkout.rs

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, types::Json};

use crate::{
    config::DELIVERY_FEE,
    error::AppError,
    models::{
        address::{ADDRESS_COLUMNS, Address},
        cart::Cart,
        order::{ORDER_COLUMNS, Order, OrderItem, OrderLineRequest, OrderStatus, PaymentMethod, PlaceOrderRequest},
    },
    services::inventory::{self, find_stock_issues, merge_lines, snapshot_items},
};

/// A validated order, priced and ready to insert.
#[derive(Debug)]
pub struct PreparedOrder {
    pub items: Vec<OrderItem>,
    pub amount: Decimal,
    pub address: serde_json::Value,
}

/// Σ price·qty plus the delivery fee.
pub fn order_amount(items: &[OrderItem]) -> Decimal {
    let subtotal: Decimal = items
        .iter()
        .map(|i| i.price * Decimal::from(i.quantity))
        .sum();
    subtotal + DELIVERY_FEE
}

pub async fn load_cart(conn: &mut PgConnection, user_id: i64) -> Result<Cart, AppError> {
    let cart: Option<Json<Cart>> = sqlx::query_scalar("SELECT cart_data FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    cart.map(|c| c.0)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn save_cart(conn: &mut PgConnection, user_id: i64, cart: &Cart) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET cart_data = $1 WHERE id = $2")
        .bind(Json(cart))
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn clear_cart(conn: &mut PgConnection, user_id: i64) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET cart_data = '{}'::jsonb WHERE id = $1")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Picks the shipping address: a saved address by id, an inline object, or
/// the user's default address, in that order.
async fn resolve_address(
    conn: &mut PgConnection,
    user_id: i64,
    req: &PlaceOrderRequest,
) -> Result<serde_json::Value, AppError> {
    if let Some(address_id) = req.address_id {
        let sql = format!(
            "SELECT {} FROM addresses WHERE id = $1 AND user_id = $2",
            ADDRESS_COLUMNS
        );
        let address: Address = sqlx::query_as(&sql)
            .bind(address_id)
            .bind(user_id)
            .fetch_optional(conn)
            .await?
            .ok_or(AppError::NotFound("Address not found".to_string()))?;
        return Ok(address.to_order_snapshot());
    }

    if let Some(address) = &req.address {
        return Ok(address.clone());
    }

    let sql = format!(
        "SELECT {} FROM addresses WHERE user_id = $1 AND is_default",
        ADDRESS_COLUMNS
    );
    let default: Option<Address> = sqlx::query_as(&sql)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

    default
        .map(|a| a.to_order_snapshot())
        .ok_or(AppError::BadRequest("A delivery address is required".to_string()))
}

/// Validates the requested lines (or the cart) against stock and snapshots
/// product data. Stock problems surface as `AppError::StockError` before
/// anything is written.
pub async fn prepare_order(
    conn: &mut PgConnection,
    user_id: i64,
    req: &PlaceOrderRequest,
) -> Result<PreparedOrder, AppError> {
    let requested: Vec<OrderLineRequest> = match &req.items {
        Some(items) => items.clone(),
        None => load_cart(&mut *conn, user_id)
            .await?
            .lines()
            .into_iter()
            .map(|(product_id, size, quantity)| OrderLineRequest {
                product_id,
                size,
                quantity,
            })
            .collect(),
    };

    let lines = merge_lines(&requested);
    if lines.is_empty() {
        return Err(AppError::BadRequest("Your cart is empty".to_string()));
    }

    let ids: Vec<i64> = lines.iter().map(|l| l.product_id).collect();
    let products = inventory::load_products(&mut *conn, &ids).await?;
    let levels = inventory::load_inventory(&mut *conn, &ids).await?;

    let issues = find_stock_issues(&lines, &products, &levels);
    if !issues.is_empty() {
        return Err(AppError::StockError(issues));
    }

    let items = snapshot_items(&lines, &products)?;
    let address = resolve_address(&mut *conn, user_id, req).await?;

    Ok(PreparedOrder {
        amount: order_amount(&items),
        items,
        address,
    })
}

pub async fn insert_order(
    conn: &mut PgConnection,
    user_id: i64,
    prepared: &PreparedOrder,
    method: PaymentMethod,
) -> Result<Order, AppError> {
    let sql = format!(
        r#"
        INSERT INTO orders (user_id, items, amount, address, status, payment_method, payment)
        VALUES ($1, $2, $3, $4, $5, $6, FALSE)
        RETURNING {}
        "#,
        ORDER_COLUMNS
    );
    let order = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(Json(&prepared.items))
        .bind(prepared.amount)
        .bind(Json(&prepared.address))
        .bind(OrderStatus::OrderPlaced.as_str())
        .bind(method.as_str())
        .fetch_one(conn)
        .await?;
    Ok(order)
}

/// Result of confirming a captured payment.
#[derive(Debug)]
pub enum PaymentOutcome {
    /// The order was already paid; nothing changed.
    AlreadyPaid(Order),
    /// The order is now paid. `short_items` could not be covered by stock.
    Confirmed {
        order: Order,
        short_items: Vec<OrderItem>,
    },
}

impl PaymentOutcome {
    pub fn order(&self) -> &Order {
        match self {
            PaymentOutcome::AlreadyPaid(order) => order,
            PaymentOutcome::Confirmed { order, .. } => order,
        }
    }
}

/// How a captured payment identifies its order.
#[derive(Debug, Clone)]
pub enum OrderRef {
    Id(i64),
    RazorpayOrderId(String),
}

/// Marks an order paid exactly once.
///
/// The order row is locked for the duration of the transaction, so the
/// client verification call and the webhook cannot both decrement stock.
/// A second confirmation for a paid order returns `AlreadyPaid` and does
/// not touch inventory.
pub async fn confirm_payment(
    pool: &PgPool,
    order_ref: &OrderRef,
    payment_id: &str,
) -> Result<PaymentOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let order: Option<Order> = match order_ref {
        OrderRef::Id(id) => {
            let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
            sqlx::query_as(&sql).bind(id).fetch_optional(&mut *tx).await?
        }
        OrderRef::RazorpayOrderId(rzp_id) => {
            let sql = format!(
                "SELECT {} FROM orders WHERE razorpay_order_id = $1 FOR UPDATE",
                ORDER_COLUMNS
            );
            sqlx::query_as(&sql).bind(rzp_id).fetch_optional(&mut *tx).await?
        }
    };

    let order = order.ok_or(AppError::NotFound("Order not found".to_string()))?;

    if order.payment {
        return Ok(PaymentOutcome::AlreadyPaid(order));
    }

    let short_items = inventory::decrement_after_payment(&mut *tx, &order.items).await?;

    let sql = format!(
        "UPDATE orders SET payment = TRUE, razorpay_payment_id = $2 WHERE id = $1 RETURNING {}",
        ORDER_COLUMNS
    );
    let order: Order = sqlx::query_as(&sql)
        .bind(order.id)
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await?;

    clear_cart(&mut *tx, order.user_id).await?;

    tx.commit().await?;

    Ok(PaymentOutcome::Confirmed { order, short_items })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_includes_delivery_fee() {
        let items = vec![
            OrderItem {
                product_id: 1,
                name: "Tee".into(),
                size: "M".into(),
                quantity: 2,
                price: Decimal::new(49950, 2),
                image: None,
            },
            OrderItem {
                product_id: 2,
                name: "Cap".into(),
                size: "OS".into(),
                quantity: 1,
                price: Decimal::new(100, 0),
                image: None,
            },
        ];
        assert_eq!(order_amount(&items), Decimal::new(110900, 2));
    }
}
