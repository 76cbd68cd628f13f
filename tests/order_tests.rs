// tests/order_tests.rs

mod common;

use neocart::{
    error::AppError,
    models::{order::OrderItem, user::Role},
    services::{
        inventory::{StockIssueReason, reserve_stock},
        razorpay::sign,
    },
};
use serde_json::{Value, json};

use common::{TestApp, TestUser, WEBHOOK_SECRET, address_json, spawn_app};

async fn place_cod(app: &TestApp, user: &TestUser, body: Value) -> reqwest::Response {
    app.client
        .post(app.url("/api/orders/cod"))
        .bearer_auth(&user.token)
        .json(&body)
        .send()
        .await
        .expect("Failed to place order")
}

async fn order_count(app: &TestApp, user_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&app.pool)
        .await
        .unwrap()
}

/// Inserts an unpaid Razorpay order directly, as if checkout had created it.
async fn insert_unpaid_order(app: &TestApp, user_id: i64, product_id: i64, quantity: i32) -> (i64, String) {
    let rzp_order_id = format!("order_test_{}", uuid::Uuid::new_v4().simple());
    let items = json!([{
        "product_id": product_id,
        "name": "Tee",
        "size": "M",
        "quantity": quantity,
        "price": 300.0,
        "image": null
    }]);
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO orders (user_id, items, amount, address, payment_method, razorpay_order_id)
        VALUES ($1, $2, 610, $3, 'Razorpay', $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(items)
    .bind(address_json())
    .bind(&rzp_order_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    (id, rzp_order_id)
}

async fn send_webhook(app: &TestApp, body: &Value) -> reqwest::Response {
    let raw = body.to_string();
    let signature = sign(WEBHOOK_SECRET, raw.as_bytes()).unwrap();
    app.client
        .post(app.url("/api/webhook/razorpay"))
        .header("Content-Type", "application/json")
        .header("X-Razorpay-Signature", signature)
        .body(raw)
        .send()
        .await
        .unwrap()
}

fn captured_event(payment_id: &str, rzp_order_id: &str, order_id: i64) -> Value {
    json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": rzp_order_id,
                    "amount": 61000,
                    "notes": { "order_id": order_id.to_string() }
                }
            }
        }
    })
}

#[tokio::test]
async fn insufficient_stock_returns_stock_error_and_creates_no_order() {
    let Some(app) = spawn_app().await else { return };

    // Arrange
    let user = app.register().await;
    let product_id = app.create_product("250.00", &[("M", 1)]).await;

    // Act
    let response = place_cod(
        &app,
        &user,
        json!({
            "items": [{ "product_id": product_id, "size": "M", "quantity": 2 }],
            "address": address_json()
        }),
    )
    .await;

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["stockError"], true);
    assert_eq!(body["stockIssues"][0]["reason"], "insufficient_stock");
    assert_eq!(body["stockIssues"][0]["available"], 1);

    assert_eq!(order_count(&app, user.id).await, 0);
    assert_eq!(app.stock(product_id, "M").await, 1);
}

#[tokio::test]
async fn cod_order_from_cart_decrements_stock_and_clears_cart() {
    let Some(app) = spawn_app().await else { return };
    let user = app.register().await;
    let product_id = app.create_product("250.00", &[("M", 5)]).await;

    for _ in 0..2 {
        app.client
            .post(app.url("/api/cart/add"))
            .bearer_auth(&user.token)
            .json(&json!({ "product_id": product_id, "size": "M" }))
            .send()
            .await
            .unwrap();
    }

    let response = place_cod(&app, &user, json!({ "address": address_json() })).await;
    assert_eq!(response.status().as_u16(), 201);

    let order: Value = response.json().await.unwrap();
    assert_eq!(order["amount"].as_f64(), Some(510.0));
    assert_eq!(order["status"], "Order Placed");
    assert_eq!(order["payment_method"], "COD");
    assert_eq!(order["payment"], false);
    assert_eq!(order["items"][0]["quantity"], 2);

    assert_eq!(app.stock(product_id, "M").await, 3);

    let cart: Value = app
        .client
        .get(app.url("/api/cart"))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cart["total_items"], 0);

    let email = app.wait_for_email(&user.email).await;
    assert!(email.subject.contains(&order["id"].to_string()));
}

#[tokio::test]
async fn concurrent_orders_cannot_oversell() {
    let Some(app) = spawn_app().await else { return };
    let first = app.register().await;
    let second = app.register().await;
    let product_id = app.create_product("99.00", &[("M", 1)]).await;

    let body = json!({
        "items": [{ "product_id": product_id, "size": "M", "quantity": 1 }],
        "address": address_json()
    });
    let (a, b) = tokio::join!(
        place_cod(&app, &first, body.clone()),
        place_cod(&app, &second, body.clone())
    );

    let mut statuses = vec![a.status().as_u16(), b.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![201, 400]);
    assert_eq!(app.stock(product_id, "M").await, 0);
}

#[tokio::test]
async fn order_without_any_address_is_rejected() {
    let Some(app) = spawn_app().await else { return };
    let user = app.register().await;
    let product_id = app.create_product("10.00", &[("M", 2)]).await;

    let response = place_cod(
        &app,
        &user,
        json!({ "items": [{ "product_id": product_id, "size": "M", "quantity": 1 }] }),
    )
    .await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.stock(product_id, "M").await, 2);
}

#[tokio::test]
async fn saved_default_address_is_used_when_none_given() {
    let Some(app) = spawn_app().await else { return };
    let user = app.register().await;
    let product_id = app.create_product("10.00", &[("M", 2)]).await;

    app.client
        .post(app.url("/api/profile/addresses"))
        .bearer_auth(&user.token)
        .json(&json!({
            "first_name": "Ravi", "last_name": "Kumar", "phone": "9876543210",
            "street": "1 Park St", "city": "Kolkata", "state": "WB",
            "zipcode": "700016", "country": "India"
        }))
        .send()
        .await
        .unwrap();

    let response = place_cod(
        &app,
        &user,
        json!({ "items": [{ "product_id": product_id, "size": "M", "quantity": 1 }] }),
    )
    .await;

    assert_eq!(response.status().as_u16(), 201);
    let order: Value = response.json().await.unwrap();
    assert_eq!(order["address"]["firstName"], "Ravi");
    assert_eq!(order["address"]["city"], "Kolkata");
}

#[tokio::test]
async fn repeated_payment_captured_webhook_decrements_once() {
    let Some(app) = spawn_app().await else { return };
    let user = app.register().await;
    let product_id = app.create_product("300.00", &[("M", 5)]).await;
    let (order_id, rzp_order_id) = insert_unpaid_order(&app, user.id, product_id, 2).await;

    let event = captured_event("pay_first", &rzp_order_id, order_id);

    // First delivery marks the order paid and takes stock
    let response = send_webhook(&app, &event).await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(app.stock(product_id, "M").await, 3);

    // Redelivery is acknowledged without touching stock
    let response = send_webhook(&app, &event).await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(app.stock(product_id, "M").await, 3);

    let (paid, payment_id): (bool, Option<String>) =
        sqlx::query_as("SELECT payment, razorpay_payment_id FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert!(paid);
    assert_eq!(payment_id.as_deref(), Some("pay_first"));
}

#[tokio::test]
async fn webhook_finds_order_by_razorpay_id_without_notes() {
    let Some(app) = spawn_app().await else { return };
    let user = app.register().await;
    let product_id = app.create_product("300.00", &[("M", 1)]).await;
    let (order_id, rzp_order_id) = insert_unpaid_order(&app, user.id, product_id, 1).await;

    let event = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "id": "pay_x", "order_id": rzp_order_id, "notes": [] } } }
    });
    assert_eq!(send_webhook(&app, &event).await.status().as_u16(), 200);

    let paid: bool = sqlx::query_scalar("SELECT payment FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert!(paid);
    assert_eq!(app.stock(product_id, "M").await, 0);
}

#[tokio::test]
async fn client_verification_and_webhook_share_idempotency() {
    let Some(app) = spawn_app().await else { return };
    let user = app.register().await;
    let product_id = app.create_product("300.00", &[("M", 4)]).await;
    let (order_id, rzp_order_id) = insert_unpaid_order(&app, user.id, product_id, 1).await;

    let signature = sign(
        &common::razorpay_config().key_secret,
        format!("{}|pay_verify", rzp_order_id).as_bytes(),
    )
    .unwrap();

    // A tampered signature is refused
    let response = app
        .client
        .post(app.url("/api/orders/razorpay/verify"))
        .bearer_auth(&user.token)
        .json(&json!({
            "order_id": order_id,
            "razorpay_order_id": rzp_order_id,
            "razorpay_payment_id": "pay_other",
            "razorpay_signature": signature
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.stock(product_id, "M").await, 4);

    let response = app
        .client
        .post(app.url("/api/orders/razorpay/verify"))
        .bearer_auth(&user.token)
        .json(&json!({
            "order_id": order_id,
            "razorpay_order_id": rzp_order_id,
            "razorpay_payment_id": "pay_verify",
            "razorpay_signature": signature
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["order"]["payment"], true);
    assert_eq!(app.stock(product_id, "M").await, 3);

    // The webhook for the same payment arrives afterwards
    let event = captured_event("pay_verify", &rzp_order_id, order_id);
    assert_eq!(send_webhook(&app, &event).await.status().as_u16(), 200);
    assert_eq!(app.stock(product_id, "M").await, 3);
}

#[tokio::test]
async fn users_only_see_their_own_orders() {
    let Some(app) = spawn_app().await else { return };
    let owner = app.register().await;
    let other = app.register().await;
    let product_id = app.create_product("300.00", &[("M", 1)]).await;
    let (order_id, _) = insert_unpaid_order(&app, owner.id, product_id, 1).await;

    let response = app
        .client
        .get(app.url(&format!("/api/orders/{}", order_id)))
        .bearer_auth(&other.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let orders: Vec<Value> = app
        .client
        .get(app.url("/api/orders"))
        .bearer_auth(&owner.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["id"].as_i64(), Some(order_id));
}

#[tokio::test]
async fn admin_manages_products_inventory_and_order_status() {
    let Some(app) = spawn_app().await else { return };
    let admin = app.register_with_role(Role::Admin).await;

    // Create a product with initial stock
    let response = app
        .client
        .post(app.url("/api/admin/products"))
        .bearer_auth(&admin.token)
        .json(&json!({
            "name": "Linen Shirt",
            "description": "Breathable <i>linen</i><script>alert(1)</script>",
            "price": 1299.0,
            "images": ["https://cdn.example.com/linen.png"],
            "category": "Men",
            "sub_category": "Topwear",
            "sizes": ["S", "M"],
            "bestseller": true,
            "inventory": { "M": 7 }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let product: Value = response.json().await.unwrap();
    let product_id = product["id"].as_i64().unwrap();
    assert_eq!(product["inventory"]["M"]["stock"], 7);
    assert_eq!(product["inventory"]["S"]["available"], false);
    assert!(!product["description"].as_str().unwrap().contains("script"));

    // Negative stock clamps to zero; unknown sizes are refused
    let response = app
        .client
        .put(app.url(&format!("/api/admin/products/{}/inventory", product_id)))
        .bearer_auth(&admin.token)
        .json(&json!({ "M": { "stock": -3 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let product: Value = response.json().await.unwrap();
    assert_eq!(product["inventory"]["M"]["stock"], 0);
    assert_eq!(product["inventory"]["M"]["available"], false);

    let response = app
        .client
        .put(app.url(&format!("/api/admin/products/{}/inventory", product_id)))
        .bearer_auth(&admin.token)
        .json(&json!({ "XXL": { "stock": 3 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Move an order through statuses in any order
    let customer = app.register().await;
    let (order_id, _) = insert_unpaid_order(&app, customer.id, product_id, 1).await;
    for status in ["Delivered", "packing"] {
        let response = app
            .client
            .put(app.url(&format!("/api/admin/orders/{}/status", order_id)))
            .bearer_auth(&admin.token)
            .json(&json!({ "status": status }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
    let status: String = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(status, "Packing");

    let response = app
        .client
        .put(app.url(&format!("/api/admin/orders/{}/status", i64::MAX)))
        .bearer_auth(&admin.token)
        .json(&json!({ "status": "Shipped" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .client
        .get(app.url("/api/admin/dashboard"))
        .bearer_auth(&admin.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let stats: Value = response.json().await.unwrap();
    assert!(stats["total_orders"].as_i64().unwrap() >= 1);
    assert!(stats["out_of_stock"].as_i64().unwrap() >= 2);
}

#[tokio::test]
async fn payment_failed_webhook_leaves_order_unpaid() {
    let Some(app) = spawn_app().await else { return };
    let user = app.register().await;
    let product_id = app.create_product("300.00", &[("M", 2)]).await;
    let (order_id, rzp_order_id) = insert_unpaid_order(&app, user.id, product_id, 1).await;

    let event = json!({
        "event": "payment.failed",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_declined",
                    "order_id": rzp_order_id,
                    "notes": { "order_id": order_id.to_string() },
                    "error_description": "Card declined"
                }
            }
        }
    });
    assert_eq!(send_webhook(&app, &event).await.status().as_u16(), 200);

    let (paid, payment_id): (bool, Option<String>) =
        sqlx::query_as("SELECT payment, razorpay_payment_id FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert!(!paid);
    assert_eq!(payment_id, None);
    assert_eq!(app.stock(product_id, "M").await, 2);
}

#[tokio::test]
async fn failed_reservation_reports_remaining_stock() {
    let Some(app) = spawn_app().await else { return };
    let roomy = app.create_product("10.00", &[("M", 2)]).await;
    let empty = app.create_product("10.00", &[("L", 0)]).await;

    let items: Vec<OrderItem> = serde_json::from_value(json!([
        { "product_id": roomy, "name": "Tee", "size": "M", "quantity": 5, "price": 10.0, "image": null },
        { "product_id": empty, "name": "Tee", "size": "L", "quantity": 1, "price": 10.0, "image": null }
    ]))
    .unwrap();

    let mut tx = app.pool.begin().await.unwrap();
    let err = reserve_stock(&mut tx, &items).await.unwrap_err();
    drop(tx);

    let AppError::StockError(issues) = err else {
        panic!("expected a stock error, got {:?}", err);
    };
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].available, 2);
    assert_eq!(issues[0].reason, StockIssueReason::InsufficientStock);
    assert_eq!(issues[1].available, 0);
    assert_eq!(issues[1].reason, StockIssueReason::OutOfStock);
    assert_eq!(app.stock(roomy, "M").await, 2);
}
