// src/services/inventory.rs

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use sqlx::PgConnection;

use crate::{
    error::AppError,
    models::{
        order::{OrderItem, OrderLineRequest},
        product::{InventoryLevel, InventoryRow, PRODUCT_COLUMNS, Product},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockIssueReason {
    ProductNotFound,
    SizeNotOffered,
    OutOfStock,
    InsufficientStock,
}

/// A checkout line that cannot be fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockIssue {
    pub product_id: i64,
    pub name: Option<String>,
    pub size: String,
    pub requested: i32,
    pub available: i32,
    pub reason: StockIssueReason,
}

pub type InventoryMap = HashMap<(i64, String), InventoryLevel>;

/// Collapses repeated (product, size) lines into one line per pair, keeping
/// the order of first appearance.
pub fn merge_lines(lines: &[OrderLineRequest]) -> Vec<OrderLineRequest> {
    let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged
            .iter_mut()
            .find(|m| m.product_id == line.product_id && m.size == line.size)
        {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }
    merged
}

/// Checks every line against the catalog and the inventory map.
/// Lines must already be merged.
pub fn find_stock_issues(
    lines: &[OrderLineRequest],
    products: &HashMap<i64, Product>,
    inventory: &InventoryMap,
) -> Vec<StockIssue> {
    lines
        .iter()
        .filter_map(|line| {
            let issue = |name: Option<String>, available: i32, reason| StockIssue {
                product_id: line.product_id,
                name,
                size: line.size.clone(),
                requested: line.quantity,
                available,
                reason,
            };

            let Some(product) = products.get(&line.product_id) else {
                return Some(issue(None, 0, StockIssueReason::ProductNotFound));
            };
            let name = Some(product.name.clone());

            if !product.offers_size(&line.size) {
                return Some(issue(name, 0, StockIssueReason::SizeNotOffered));
            }

            let level = inventory
                .get(&(line.product_id, line.size.clone()))
                .copied()
                .unwrap_or(InventoryLevel {
                    stock: 0,
                    available: false,
                });

            if !level.available || level.stock <= 0 {
                Some(issue(name, 0, StockIssueReason::OutOfStock))
            } else if level.stock < line.quantity {
                Some(issue(name, level.stock, StockIssueReason::InsufficientStock))
            } else {
                None
            }
        })
        .collect()
}

/// Snapshots current product data for each line.
/// Callers must have ruled out missing products with `find_stock_issues`.
pub fn snapshot_items(
    lines: &[OrderLineRequest],
    products: &HashMap<i64, Product>,
) -> Result<Vec<OrderItem>, AppError> {
    lines
        .iter()
        .map(|line| {
            let product = products.get(&line.product_id).ok_or_else(|| {
                AppError::NotFound(format!("Product {} not found", line.product_id))
            })?;
            Ok(OrderItem {
                product_id: product.id,
                name: product.name.clone(),
                size: line.size.clone(),
                quantity: line.quantity,
                price: product.price,
                image: product.primary_image().map(str::to_string),
            })
        })
        .collect()
}

pub async fn load_products(
    conn: &mut PgConnection,
    ids: &[i64],
) -> Result<HashMap<i64, Product>, AppError> {
    let sql = format!("SELECT {} FROM products WHERE id = ANY($1)", PRODUCT_COLUMNS);
    let products: Vec<Product> = sqlx::query_as(&sql).bind(ids).fetch_all(conn).await?;
    Ok(products.into_iter().map(|p| (p.id, p)).collect())
}

pub async fn load_inventory(
    conn: &mut PgConnection,
    ids: &[i64],
) -> Result<InventoryMap, AppError> {
    let rows: Vec<InventoryRow> = sqlx::query_as(
        "SELECT product_id, size, stock, available FROM product_inventory WHERE product_id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            (
                (r.product_id, r.size),
                InventoryLevel {
                    stock: r.stock,
                    available: r.available,
                },
            )
        })
        .collect())
}

pub async fn load_product_inventory(
    conn: &mut PgConnection,
    product_id: i64,
) -> Result<Vec<InventoryRow>, AppError> {
    let rows = sqlx::query_as(
        "SELECT product_id, size, stock, available FROM product_inventory WHERE product_id = $1 ORDER BY size",
    )
    .bind(product_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Conditionally takes `quantity` units of one size.
/// Returns false when the row is missing or holds less than `quantity`.
async fn take_stock(
    conn: &mut PgConnection,
    product_id: i64,
    size: &str,
    quantity: i32,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE product_inventory
        SET stock = stock - $3,
            available = (stock - $3) > 0
        WHERE product_id = $1 AND size = $2 AND stock >= $3
        "#,
    )
    .bind(product_id)
    .bind(size)
    .bind(quantity)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Decrements stock for every item or fails with the lines that could not be
/// covered. Run inside a transaction: on error the caller drops it, which
/// rolls back the decrements that did succeed.
pub async fn reserve_stock(conn: &mut PgConnection, items: &[OrderItem]) -> Result<(), AppError> {
    let mut issues = Vec::new();
    for item in items {
        if !take_stock(&mut *conn, item.product_id, &item.size, item.quantity).await? {
            let left: Option<i32> = sqlx::query_scalar(
                "SELECT stock FROM product_inventory WHERE product_id = $1 AND size = $2",
            )
            .bind(item.product_id)
            .bind(&item.size)
            .fetch_optional(&mut *conn)
            .await?;
            let available = left.unwrap_or(0).max(0);

            issues.push(StockIssue {
                product_id: item.product_id,
                name: Some(item.name.clone()),
                size: item.size.clone(),
                requested: item.quantity,
                available,
                reason: if available > 0 {
                    StockIssueReason::InsufficientStock
                } else {
                    StockIssueReason::OutOfStock
                },
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::StockError(issues))
    }
}

/// Decrements stock after payment has been captured. Lines that can no
/// longer be covered are skipped and returned; the payment stands.
pub async fn decrement_after_payment(
    conn: &mut PgConnection,
    items: &[OrderItem],
) -> Result<Vec<OrderItem>, AppError> {
    let mut skipped = Vec::new();
    for item in items {
        if !take_stock(&mut *conn, item.product_id, &item.size, item.quantity).await? {
            tracing::warn!(
                "Insufficient stock after payment for product {} size {} (qty {})",
                item.product_id,
                item.size,
                item.quantity
            );
            skipped.push(item.clone());
        }
    }
    Ok(skipped)
}

/// Writes absolute stock levels. Stock is clamped at zero and `available`
/// defaults to `stock > 0`.
pub async fn set_levels(
    conn: &mut PgConnection,
    product_id: i64,
    levels: &BTreeMap<String, InventoryLevel>,
) -> Result<(), AppError> {
    for (size, level) in levels {
        let stock = level.stock.max(0);
        sqlx::query(
            r#"
            INSERT INTO product_inventory (product_id, size, stock, available)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, size) DO UPDATE SET
                stock = EXCLUDED.stock,
                available = EXCLUDED.available
            "#,
        )
        .bind(product_id)
        .bind(size)
        .bind(stock)
        .bind(level.available && stock > 0)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sqlx::types::Json;

    fn product(id: i64, sizes: &[&str]) -> Product {
        Product {
            id,
            name: format!("Product {}", id),
            description: String::new(),
            price: Decimal::new(19900, 2),
            images: Json(vec!["https://cdn.example.com/p.png".to_string()]),
            category: "Men".into(),
            sub_category: "Topwear".into(),
            sizes: Json(sizes.iter().map(|s| s.to_string()).collect()),
            bestseller: false,
            average_rating: 0.0,
            total_reviews: 0,
            created_at: chrono::Utc::now(),
        }
    }

    fn line(product_id: i64, size: &str, quantity: i32) -> OrderLineRequest {
        OrderLineRequest {
            product_id,
            size: size.into(),
            quantity,
        }
    }

    fn level(stock: i32) -> InventoryLevel {
        InventoryLevel {
            stock,
            available: stock > 0,
        }
    }

    #[test]
    fn merges_duplicate_lines() {
        let merged = merge_lines(&[line(1, "M", 1), line(2, "S", 1), line(1, "M", 2)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].quantity, 3);
    }

    #[test]
    fn reports_each_kind_of_issue() {
        let products: HashMap<_, _> = [(1, product(1, &["S", "M", "L"]))].into_iter().collect();
        let inventory: InventoryMap = [
            ((1, "S".to_string()), level(0)),
            ((1, "M".to_string()), level(2)),
            ((1, "L".to_string()), level(10)),
        ]
        .into_iter()
        .collect();

        let issues = find_stock_issues(
            &[
                line(1, "S", 1),
                line(1, "M", 3),
                line(1, "L", 3),
                line(1, "XL", 1),
                line(9, "M", 1),
            ],
            &products,
            &inventory,
        );

        let reasons: Vec<_> = issues.iter().map(|i| (i.size.as_str(), i.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("S", StockIssueReason::OutOfStock),
                ("M", StockIssueReason::InsufficientStock),
                ("XL", StockIssueReason::SizeNotOffered),
                ("M", StockIssueReason::ProductNotFound),
            ]
        );
        assert_eq!(issues[1].available, 2);
    }

    #[test]
    fn unavailable_flag_blocks_even_with_stock() {
        let products: HashMap<_, _> = [(1, product(1, &["M"]))].into_iter().collect();
        let inventory: InventoryMap = [(
            (1, "M".to_string()),
            InventoryLevel {
                stock: 5,
                available: false,
            },
        )]
        .into_iter()
        .collect();
        let issues = find_stock_issues(&[line(1, "M", 1)], &products, &inventory);
        assert_eq!(issues[0].reason, StockIssueReason::OutOfStock);
    }

    #[test]
    fn snapshot_copies_price_and_first_image() {
        let products: HashMap<_, _> = [(1, product(1, &["M"]))].into_iter().collect();
        let items = snapshot_items(&[line(1, "M", 2)], &products).unwrap();
        assert_eq!(items[0].price, Decimal::new(19900, 2));
        assert_eq!(items[0].image.as_deref(), Some("https://cdn.example.com/p.png"));
        assert_eq!(items[0].quantity, 2);
    }
}
