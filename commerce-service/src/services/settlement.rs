//! Order settlement.
//!
//! One database transaction covers the whole order: header insert, a row lock
//! per product, stock checks, item inserts, stock decrements and the final
//! total. Any failure rolls all of it back.

use std::panic::AssertUnwindSafe;
use std::str::FromStr;

use futures::FutureExt;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection, Postgres, Transaction};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::models::{NewOrderLine, Order, OrderStatus};
use crate::services::database::Database;
use crate::services::metrics::ORDERS_TOTAL;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i32,
        available: i32,
    },

    #[error("Product {product_id} has an invalid price '{price}'")]
    InvalidPrice { product_id: i64, price: String },

    #[error("Product {0} not found")]
    ProductNotFound(i64),

    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("Quantity for product {product_id} must be positive, got {quantity}")]
    InvalidQuantity { product_id: i64, quantity: i32 },

    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::InsufficientStock { .. } | SettlementError::InvalidQuantity { .. } => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            SettlementError::ProductNotFound(_) | SettlementError::UserNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            SettlementError::InvalidPrice { .. } => {
                AppError::InternalError(anyhow::anyhow!(err.to_string()))
            }
            SettlementError::Persistence(e) => AppError::from(e),
        }
    }
}

impl SettlementError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::Persistence(_) | Self::InvalidPrice { .. } => "failed",
            _ => "rejected",
        }
    }
}

#[derive(FromRow)]
struct LockedProduct {
    id: i64,
    price: String,
    stock_quantity: i32,
}

#[derive(Clone)]
pub struct OrderSettlementCoordinator {
    db: Database,
    #[cfg(test)]
    panic_after_order_insert: bool,
}

impl OrderSettlementCoordinator {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            #[cfg(test)]
            panic_after_order_insert: false,
        }
    }

    /// Creates the order, reserves stock and records the total in one transaction.
    ///
    /// Returns the order as re-read after commit.
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn create_order(
        &self,
        user_id: i64,
        items: &[NewOrderLine],
    ) -> Result<Order, SettlementError> {
        if let Err(e) = validate_lines(items) {
            ORDERS_TOTAL.with_label_values(&[e.outcome()]).inc();
            return Err(e);
        }

        let mut tx = self.db.begin().await?;

        let outcome = AssertUnwindSafe(self.settle(&mut *tx, user_id, items))
            .catch_unwind()
            .await;

        let order_id = match outcome {
            Ok(Ok(order_id)) => order_id,
            Ok(Err(e)) => {
                rollback(tx).await;
                ORDERS_TOTAL.with_label_values(&[e.outcome()]).inc();
                warn!(error = %e, "Order settlement rolled back");
                return Err(e);
            }
            Err(panic) => {
                rollback(tx).await;
                ORDERS_TOTAL.with_label_values(&["failed"]).inc();
                std::panic::resume_unwind(panic);
            }
        };

        tx.commit().await?;

        let order = self
            .db
            .get_order(order_id)
            .await?
            .ok_or(SettlementError::Persistence(sqlx::Error::RowNotFound))?;

        ORDERS_TOTAL.with_label_values(&["created"]).inc();
        info!(
            order_id = order.id,
            total_amount = %order.total_amount,
            "Order settled"
        );

        Ok(order)
    }

    async fn settle(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
        items: &[NewOrderLine],
    ) -> Result<i64, SettlementError> {
        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, total_amount, status)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(Decimal::ZERO)
        .bind(OrderStatus::Created.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                SettlementError::UserNotFound(user_id)
            }
            other => SettlementError::Persistence(other),
        })?;

        #[cfg(test)]
        if self.panic_after_order_insert {
            panic!("settlement step failed after order insert");
        }

        let mut total = Decimal::ZERO;

        for line in items {
            let product = sqlx::query_as::<_, LockedProduct>(
                r#"
                SELECT id, price::text AS price, stock_quantity
                FROM products
                WHERE id = $1
                FOR UPDATE
                "#,
            )
            .bind(line.product_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(SettlementError::ProductNotFound(line.product_id))?;

            if product.stock_quantity < line.quantity {
                return Err(SettlementError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }

            let unit_price = parse_price(product.id, &product.price)?;
            let line_price = line_total(unit_price, line.quantity);

            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, price)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id)
            .bind(product.id)
            .bind(line.quantity)
            .bind(line_price)
            .execute(&mut *conn)
            .await?;

            let updated = sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity - $2, updated_at = NOW()
                WHERE id = $1 AND stock_quantity >= $2
                "#,
            )
            .bind(product.id)
            .bind(line.quantity)
            .execute(&mut *conn)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(SettlementError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }

            total += line_price;
        }

        sqlx::query("UPDATE orders SET total_amount = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(total)
            .execute(&mut *conn)
            .await?;

        Ok(order_id)
    }
}

async fn rollback(tx: Transaction<'static, Postgres>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Failed to roll back settlement transaction");
    }
}

fn validate_lines(items: &[NewOrderLine]) -> Result<(), SettlementError> {
    match items.iter().find(|line| line.quantity <= 0) {
        Some(line) => Err(SettlementError::InvalidQuantity {
            product_id: line.product_id,
            quantity: line.quantity,
        }),
        None => Ok(()),
    }
}

/// Parses a stored price. Unparsable or negative prices are rejected.
fn parse_price(product_id: i64, raw: &str) -> Result<Decimal, SettlementError> {
    match Decimal::from_str(raw.trim()) {
        Ok(price) if price >= Decimal::ZERO => Ok(price),
        _ => Err(SettlementError::InvalidPrice {
            product_id,
            price: raw.to_string(),
        }),
    }
}

/// Unit price times quantity, rounded half away from zero to cents.
fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    (unit_price * Decimal::from(quantity))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
