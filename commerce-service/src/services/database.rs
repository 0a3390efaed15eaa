//! Database service for commerce-service.

use std::time::Duration;

use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{info, instrument};

use crate::models::{
    NewPayment, NewProduct, NewUser, Order, OrderItem, Payment, PaymentStatus, Product, User,
};
use crate::services::metrics::DB_QUERY_DURATION;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(database_url), fields(service = "commerce-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_user(&self, input: &NewUser) -> Result<User, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email)
            VALUES ($1, $2)
            RETURNING id, name, email, created_at
            "#,
        )
        .bind(&input.name)
        .bind(&input.email)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();
        info!(user_id = user.id, "User created");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(user)
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: &NewProduct) -> Result<Product, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, description, price, stock_quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, description, price, stock_quantity, created_at, updated_at
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.stock_quantity)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();
        info!(product_id = product.id, "Product created");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: i64) -> Result<Option<Product>, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, description, price, stock_quantity, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(product)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: i64) -> Result<Option<Order>, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order"])
            .start_timer();

        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, total_amount, status, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn list_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_order_items"])
            .start_timer();

        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, quantity, price, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(items)
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = input.user_id, order_id = input.order_id))]
    pub async fn create_payment(&self, input: &NewPayment) -> Result<Payment, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (user_id, order_id, amount, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, order_id, amount, invoice_id, status, created_at, updated_at
            "#,
        )
        .bind(input.user_id)
        .bind(input.order_id)
        .bind(input.amount)
        .bind(input.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn set_payment_invoice(
        &self,
        payment_id: i64,
        invoice_id: &str,
    ) -> Result<Payment, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_payment_invoice"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET invoice_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, order_id, amount, invoice_id, status, created_at, updated_at
            "#,
        )
        .bind(payment_id)
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> Result<Payment, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_payment_status"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, order_id, amount, invoice_id, status, created_at, updated_at
            "#,
        )
        .bind(payment_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();
        info!(payment_id, status = %status, "Payment status updated");
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: i64) -> Result<Option<Payment>, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, user_id, order_id, amount, invoice_id, status, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn list_order_payments(&self, order_id: i64) -> Result<Vec<Payment>, sqlx::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_order_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, user_id, order_id, amount, invoice_id, status, created_at, updated_at
            FROM payments
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();
        Ok(payments)
    }
}
